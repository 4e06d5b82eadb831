//! Master passphrase rotation
//!
//! Changing the master passphrase re-encrypts every stored secret:
//! 1. Forget the cached passphrase and ask for the current one again
//! 2. Store the hash of the new passphrase (or clear it), in the session and
//!    in the account list's persisted configuration
//! 3. Decode each account secret with the old passphrase and encode it with
//!    the new one
//! 4. Let registered hooks re-encrypt the secrets they own
//! 5. Forget the passphrase again
//!
//! This is best effort, not a transaction. A secret that fails to decode is
//! left untouched and reported; the rest of the migration carries on and
//! nothing already migrated is rolled back.

use crate::account::{AccountId, AccountList, PasswordField};
use crate::codec::PasswordCodec;
use crate::error::{ErrorCategory, ErrorKind, PassvaultError, Result};
use crate::hooks::{HookFailure, PluginHookRegistry};
use crate::random::SecureRandom;
use crate::session::{FALLBACK_KEY, MasterPassphrase};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// One secret that could not be re-encrypted.
#[derive(Debug)]
pub struct FieldFailure {
    pub account_id: AccountId,
    pub field: PasswordField,
    pub error: PassvaultError,
}

/// Outcome of a passphrase change.
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Number of secrets re-encrypted under the new passphrase.
    pub reencrypted: usize,
    pub failures: Vec<FieldFailure>,
    pub hook_failures: Vec<HookFailure>,
}

impl MigrationReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.hook_failures.is_empty()
    }

    /// Accounts with at least one secret left un-migrated, ascending, no duplicates.
    pub fn failed_account_ids(&self) -> Vec<AccountId> {
        let mut ids: Vec<AccountId> = self.failures.iter().map(|f| f.account_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Turn an incomplete migration into a `MigrationPartialFailure` error.
    pub fn into_result(self) -> Result<Self> {
        if self.is_complete() {
            return Ok(self);
        }
        let ids = self
            .failed_account_ids()
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let hooks = self
            .hook_failures
            .iter()
            .map(|h| h.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let message = format!(
            "{} secret(s) not re-encrypted (accounts: [{}]), failed hooks: [{}]",
            self.failures.len(), ids, hooks
        );
        Err(PassvaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::MigrationPartialFailure,
            message,
        ))
    }
}

/// Re-encrypts all secrets when the master passphrase changes.
pub struct SecretMigrator<'a, R: SecureRandom> {
    session: &'a mut MasterPassphrase,
    codec: &'a mut PasswordCodec<R>,
    hooks: &'a mut PluginHookRegistry,
}

impl<'a, R: SecureRandom> SecretMigrator<'a, R> {
    pub fn new(
        session: &'a mut MasterPassphrase,
        codec: &'a mut PasswordCodec<R>,
        hooks: &'a mut PluginHookRegistry,
    ) -> Self {
        Self {
            session,
            codec,
            hooks,
        }
    }

    /// Set a new master passphrase, or remove protection with `None`.
    ///
    /// Fails without changing anything if the user cancels the prompt for the
    /// current passphrase. Otherwise the new hash is stored and the returned
    /// report lists the secrets and hooks that could not be migrated.
    pub fn change_passphrase(
        &mut self,
        accounts: &mut dyn AccountList,
        new_passphrase: Option<&str>,
    ) -> Result<MigrationReport> {
        self.session.forget();
        let old = self
            .session
            .unlock_or_prompt()
            .map_err(|e| e.with_context("cannot change master passphrase"))?;

        self.session.set_passphrase(new_passphrase);
        accounts.store_master_password_hash(self.session.hash());
        let new = Zeroizing::new(new_passphrase.unwrap_or(FALLBACK_KEY).to_owned());

        debug!("re-encrypting all account passwords");
        let mut report = MigrationReport::default();
        for account in accounts.accounts_mut() {
            for field in PasswordField::ALL {
                let account_id = account.account_id;
                let slot = account.field_mut(field);
                let Some(stored) = slot.as_deref().filter(|s| !s.is_empty()) else {
                    continue;
                };
                match self.reencrypt(stored, &old, &new) {
                    Ok(updated) => {
                        *slot = updated;
                        report.reencrypted += 1;
                    }
                    Err(error) => {
                        warn!(
                            "leaving {} of account {} unchanged: {}",
                            field, account_id, error
                        );
                        report.failures.push(FieldFailure {
                            account_id,
                            field,
                            error,
                        });
                    }
                }
            }
        }

        report.hook_failures = self.hooks.invoke_all(&old, &new);
        self.session.forget();

        let action = if new_passphrase.is_some() {
            "changed"
        } else {
            "removed"
        };
        let failed = report.failures.len();
        let hook_failed = report.hook_failures.len();
        info!(
            "master passphrase {}; {} secret(s) re-encrypted, {} failed, {} hook failure(s)",
            action, report.reencrypted, failed, hook_failed
        );
        Ok(report)
    }

    fn reencrypt(&mut self, stored: &str, old: &str, new: &str) -> Result<Option<String>> {
        let plain = self.codec.decode(stored, old)?;
        self.codec.encode(plain.as_deref().map(String::as_str), new)
    }
}
