//! Account secret fields

use crate::session::MasterPasswordHash;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type AccountId = u32;

/// Which of an account's two secrets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PasswordField {
    /// Mail retrieval (POP3/IMAP) password.
    Recv,
    /// SMTP authentication password.
    Smtp,
}

impl PasswordField {
    pub const ALL: [PasswordField; 2] = [PasswordField::Recv, PasswordField::Smtp];

    /// Configuration key of the field.
    pub fn config_key(self) -> &'static str {
        match self {
            PasswordField::Recv => "passwd",
            PasswordField::Smtp => "smtp_passwd",
        }
    }
}

impl fmt::Display for PasswordField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

/// The stored (wire-format) secrets of one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSecrets {
    pub account_id: AccountId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_passwd: Option<String>,
}

impl AccountSecrets {
    pub fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            ..Self::default()
        }
    }

    pub fn field(&self, field: PasswordField) -> Option<&str> {
        match field {
            PasswordField::Recv => self.passwd.as_deref(),
            PasswordField::Smtp => self.smtp_passwd.as_deref(),
        }
    }

    pub fn field_mut(&mut self, field: PasswordField) -> &mut Option<String> {
        match field {
            PasswordField::Recv => &mut self.passwd,
            PasswordField::Smtp => &mut self.smtp_passwd,
        }
    }
}

/// Access to every account whose secrets must be protected.
pub trait AccountList {
    fn accounts_mut(&mut self) -> Box<dyn Iterator<Item = &mut AccountSecrets> + '_>;

    /// Record the hash of a new master passphrase next to the accounts.
    ///
    /// Called once the secrets are about to be re-encrypted under it. Lists
    /// that are not persisted have nowhere to keep it.
    fn store_master_password_hash(&mut self, _hash: Option<&MasterPasswordHash>) {}
}

impl AccountList for Vec<AccountSecrets> {
    fn accounts_mut(&mut self) -> Box<dyn Iterator<Item = &mut AccountSecrets> + '_> {
        Box::new(self.iter_mut())
    }
}

impl AccountList for [AccountSecrets] {
    fn accounts_mut(&mut self) -> Box<dyn Iterator<Item = &mut AccountSecrets> + '_> {
        Box::new(self.iter_mut())
    }
}
