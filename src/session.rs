//! Master passphrase session
//!
//! Holds the unlocked master passphrase for the lifetime of the process.
//! The session starts `Locked`. It becomes `Unlocked` only after a candidate
//! matches the stored SHA-512 hash, and `forget` (or dropping the session)
//! wipes the cached bytes and locks it again.
//!
//! Without a stored hash no master passphrase is configured: every operation
//! uses `FALLBACK_KEY` and the user is never prompted.

use crate::error::{ErrorCategory, ErrorKind, PassvaultError, Result};
use crate::passphrase::PassphraseReader;
use sha2::{Digest, Sha512};
use tracing::debug;
use zeroize::Zeroizing;

/// Built-in key used when no master passphrase is configured.
pub const FALLBACK_KEY: &str = "passkey0";

/// Title shown by the prompt collaborator.
pub const PROMPT_TITLE: &str = "Input master passphrase";

/// Hex-encoded SHA-512 digest of the master passphrase.
#[derive(Clone, PartialEq, Eq)]
pub struct MasterPasswordHash(String);

impl MasterPasswordHash {
    const HEX_LEN: usize = 2 * 64;

    /// Hash a passphrase.
    pub fn compute(passphrase: &str) -> Self {
        Self(hex::encode(Sha512::digest(passphrase.as_bytes())))
    }

    /// Accept a stored hash. Empty means "not configured"; any other value
    /// must be exactly 128 hex digits.
    pub fn parse(stored: &str) -> Result<Option<Self>> {
        if stored.is_empty() {
            return Ok(None);
        }
        if stored.len() != Self::HEX_LEN || !stored.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(PassvaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::StoreFormat,
                format!(
                    "stored master passphrase hash must be {} hex digits",
                    Self::HEX_LEN
                ),
            ));
        }
        Ok(Some(Self(stored.to_owned())))
    }

    /// Case-insensitive comparison against the hash of `candidate`.
    pub fn matches(&self, candidate: &str) -> bool {
        if self.0.len() != Self::HEX_LEN {
            return false;
        }
        let computed = Self::compute(candidate);
        computed.0.eq_ignore_ascii_case(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for MasterPasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterPasswordHash(..)")
    }
}

enum PassphraseState {
    Locked,
    Unlocked(Zeroizing<String>),
}

/// The process-wide master passphrase cache and its prompt collaborator.
pub struct MasterPassphrase {
    hash: Option<MasterPasswordHash>,
    state: PassphraseState,
    prompt: Box<dyn PassphraseReader>,
}

impl MasterPassphrase {
    /// Start a locked session for the hash loaded from configuration.
    pub fn new(hash: Option<MasterPasswordHash>, prompt: Box<dyn PassphraseReader>) -> Self {
        Self {
            hash,
            state: PassphraseState::Locked,
            prompt,
        }
    }

    /// True iff a master passphrase hash is configured.
    pub fn is_configured(&self) -> bool {
        self.hash.is_some()
    }

    /// True iff the passphrase has been entered and is cached.
    pub fn is_entered(&self) -> bool {
        matches!(self.state, PassphraseState::Unlocked(_))
    }

    pub fn hash(&self) -> Option<&MasterPasswordHash> {
        self.hash.as_ref()
    }

    /// Check a candidate against the stored hash. Fails closed when no hash
    /// is configured.
    pub fn verify(&self, candidate: &str) -> bool {
        match &self.hash {
            Some(hash) => hash.matches(candidate),
            None => false,
        }
    }

    /// Return the master passphrase, prompting until it verifies.
    ///
    /// Without a configured hash this returns `FALLBACK_KEY` and never
    /// prompts. A cancelled prompt yields a `UserCancelled` error.
    pub fn unlock_or_prompt(&mut self) -> Result<Zeroizing<String>> {
        if self.hash.is_none() {
            return Ok(Zeroizing::new(FALLBACK_KEY.to_owned()));
        }

        if let PassphraseState::Unlocked(cached) = &self.state {
            debug!("master passphrase is in memory, offering it");
            return Ok(cached.clone());
        }

        loop {
            let Some(candidate) = self.prompt.read_passphrase(PROMPT_TITLE)? else {
                debug!("master passphrase prompt cancelled");
                return Err(PassvaultError::cancelled());
            };

            if self.verify(&candidate) {
                debug!("entered master passphrase is correct, remembering it");
                self.state = PassphraseState::Unlocked(candidate.clone());
                return Ok(candidate);
            }
            debug!("entered master passphrase is incorrect");
            self.prompt.report_incorrect();
        }
    }

    /// Unlock with a known passphrase, without prompting.
    pub fn unlock(&mut self, candidate: &str) -> Result<()> {
        if !self.verify(candidate) {
            return Err(PassvaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::PassphraseVerificationFailed,
                "incorrect master passphrase",
            ));
        }
        self.state = PassphraseState::Unlocked(Zeroizing::new(candidate.to_owned()));
        Ok(())
    }

    /// Wipe the cached passphrase and lock the session.
    pub fn forget(&mut self) {
        // Zeroizing wipes the old value as it is dropped here.
        self.state = PassphraseState::Locked;
    }

    /// Store the hash of `new_passphrase`, or clear it with `None`.
    ///
    /// Also locks the session, so the new passphrase must be entered fresh.
    pub(crate) fn set_passphrase(&mut self, new_passphrase: Option<&str>) {
        match new_passphrase {
            Some(p) => {
                debug!("storing hash of new master passphrase");
                self.hash = Some(MasterPasswordHash::compute(p));
            }
            None => {
                debug!("clearing master passphrase hash");
                self.hash = None;
            }
        }
        self.forget();
    }

    /// End of session. Equivalent to dropping it.
    pub fn teardown(mut self) {
        self.forget();
    }
}
