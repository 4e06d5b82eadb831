//! Persisted password store
//!
//! The store file is JSON holding the master passphrase hash and the
//! wire-format secrets of each account. Secrets are never written decrypted.

use crate::account::{AccountId, AccountList, AccountSecrets, PasswordField};
use crate::codec::PasswordCodec;
use crate::error::{ErrorCategory, ErrorKind, PassvaultError, Result};
use crate::random::SecureRandom;
use crate::session::{MasterPassphrase, MasterPasswordHash};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tracing::debug;
use zeroize::Zeroizing;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordStore {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    master_password_hash: Option<String>,
    #[serde(default)]
    accounts: Vec<AccountSecrets>,
}

impl PasswordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the store at `path`. A missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no password store at {}, starting empty", path.display());
                return Ok(Self::new());
            }
            Err(e) => return Err(read_error(path, e)),
        };
        serde_json::from_slice(&data).map_err(|e| {
            PassvaultError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::StoreFormat,
                format!("failed to parse password store {}", path.display()),
                e,
            )
        })
    }

    /// Write the store to `path` atomically (tempfile + fsync + rename).
    ///
    /// Either the old file or the new file exists afterwards, never a
    /// partial one. The file is created with mode 0o600 on Unix systems.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).map_err(|e| {
            PassvaultError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::StoreFormat,
                "failed to serialize password store",
                e,
            )
        })?;

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut temp_file = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| io_error("failed to create tempfile", e))?;

        temp_file
            .write_all(&json)
            .map_err(|e| io_error("failed to write to tempfile", e))?;
        // Flush and fsync() such that the rename later, if it succeeds, will
        // always point to a valid file.
        temp_file
            .flush()
            .map_err(|e| io_error("failed to flush tempfile", e))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| io_error("failed to sync file prior to rename", e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = temp_file
                .as_file()
                .metadata()
                .map_err(|e| io_error("failed to get tempfile metadata", e))?
                .permissions();
            perms.set_mode(0o600);
            temp_file
                .as_file()
                .set_permissions(perms)
                .map_err(|e| io_error("failed to set tempfile permissions", e))?;
        }

        temp_file.persist(path).map_err(|e| {
            PassvaultError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to rename to target file {}", path.display()),
                e,
            )
        })?;
        debug!("wrote password store to {}", path.display());
        Ok(())
    }

    /// The stored master passphrase hash, validated.
    pub fn master_password_hash(&self) -> Result<Option<MasterPasswordHash>> {
        match &self.master_password_hash {
            Some(stored) => MasterPasswordHash::parse(stored),
            None => Ok(None),
        }
    }

    pub fn set_master_password_hash(&mut self, hash: Option<&MasterPasswordHash>) {
        self.master_password_hash = hash.map(|h| h.as_str().to_owned());
    }

    pub fn accounts(&self) -> &[AccountSecrets] {
        &self.accounts
    }

    pub fn account(&self, account_id: AccountId) -> Option<&AccountSecrets> {
        self.accounts.iter().find(|a| a.account_id == account_id)
    }

    fn account_entry(&mut self, id: AccountId) -> &mut AccountSecrets {
        match self.accounts.iter().position(|a| a.account_id == id) {
            Some(i) => &mut self.accounts[i],
            None => {
                self.accounts.push(AccountSecrets::new(id));
                let last = self.accounts.len() - 1;
                &mut self.accounts[last]
            }
        }
    }

    /// Drop an account and its secrets. Returns whether it existed.
    pub fn remove_account(&mut self, account_id: AccountId) -> bool {
        let before = self.accounts.len();
        self.accounts.retain(|a| a.account_id != account_id);
        self.accounts.len() != before
    }

    /// Decrypted secret of an account, prompting for the master passphrase if needed.
    pub fn account_password<R: SecureRandom>(
        &self,
        account_id: AccountId,
        field: PasswordField,
        codec: &mut PasswordCodec<R>,
        session: &mut MasterPassphrase,
    ) -> Result<Option<Zeroizing<String>>> {
        let Some(stored) = self.account(account_id).and_then(|a| a.field(field)) else {
            return Ok(None);
        };
        let context = |e: PassvaultError| {
            let msg = format!("failed to decode {} of account {}", field, account_id);
            e.with_context(msg)
        };
        codec.decode_with_session(stored, session).map_err(context)
    }

    /// Encrypt and store a secret. Empty or absent plaintext clears the field.
    pub fn set_account_password<R: SecureRandom>(
        &mut self,
        account_id: AccountId,
        field: PasswordField,
        plaintext: Option<&str>,
        codec: &mut PasswordCodec<R>,
        session: &mut MasterPassphrase,
    ) -> Result<()> {
        let context = |e: PassvaultError| {
            let msg = format!("failed to encode {} of account {}", field, account_id);
            e.with_context(msg)
        };
        let encoded = codec
            .encode_with_session(plaintext, session)
            .map_err(context)?;
        *self.account_entry(account_id).field_mut(field) = encoded;
        Ok(())
    }
}

impl AccountList for PasswordStore {
    fn accounts_mut(&mut self) -> Box<dyn Iterator<Item = &mut AccountSecrets> + '_> {
        Box::new(self.accounts.iter_mut())
    }

    fn store_master_password_hash(&mut self, hash: Option<&MasterPasswordHash>) {
        self.set_master_password_hash(hash);
    }
}

fn io_error(msg: &str, err: io::Error) -> PassvaultError {
    PassvaultError::with_kind_and_source(ErrorCategory::Internal, ErrorKind::Io, msg, err)
}

fn read_error(path: &Path, err: io::Error) -> PassvaultError {
    let category = if err.kind() == io::ErrorKind::PermissionDenied {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    PassvaultError::with_kind_and_source(
        category,
        ErrorKind::Io,
        format!("failed to read from {}", path.display()),
        err,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passphrase::ScriptedPassphraseReader;
    use tempfile::TempDir;

    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;

    fn new_session(passphrase: &str) -> MasterPassphrase {
        MasterPassphrase::new(
            Some(MasterPasswordHash::compute(passphrase)),
            Box::new(ScriptedPassphraseReader::constant(passphrase)),
        )
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("passwordstorerc");
        let store = PasswordStore::load(&path).unwrap();
        assert_eq!(store, PasswordStore::new());
        assert!(store.master_password_hash().unwrap().is_none());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("passwordstorerc");
        let mut codec = PasswordCodec::new();
        let mut session = new_session("hunter2");

        let mut store = PasswordStore::new();
        store.set_master_password_hash(session.hash());
        store
            .set_account_password(
                1,
                PasswordField::Recv,
                Some("imap-pass"),
                &mut codec,
                &mut session,
            )
            .unwrap();
        store
            .set_account_password(
                1,
                PasswordField::Smtp,
                Some("smtp-pass"),
                &mut codec,
                &mut session,
            )
            .unwrap();
        store.save(&path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("imap-pass"));
        assert!(raw.contains("{AES-256-CBC}"));

        let loaded = PasswordStore::load(&path).unwrap();
        assert_eq!(loaded, store);
        let stored = loaded.master_password_hash().unwrap();
        assert_eq!(stored.as_ref(), session.hash());

        let mut fresh = new_session("hunter2");
        let recv = loaded
            .account_password(1, PasswordField::Recv, &mut codec, &mut fresh)
            .unwrap()
            .unwrap();
        assert_eq!(recv.as_str(), "imap-pass");
    }

    #[test]
    fn test_overwrite_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("passwordstorerc");
        fs::write(&path, b"old contents").unwrap();

        PasswordStore::new().save(&path).unwrap();
        assert_eq!(PasswordStore::load(&path).unwrap(), PasswordStore::new());
    }

    #[test]
    #[cfg(unix)]
    fn test_file_permissions() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("passwordstorerc");
        PasswordStore::new().save(&path).unwrap();

        let permissions = fs::metadata(&path).unwrap().permissions();
        assert_eq!(permissions.mode() & 0o777, 0o600);
    }

    #[test]
    fn test_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("passwordstorerc");
        fs::write(&path, b"{ not json").unwrap();

        let err = PasswordStore::load(&path).expect_err("expected parse failure");
        assert_eq!(err.kind, Some(ErrorKind::StoreFormat));
    }

    #[test]
    fn test_bad_stored_hash() {
        let store: PasswordStore =
            serde_json::from_str(r#"{ "master_password_hash": "abc", "accounts": [] }"#).unwrap();
        let err = store.master_password_hash().expect_err("expected bad hash");
        assert_eq!(err.kind, Some(ErrorKind::StoreFormat));
    }

    #[test]
    fn test_clear_and_missing_fields() {
        let mut codec = PasswordCodec::new();
        let mut session = new_session("hunter2");
        let mut store = PasswordStore::new();

        assert!(store
            .account_password(9, PasswordField::Recv, &mut codec, &mut session)
            .unwrap()
            .is_none());

        store
            .set_account_password(9, PasswordField::Recv, Some("x"), &mut codec, &mut session)
            .unwrap();
        store
            .set_account_password(9, PasswordField::Recv, Some(""), &mut codec, &mut session)
            .unwrap();
        assert_eq!(store.account(9).unwrap().passwd, None);

        assert!(store.remove_account(9));
        assert!(store.accounts().is_empty());
    }

    #[test]
    fn test_decode_error_names_field() {
        let mut codec = PasswordCodec::new();
        let mut session = new_session("hunter2");
        let store: PasswordStore = serde_json::from_str(
            r#"{ "accounts": [ { "account_id": 4, "smtp_passwd": "{AES-256-CBC}%%%" } ] }"#,
        )
        .unwrap();

        let err = store
            .account_password(4, PasswordField::Smtp, &mut codec, &mut session)
            .expect_err("expected decode failure");
        assert_eq!(err.kind, Some(ErrorKind::MalformedWireString));
        assert!(err.to_string().contains("smtp_passwd of account 4"));
    }
}
