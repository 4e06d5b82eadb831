//! passvault - master-passphrase protection for stored account passwords
//!
//! Account passwords are kept in configuration as wire-format strings,
//! encrypted under an optional master passphrase. See [`codec`] for the
//! encode/decode entry points, [`session`] for the unlocked passphrase and
//! [`migrate`] for re-encryption on passphrase change.

#![forbid(unsafe_code)]

pub mod account;
pub mod cipher;
pub mod codec;
pub mod error;
pub mod hooks;
pub mod kdf;
pub mod migrate;
pub mod passphrase;
pub mod random;
pub mod session;
pub mod store;
pub mod wire;

pub use account::{AccountId, AccountList, AccountSecrets, PasswordField};
pub use codec::PasswordCodec;
pub use error::{ErrorCategory, ErrorKind, PassvaultError, Result};
pub use hooks::{PluginHookRegistry, PluginSecretHook};
pub use migrate::{MigrationReport, SecretMigrator};
pub use session::{MasterPassphrase, MasterPasswordHash};
pub use store::PasswordStore;
