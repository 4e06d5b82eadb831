use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to any other error
    /// category in this enum.
    ///
    /// Use of Internal is never a guarantee that the error is not, for
    /// example, caused by a corrupt configuration file - merely that it
    /// cannot be confidently determined by the code.
    Internal,

    /// The user provided invalid input (a wrong passphrase, a corrupt stored
    /// secret, a cancelled prompt) or asked for something impossible.
    User,
}

/// Fine-grained condition flags for consumers that want to branch on error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The cipher could not be keyed or initialized.
    CipherInitFailed,
    /// The secure random source could not deliver the requested bytes.
    RandomSourceFailed,
    /// A ciphertext or plaintext buffer did not have the fixed expected size.
    BufferSize,
    /// A secret does not fit into the fixed encryption buffer.
    SecretTooLong,
    /// A secret contains a NUL byte, which would end it early on decryption.
    InvalidSecret,
    /// The hash selected for a cipher cannot be folded into its key.
    KeyDerivation,
    /// A stored secret is not in any recognized wire format, or its payload
    /// is not valid base64 / UTF-8.
    MalformedWireString,
    /// A `{...}` marker names a cipher we do not implement.
    UnknownAlgorithm,
    /// A passphrase did not match the stored hash, or a secret did not
    /// decrypt to a well-formed buffer under the supplied passphrase.
    PassphraseVerificationFailed,
    /// The user dismissed the passphrase prompt.
    UserCancelled,
    /// The passphrase prompt could not be shown or read.
    PassphraseUnavailable,
    /// One or more secrets could not be re-encrypted during a passphrase change.
    MigrationPartialFailure,
    /// A registered plugin hook failed to re-encrypt its own secrets.
    HookFailed,
    /// The persisted password store could not be parsed or serialized.
    StoreFormat,
    /// Interaction with the filesystem or terminal failed.
    Io,
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct PassvaultError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Optional specific condition tag for consumers that need to
    /// branch their behavior. Any code consuming errors MUST handle
    /// the absence of a defined kind.
    pub kind: Option<ErrorKind>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl PassvaultError {
    /// Creates a new error with a required category and display message.
    pub fn new(category: ErrorCategory, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: None,
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that also tags the failure with a kind.
    pub fn with_kind(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that carries both a kind tag and the originating source error.
    pub fn with_kind_and_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// Shorthand for the error returned whenever the passphrase prompt is dismissed.
    pub fn cancelled() -> Self {
        Self::with_kind(
            ErrorCategory::User,
            ErrorKind::UserCancelled,
            "operation aborted: passphrase prompt was cancelled",
        )
    }

    /// The user-facing message carried by the error.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Returns the preserved source error if present.
    pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// True if this error, or any error it wraps via `with_context`, has `kind`.
    pub fn has_kind(&self, kind: ErrorKind) -> bool {
        if self.kind == Some(kind) {
            return true;
        }
        match self.source_error() {
            Some(inner) => inner
                .downcast_ref::<PassvaultError>()
                .is_some_and(|e| e.has_kind(kind)),
            None => false,
        }
    }

    /// Wraps the current error with a higher-level message while preserving the original as source.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        Self {
            category,
            kind,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, PassvaultError>;
