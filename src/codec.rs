//! Encoding and decoding of stored secrets
//!
//! Decoding dispatches on the wire format; only modern secrets need the
//! passphrase, so the session is consulted (and the user possibly prompted)
//! only for those. Encoding always produces the modern format.

use crate::cipher::{self, CipherBackend, CipherKind};
use crate::error::Result;
use crate::random::{OsSecureRandom, SecureRandom};
use crate::session::MasterPassphrase;
use crate::wire::{self, WireSecret};
use tracing::debug;
use zeroize::Zeroizing;

/// Turns plaintext secrets into wire strings and back.
pub struct PasswordCodec<R = OsSecureRandom> {
    rng: R,
    cipher: CipherKind,
}

impl PasswordCodec<OsSecureRandom> {
    /// AES-256-CBC over the OS random source.
    pub fn new() -> Self {
        Self::with_rng(OsSecureRandom, CipherKind::default())
    }
}

impl Default for PasswordCodec<OsSecureRandom> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: SecureRandom> PasswordCodec<R> {
    pub fn with_rng(rng: R, cipher: CipherKind) -> Self {
        Self { rng, cipher }
    }

    /// Cipher used for newly written secrets.
    pub fn cipher(&self) -> CipherKind {
        self.cipher
    }

    /// Encrypt `plaintext` under an explicit passphrase.
    ///
    /// Empty or absent plaintext encodes to `None` (no secret stored).
    pub fn encode(&mut self, plaintext: Option<&str>, passphrase: &str) -> Result<Option<String>> {
        let Some(plaintext) = plaintext.filter(|p| !p.is_empty()) else {
            return Ok(None);
        };
        let backend = CipherBackend::Modern(self.cipher);
        let ciphertext = backend.encrypt(plaintext, passphrase.as_bytes(), &mut self.rng)?;
        Ok(Some(wire::wrap_modern(self.cipher, &ciphertext)))
    }

    /// Encrypt `plaintext` under the session's master passphrase (or the
    /// built-in key when none is configured).
    pub fn encode_with_session(
        &mut self,
        plaintext: Option<&str>,
        session: &mut MasterPassphrase,
    ) -> Result<Option<String>> {
        if plaintext.is_none_or(str::is_empty) {
            return Ok(None);
        }
        let passphrase = session.unlock_or_prompt()?;
        self.encode(plaintext, &passphrase)
    }

    /// Decrypt a stored secret with an explicit passphrase.
    pub fn decode(&mut self, text: &str, passphrase: &str) -> Result<Option<Zeroizing<String>>> {
        self.decode_lazy(text, || Ok(Zeroizing::new(passphrase.to_owned())))
    }

    /// Decrypt a stored secret, asking the session for the passphrase only if
    /// the secret is in the modern format.
    pub fn decode_with_session(
        &mut self,
        text: &str,
        session: &mut MasterPassphrase,
    ) -> Result<Option<Zeroizing<String>>> {
        self.decode_lazy(text, || session.unlock_or_prompt())
    }

    fn decode_lazy<F>(&mut self, text: &str, passphrase: F) -> Result<Option<Zeroizing<String>>>
    where
        F: FnOnce() -> Result<Zeroizing<String>>,
    {
        match wire::parse(text)? {
            WireSecret::Empty => Ok(None),
            WireSecret::Legacy(ciphertext) => {
                debug!("decoding secret with the legacy method");
                let plain = CipherBackend::Legacy.decrypt(&ciphertext, &[], &mut self.rng)?;
                Ok(Some(plain))
            }
            WireSecret::Modern { kind, ciphertext } => {
                debug!("decoding secret with {}", kind.name());
                let passphrase = passphrase()?;
                let rng = &mut self.rng;
                let plain = cipher::decrypt(kind, passphrase.as_bytes(), &ciphertext, rng)?;
                Ok(Some(plain))
            }
            WireSecret::Plaintext(plain) => {
                debug!("secret was stored as plaintext, returning it unchanged");
                Ok(Some(Zeroizing::new(plain)))
            }
        }
    }
}
