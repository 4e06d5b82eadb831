//! Passphrase to cipher key derivation
//!
//! The key is the digest of the passphrase folded onto itself: the first
//! half XORed with the second half, truncated to the cipher's key length.
//! Each cipher is paired with a hash whose digest is exactly twice its key
//! length (SHA-512 for AES-256, SHA-256 for AES-128).

use crate::cipher::CipherKind;
use crate::error::{ErrorCategory, ErrorKind, PassvaultError, Result};
use sha2::{Digest, Sha256, Sha512};
use zeroize::Zeroizing;

/// A symmetric key derived from a passphrase, wiped on drop.
pub struct DerivedKey {
    key: Zeroizing<Vec<u8>>,
    digest_len: usize,
}

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    /// Length of the digest the key was folded from.
    pub fn digest_len(&self) -> usize {
        self.digest_len
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("len", &self.key.len())
            .field("digest_len", &self.digest_len)
            .finish_non_exhaustive()
    }
}

/// Derive the key for `cipher` from `passphrase`.
pub fn derive_key(passphrase: &[u8], cipher: CipherKind) -> Result<DerivedKey> {
    match cipher {
        CipherKind::Aes256Cbc => fold_digest::<Sha512>(passphrase, cipher.key_len()),
        CipherKind::Aes128Cbc => fold_digest::<Sha256>(passphrase, cipher.key_len()),
    }
}

pub(crate) fn fold_digest<D: Digest>(passphrase: &[u8], key_len: usize) -> Result<DerivedKey> {
    let digest_len = <D as Digest>::output_size();
    if digest_len != 2 * key_len {
        return Err(PassvaultError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::KeyDerivation,
            format!(
                "digest length {} cannot be folded into a {}-byte key",
                digest_len, key_len
            ),
        ));
    }

    let digest = Zeroizing::new(D::digest(passphrase).to_vec());
    let half = digest_len / 2;
    let key: Vec<u8> = (0..key_len).map(|i| digest[i] ^ digest[i + half]).collect();

    Ok(DerivedKey {
        key: Zeroizing::new(key),
        digest_len,
    })
}
