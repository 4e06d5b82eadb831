//! Cipher backends for stored secrets
//!
//! Modern secrets are AES in CBC mode over a fixed-size buffer:
//! - one block of random data
//! - the secret itself
//! - zero bytes up to `BUFSIZE`
//!
//! The IV is random and is not stored. CBC decryption under a different IV
//! only garbles the first plaintext block, which is the random prefix, so the
//! secret survives. Decryption therefore draws a fresh IV as well.
//!
//! Legacy secrets are XORed with a single built-in key byte. They are only
//! read, for migrating old configurations.

use crate::error::{ErrorCategory, ErrorKind, PassvaultError, Result};
use crate::kdf::derive_key;
use crate::random::SecureRandom;
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use tracing::debug;
use zeroize::Zeroizing;

/// Size of the encrypted buffer, and of every modern ciphertext.
pub const BUFSIZE: usize = 128;

/// AES block length (also its IV length).
pub const BLOCK_LEN: usize = 16;

/// Longest secret that fits after the random prefix block.
pub const SECRET_CAPACITY: usize = BUFSIZE - BLOCK_LEN;

/// Key byte of the legacy obfuscation.
const LEGACY_KEY: u8 = 0x5c;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// The modern ciphers a `{name}` marker can select.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CipherKind {
    #[default]
    Aes256Cbc,
    Aes128Cbc,
}

impl CipherKind {
    /// Name as written between the braces of the wire format.
    pub fn name(self) -> &'static str {
        match self {
            CipherKind::Aes256Cbc => "AES-256-CBC",
            CipherKind::Aes128Cbc => "AES-128-CBC",
        }
    }

    /// Exact, case-sensitive lookup of a wire-format name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "AES-256-CBC" => Some(CipherKind::Aes256Cbc),
            "AES-128-CBC" => Some(CipherKind::Aes128Cbc),
            _ => None,
        }
    }

    pub fn key_len(self) -> usize {
        match self {
            CipherKind::Aes256Cbc => 32,
            CipherKind::Aes128Cbc => 16,
        }
    }

    pub fn block_len(self) -> usize {
        BLOCK_LEN
    }

    pub fn iv_len(self) -> usize {
        BLOCK_LEN
    }
}

/// An encrypt/decrypt implementation, selected by the wire-format marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherBackend {
    Modern(CipherKind),
    Legacy,
}

impl CipherBackend {
    /// Encrypt `plaintext`. The legacy backend ignores `passphrase` and `rng`.
    pub fn encrypt(
        &self,
        plaintext: &str,
        passphrase: &[u8],
        rng: &mut dyn SecureRandom,
    ) -> Result<Vec<u8>> {
        match *self {
            CipherBackend::Modern(kind) => encrypt(kind, passphrase, plaintext, rng),
            CipherBackend::Legacy => Ok(legacy_transform(plaintext.as_bytes())),
        }
    }

    /// Decrypt `ciphertext`. The legacy backend ignores `passphrase` and `rng`.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        passphrase: &[u8],
        rng: &mut dyn SecureRandom,
    ) -> Result<Zeroizing<String>> {
        match *self {
            CipherBackend::Modern(kind) => decrypt(kind, passphrase, ciphertext, rng),
            CipherBackend::Legacy => legacy_decrypt(ciphertext),
        }
    }
}

/// Encrypt a secret with random IV and random prefix block.
pub fn encrypt(
    kind: CipherKind,
    passphrase: &[u8],
    plaintext: &str,
    rng: &mut dyn SecureRandom,
) -> Result<Vec<u8>> {
    let mut iv = Zeroizing::new([0u8; BLOCK_LEN]);
    rng.fill(&mut iv[..])
        .map_err(|e| e.with_context("failed to generate IV"))?;

    let mut prefix = Zeroizing::new([0u8; BLOCK_LEN]);
    rng.fill(&mut prefix[..])
        .map_err(|e| e.with_context("failed to generate random prefix block"))?;

    encrypt_deterministic(kind, passphrase, plaintext, &iv, &prefix)
}

/// Encrypt a secret with a provided IV and prefix block
///
/// This function is ONLY for testing purposes to generate deterministic output.
/// NEVER use this in production - always use `encrypt()` which draws both from
/// a secure random source.
pub fn encrypt_deterministic(
    kind: CipherKind,
    passphrase: &[u8],
    plaintext: &str,
    iv: &[u8; BLOCK_LEN],
    prefix: &[u8; BLOCK_LEN],
) -> Result<Vec<u8>> {
    let secret = plaintext.as_bytes();
    if secret.len() > SECRET_CAPACITY {
        return Err(PassvaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::SecretTooLong,
            format!(
                "secret is {} bytes long; at most {} bytes can be stored",
                secret.len(), SECRET_CAPACITY
            ),
        ));
    }
    if secret.contains(&0) {
        return Err(PassvaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::InvalidSecret,
            "secret must not contain NUL bytes",
        ));
    }

    let key = derive_key(passphrase, kind)?;

    let mut buf = Zeroizing::new(vec![0u8; BUFSIZE]);
    buf[..BLOCK_LEN].copy_from_slice(prefix);
    buf[BLOCK_LEN..BLOCK_LEN + secret.len()].copy_from_slice(secret);

    match kind {
        CipherKind::Aes256Cbc => cbc_encrypt::<Aes256CbcEnc>(key.as_bytes(), iv, &mut buf)?,
        CipherKind::Aes128Cbc => cbc_encrypt::<Aes128CbcEnc>(key.as_bytes(), iv, &mut buf)?,
    }

    // buf now holds ciphertext only
    Ok(buf.to_vec())
}

/// Decrypt a modern ciphertext, validating the recovered buffer layout.
pub fn decrypt(
    kind: CipherKind,
    passphrase: &[u8],
    ciphertext: &[u8],
    rng: &mut dyn SecureRandom,
) -> Result<Zeroizing<String>> {
    if ciphertext.len() != BUFSIZE {
        return Err(PassvaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::BufferSize,
            format!(
                "ciphertext is {} bytes; expected exactly {}",
                ciphertext.len(), BUFSIZE
            ),
        ));
    }

    let key = derive_key(passphrase, kind)?;

    let mut iv = Zeroizing::new([0u8; BLOCK_LEN]);
    rng.fill(&mut iv[..])
        .map_err(|e| e.with_context("failed to generate IV"))?;

    let mut buf = Zeroizing::new(ciphertext.to_vec());
    match kind {
        CipherKind::Aes256Cbc => cbc_decrypt::<Aes256CbcDec>(key.as_bytes(), &iv[..], &mut buf)?,
        CipherKind::Aes128Cbc => cbc_decrypt::<Aes128CbcDec>(key.as_bytes(), &iv[..], &mut buf)?,
    }

    extract_secret(&buf[BLOCK_LEN..])
}

/// Pull the secret out of a decrypted buffer (prefix block already dropped).
///
/// The secret ends at the first NUL and everything after it must be zero.
/// A wrong key yields random bytes, which fail this check or the UTF-8 check.
fn extract_secret(body: &[u8]) -> Result<Zeroizing<String>> {
    let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
    if body[end..].iter().any(|&b| b != 0) {
        return Err(bad_passphrase_or_corrupt());
    }
    let secret = std::str::from_utf8(&body[..end]).map_err(|_| bad_passphrase_or_corrupt())?;
    Ok(Zeroizing::new(secret.to_owned()))
}

fn bad_passphrase_or_corrupt() -> PassvaultError {
    PassvaultError::with_kind(
        ErrorCategory::User,
        ErrorKind::PassphraseVerificationFailed,
        "corrupt secret or bad passphrase",
    )
}

fn cbc_encrypt<M: KeyIvInit + BlockEncryptMut>(
    key: &[u8],
    iv: &[u8],
    buf: &mut [u8],
) -> Result<()> {
    let mode = M::new_from_slices(key, iv).map_err(|_| cipher_init_failed(key, iv))?;
    let len = buf.len();
    mode.encrypt_padded_mut::<NoPadding>(buf, len)
        .map_err(|_| buffer_not_block_aligned(len))?;
    Ok(())
}

fn cbc_decrypt<M: KeyIvInit + BlockDecryptMut>(
    key: &[u8],
    iv: &[u8],
    buf: &mut [u8],
) -> Result<()> {
    let mode = M::new_from_slices(key, iv).map_err(|_| cipher_init_failed(key, iv))?;
    let len = buf.len();
    mode.decrypt_padded_mut::<NoPadding>(buf)
        .map_err(|_| buffer_not_block_aligned(len))?;
    Ok(())
}

fn cipher_init_failed(key: &[u8], iv: &[u8]) -> PassvaultError {
    PassvaultError::with_kind(
        ErrorCategory::Internal,
        ErrorKind::CipherInitFailed,
        format!(
            "cipher initialization failed (key {} bytes, iv {} bytes)",
            key.len(), iv.len()
        ),
    )
}

fn buffer_not_block_aligned(len: usize) -> PassvaultError {
    PassvaultError::with_kind(
        ErrorCategory::Internal,
        ErrorKind::BufferSize,
        format!("{} byte buffer is not a whole number of blocks", len),
    )
}

/// XOR every byte with the legacy key. Applying it twice is the identity.
pub fn legacy_transform(data: &[u8]) -> Vec<u8> {
    data.iter().map(|b| b ^ LEGACY_KEY).collect()
}

fn legacy_decrypt(ciphertext: &[u8]) -> Result<Zeroizing<String>> {
    debug!("decrypting secret stored with the legacy obfuscation");
    let plain = Zeroizing::new(legacy_transform(ciphertext));
    let secret = std::str::from_utf8(&plain).map_err(|e| {
        PassvaultError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::MalformedWireString,
            "legacy secret is not valid UTF-8",
            e,
        )
    })?;
    Ok(Zeroizing::new(secret.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::OsSecureRandom;

    #[test]
    fn test_small_secret() {
        let mut rng = OsSecureRandom;
        let ct = encrypt(CipherKind::Aes256Cbc, b"hunter2", "s3cr3t", &mut rng).unwrap();
        assert_eq!(ct.len(), BUFSIZE);
        let pt = decrypt(CipherKind::Aes256Cbc, b"hunter2", &ct, &mut rng).unwrap();
        assert_eq!(pt.as_str(), "s3cr3t");
    }

    #[test]
    fn test_aes128() {
        let mut rng = OsSecureRandom;
        let ct = encrypt(CipherKind::Aes128Cbc, b"hunter2", "s3cr3t", &mut rng).unwrap();
        let pt = decrypt(CipherKind::Aes128Cbc, b"hunter2", &ct, &mut rng).unwrap();
        assert_eq!(pt.as_str(), "s3cr3t");
    }

    #[test]
    fn test_empty_secret() {
        let ct = encrypt(CipherKind::Aes256Cbc, b"k", "", &mut OsSecureRandom).unwrap();
        let pt = decrypt(CipherKind::Aes256Cbc, b"k", &ct, &mut OsSecureRandom).unwrap();
        assert_eq!(pt.as_str(), "");
    }

    #[test]
    fn test_secret_at_capacity() {
        let secret = "x".repeat(SECRET_CAPACITY);
        let ct = encrypt(CipherKind::Aes256Cbc, b"k", &secret, &mut OsSecureRandom).unwrap();
        let pt = decrypt(CipherKind::Aes256Cbc, b"k", &ct, &mut OsSecureRandom).unwrap();
        assert_eq!(pt.as_str(), secret);
    }

    #[test]
    fn test_secret_over_capacity_rejected() {
        let secret = "x".repeat(SECRET_CAPACITY + 1);
        let err = encrypt(CipherKind::Aes256Cbc, b"k", &secret, &mut OsSecureRandom)
            .expect_err("expected over-long secret to be rejected");
        assert_eq!(err.kind, Some(ErrorKind::SecretTooLong));
    }

    #[test]
    fn test_nul_in_secret_rejected() {
        let err = encrypt(CipherKind::Aes256Cbc, b"k", "a\0b", &mut OsSecureRandom)
            .expect_err("expected NUL rejection");
        assert_eq!(err.kind, Some(ErrorKind::InvalidSecret));
        assert_eq!(err.category, ErrorCategory::User);
    }

    #[test]
    fn test_same_input_different_ciphertext() {
        let ct1 = encrypt(CipherKind::Aes256Cbc, b"k", "same", &mut OsSecureRandom).unwrap();
        let ct2 = encrypt(CipherKind::Aes256Cbc, b"k", "same", &mut OsSecureRandom).unwrap();
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn test_deterministic_encryption() {
        let kind = CipherKind::Aes256Cbc;
        let iv = [2u8; BLOCK_LEN];
        let prefix = [3u8; BLOCK_LEN];
        let ct1 = encrypt_deterministic(kind, b"k", "hello", &iv, &prefix).unwrap();
        let ct2 = encrypt_deterministic(kind, b"k", "hello", &iv, &prefix).unwrap();
        assert_eq!(ct1, ct2);
    }

    #[test]
    fn test_iv_only_affects_first_block() {
        let kind = CipherKind::Aes256Cbc;
        let prefix = [3u8; BLOCK_LEN];
        let ct1 = encrypt_deterministic(kind, b"k", "hello", &[1u8; BLOCK_LEN], &prefix).unwrap();
        let ct2 = encrypt_deterministic(kind, b"k", "hello", &[9u8; BLOCK_LEN], &prefix).unwrap();
        assert_ne!(ct1, ct2);
        assert_eq!(ct1[BLOCK_LEN..], ct2[BLOCK_LEN..]);

        // Both still decrypt, whatever IV decryption happens to draw.
        for ct in [&ct1, &ct2] {
            let pt = decrypt(kind, b"k", ct, &mut OsSecureRandom).unwrap();
            assert_eq!(pt.as_str(), "hello");
        }
    }

    #[test]
    fn test_wrong_passphrase() {
        let mut rng = OsSecureRandom;
        let ct = encrypt(CipherKind::Aes256Cbc, b"hunter2", "s3cr3t", &mut rng).unwrap();
        let err = decrypt(CipherKind::Aes256Cbc, b"wrong", &ct, &mut rng)
            .expect_err("expected wrong passphrase to fail");
        assert_eq!(err.kind, Some(ErrorKind::PassphraseVerificationFailed));
    }

    #[test]
    fn test_wrong_cipher_kind() {
        let mut rng = OsSecureRandom;
        let ct = encrypt(CipherKind::Aes256Cbc, b"hunter2", "s3cr3t", &mut rng).unwrap();
        let result = decrypt(CipherKind::Aes128Cbc, b"hunter2", &ct, &mut rng);
        assert!(result.is_err());
    }

    #[test]
    fn test_truncated_ciphertext() {
        let ct = encrypt(CipherKind::Aes256Cbc, b"k", "abc", &mut OsSecureRandom).unwrap();
        let truncated = &ct[..BUFSIZE - BLOCK_LEN];
        let err = decrypt(CipherKind::Aes256Cbc, b"k", truncated, &mut OsSecureRandom)
            .expect_err("expected size mismatch");
        assert_eq!(err.kind, Some(ErrorKind::BufferSize));
    }

    #[test]
    fn test_trailing_ciphertext() {
        let mut ct = encrypt(CipherKind::Aes256Cbc, b"k", "abc", &mut OsSecureRandom).unwrap();
        ct.push(0xff);
        let err = decrypt(CipherKind::Aes256Cbc, b"k", &ct, &mut OsSecureRandom)
            .expect_err("expected size mismatch");
        assert_eq!(err.kind, Some(ErrorKind::BufferSize));
    }

    #[test]
    fn test_tampered_last_block() {
        let mut ct = encrypt(CipherKind::Aes256Cbc, b"k", "abc", &mut OsSecureRandom).unwrap();
        ct[BUFSIZE - 1] ^= 0x01;
        let result = decrypt(CipherKind::Aes256Cbc, b"k", &ct, &mut OsSecureRandom);
        assert!(result.is_err());
    }

    #[test]
    fn test_random_failure_propagates() {
        struct Exhausted;
        impl SecureRandom for Exhausted {
            fn fill(&mut self, _buf: &mut [u8]) -> Result<()> {
                Err(PassvaultError::with_kind(
                    ErrorCategory::Internal,
                    ErrorKind::RandomSourceFailed,
                    "simulated exhaustion",
                ))
            }
        }

        let err = encrypt(CipherKind::Aes256Cbc, b"k", "abc", &mut Exhausted)
            .expect_err("expected random failure");
        assert_eq!(err.kind, Some(ErrorKind::RandomSourceFailed));
    }

    #[test]
    fn test_extract_secret_layout() {
        let mut body = vec![0u8; SECRET_CAPACITY];
        body[..3].copy_from_slice(b"abc");
        assert_eq!(extract_secret(&body).unwrap().as_str(), "abc");

        body[50] = 1;
        let err = extract_secret(&body).expect_err("expected garbage after NUL to fail");
        assert_eq!(err.kind, Some(ErrorKind::PassphraseVerificationFailed));

        let invalid_utf8 = vec![0xffu8; SECRET_CAPACITY];
        assert!(extract_secret(&invalid_utf8).is_err());
    }

    #[test]
    fn test_legacy_is_involution() {
        let once = legacy_transform(b"oldsecret");
        assert_ne!(once, b"oldsecret");
        assert_eq!(legacy_transform(&once), b"oldsecret");
    }

    #[test]
    fn test_legacy_backend_ignores_passphrase() {
        let backend = CipherBackend::Legacy;
        let mut rng = OsSecureRandom;
        let ct = backend.encrypt("oldsecret", b"any", &mut rng).unwrap();
        let pt = backend.decrypt(&ct, b"other", &mut rng).unwrap();
        assert_eq!(pt.as_str(), "oldsecret");
    }

    #[test]
    fn test_cipher_names() {
        for kind in [CipherKind::Aes256Cbc, CipherKind::Aes128Cbc] {
            assert_eq!(CipherKind::from_name(kind.name()), Some(kind));
            assert_eq!(kind.iv_len(), kind.block_len());
        }
        assert_eq!(CipherKind::from_name("aes-256-cbc"), None);
        assert_eq!(CipherKind::from_name("DES-CBC"), None);
    }
}
