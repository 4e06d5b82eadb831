//! Textual representation of stored secrets
//!
//! A stored secret is one of:
//! - `""`: no secret
//! - `!{base64}`: legacy obfuscation
//! - `{ALGORITHM}{base64}`: modern cipher, e.g. `{AES-256-CBC}...`
//! - anything else: plaintext from a configuration that predates encryption
//!
//! Base64 is the standard alphabet with padding, as found in existing configs.

use crate::cipher::CipherKind;
use crate::error::{ErrorCategory, ErrorKind, PassvaultError, Result};
use base64::{Engine, engine::general_purpose::STANDARD};

/// Marker of the legacy format
const LEGACY_MARKER: char = '!';

/// Opening and closing markers of the modern format
const ALGORITHM_OPEN: char = '{';
const ALGORITHM_CLOSE: char = '}';

/// A stored secret, parsed into its format but not yet decrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireSecret {
    Empty,
    Legacy(Vec<u8>),
    Modern {
        kind: CipherKind,
        ciphertext: Vec<u8>,
    },
    Plaintext(String),
}

/// Classify and unwrap a stored secret. Unrecognized `{...}` markers are an
/// error, never plaintext.
pub fn parse(text: &str) -> Result<WireSecret> {
    if text.is_empty() {
        return Ok(WireSecret::Empty);
    }

    if let Some(encoded) = text.strip_prefix(LEGACY_MARKER) {
        if encoded.is_empty() {
            return Ok(WireSecret::Empty);
        }
        return Ok(WireSecret::Legacy(decode_base64(encoded)?));
    }

    if let Some(rest) = text.strip_prefix(ALGORITHM_OPEN) {
        let (name, encoded) = rest.split_once(ALGORITHM_CLOSE).ok_or_else(|| {
            PassvaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::MalformedWireString,
                "algorithm marker is not closed",
            )
        })?;
        let kind = CipherKind::from_name(name).ok_or_else(|| {
            PassvaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::UnknownAlgorithm,
                format!("secret is encrypted with unsupported cipher {:?}", name),
            )
        })?;
        if encoded.is_empty() {
            return Err(PassvaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::MalformedWireString,
                "encrypted secret has no payload",
            ));
        }
        return Ok(WireSecret::Modern {
            kind,
            ciphertext: decode_base64(encoded)?,
        });
    }

    Ok(WireSecret::Plaintext(text.to_owned()))
}

/// Format: {ALGORITHM}{base64}
pub fn wrap_modern(kind: CipherKind, ciphertext: &[u8]) -> String {
    let name = kind.name();
    let encoded = STANDARD.encode(ciphertext);
    format!("{}{}{}{}", ALGORITHM_OPEN, name, ALGORITHM_CLOSE, encoded)
}

/// Format: !{base64}
pub fn wrap_legacy(ciphertext: &[u8]) -> String {
    format!("{}{}", LEGACY_MARKER, STANDARD.encode(ciphertext))
}

fn decode_base64(encoded: &str) -> Result<Vec<u8>> {
    STANDARD.decode(encoded).map_err(|e| {
        PassvaultError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::MalformedWireString,
            format!("base64 decoding failed: {}", e),
            e,
        )
    })
}
