//! Cryptographically strong random bytes

use crate::error::{ErrorCategory, ErrorKind, PassvaultError, Result};
use rand::RngCore;
use rand::rngs::OsRng;

/// A source of unpredictable bytes for IVs and buffer padding.
pub trait SecureRandom {
    /// Fill `buf` completely, or fail without a partial result being used.
    fn fill(&mut self, buf: &mut [u8]) -> Result<()>;
}

/// Draws from the operating system's random device.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSecureRandom;

impl SecureRandom for OsSecureRandom {
    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        OsRng.try_fill_bytes(buf).map_err(|e| {
            PassvaultError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::RandomSourceFailed,
                format!("failed to read {} random bytes", buf.len()),
                e,
            )
        })
    }
}

impl<T: SecureRandom + ?Sized> SecureRandom for &mut T {
    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).fill(buf)
    }
}
