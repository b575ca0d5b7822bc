//! Secure random number generation.
//!
//! Provides cryptographically secure random bytes using the operating
//! system's entropy source. Used for per-connection IVs.

use rand::RngCore;
use rand_core::OsRng;

use crate::error::{Error, Result};

/// Cryptographically secure random number generator.
///
/// Wraps the OS-provided entropy source (e.g., /dev/urandom on Unix,
/// BCryptGenRandom on Windows).
pub struct SecureRandom;

impl SecureRandom {
    /// Fill a buffer with cryptographically secure random bytes.
    ///
    /// An unavailable entropy source is reported as an error.
    pub fn try_fill(dest: &mut [u8]) -> Result<()> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| Error::crypto(format!("can't build random iv: {}", e)))
    }

    /// Generate a fixed-size array of random bytes.
    pub fn bytes<const N: usize>() -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        Self::try_fill(&mut buf)?;
        Ok(buf)
    }
}
