//! Password-based key derivation.
//!
//! The tunnel key is the SHA-256 digest of the shared password, truncated
//! to the key length of the selected method.

use std::fmt;

use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::MAX_KEY_SIZE;
use crate::error::{Error, Result};

/// Stream cipher method, named the way config files and flags spell it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// AES-128 in CFB mode (16-byte key)
    Aes128Cfb,
    /// AES-192 in CFB mode (24-byte key)
    Aes192Cfb,
    /// AES-256 in CFB mode (32-byte key)
    Aes256Cfb,
}

impl Method {
    /// Resolve a method name.
    ///
    /// Unrecognised names fall back to a 32-byte key, i.e. AES-256-CFB.
    pub fn from_name(name: &str) -> Self {
        match name {
            "aes-128-cfb" => Method::Aes128Cfb,
            "aes-192-cfb" => Method::Aes192Cfb,
            "aes-256-cfb" => Method::Aes256Cfb,
            other => {
                tracing::debug!("unknown method {:?}, using aes-256-cfb", other);
                Method::Aes256Cfb
            }
        }
    }

    /// Key length in bytes.
    pub fn key_len(self) -> usize {
        match self {
            Method::Aes128Cfb => 16,
            Method::Aes192Cfb => 24,
            Method::Aes256Cfb => 32,
        }
    }

    /// Canonical name.
    pub fn name(self) -> &'static str {
        match self {
            Method::Aes128Cfb => "aes-128-cfb",
            Method::Aes192Cfb => "aes-192-cfb",
            Method::Aes256Cfb => "aes-256-cfb",
        }
    }
}

impl Default for Method {
    fn default() -> Self {
        Method::Aes256Cfb
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Derived symmetric key.
///
/// Automatically zeroized when dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct CipherKey {
    bytes: [u8; MAX_KEY_SIZE],
    len: usize,
}

impl CipherKey {
    /// Use raw key bytes directly, bypassing password derivation.
    ///
    /// Only AES key sizes (16, 24 or 32 bytes) are accepted.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if !matches!(raw.len(), 16 | 24 | 32) {
            return Err(Error::crypto(format!("invalid key length: {}", raw.len())));
        }
        let mut bytes = [0u8; MAX_KEY_SIZE];
        bytes[..raw.len()].copy_from_slice(raw);
        Ok(Self {
            bytes,
            len: raw.len(),
        })
    }

    /// Get the raw key bytes.
    ///
    /// # Security
    ///
    /// Handle with care - this is secret key material.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Key length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; kept alongside `len` for clippy.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherKey").field("len", &self.len).finish_non_exhaustive()
    }
}

/// Derive the key for `method` from `password`.
pub fn derive_key(method: Method, password: &str) -> CipherKey {
    let digest = Sha256::digest(password.as_bytes());
    let mut bytes = [0u8; MAX_KEY_SIZE];
    bytes.copy_from_slice(&digest);
    CipherKey {
        bytes,
        len: method.key_len(),
    }
}
