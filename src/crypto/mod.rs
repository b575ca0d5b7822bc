//! Cryptographic primitives for the tunnel.
//!
//! This module provides:
//! - Password-based key derivation (SHA-256, truncated per method)
//! - AES-CFB keystreams, one per direction, seeded by a per-connection IV
//! - Secure random number generation for IVs
//!
//! Key material is zeroized on drop.

mod kdf;
mod random;
mod stream;

pub use kdf::{derive_key, CipherKey, Method};
pub use random::SecureRandom;
pub use stream::Cipher;

/// Size of the per-direction IV in bytes (one AES block)
pub const IV_SIZE: usize = 16;

/// Largest supported key (AES-256)
pub const MAX_KEY_SIZE: usize = 32;
