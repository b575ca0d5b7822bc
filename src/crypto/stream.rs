//! AES-CFB stream cipher with independent per-direction keystreams.
//!
//! Each direction of a tunnel gets its own IV: the encrypt side draws a
//! fresh one from the OS RNG, the decrypt side takes whatever the peer
//! sent. CFB is self-synchronising on full blocks but here it is used as a
//! plain keystream; the buffered mode carries the partial-block position
//! across calls so arbitrary chunking gives the same bytes as one call.

use aes::{Aes128, Aes192, Aes256};
use cfb_mode::cipher::KeyIvInit;
use cfb_mode::{BufDecryptor, BufEncryptor};

use crate::crypto::{derive_key, CipherKey, Method, SecureRandom, IV_SIZE};
use crate::error::{Error, Result};

/// Lifecycle of one keystream direction.
enum Keystream<T> {
    /// No IV yet
    Uninitialized,
    /// Keystream seeded and advancing
    Ready(T),
}

enum Encryptor {
    Aes128(BufEncryptor<Aes128>),
    Aes192(BufEncryptor<Aes192>),
    Aes256(BufEncryptor<Aes256>),
}

impl Encryptor {
    fn new(method: Method, key: &CipherKey, iv: &[u8]) -> Result<Self> {
        let key = key.as_bytes();
        let invalid = |_| Error::crypto("key or iv length does not match cipher");
        Ok(match method {
            Method::Aes128Cfb => Encryptor::Aes128(BufEncryptor::new_from_slices(key, iv).map_err(invalid)?),
            Method::Aes192Cfb => Encryptor::Aes192(BufEncryptor::new_from_slices(key, iv).map_err(invalid)?),
            Method::Aes256Cfb => Encryptor::Aes256(BufEncryptor::new_from_slices(key, iv).map_err(invalid)?),
        })
    }

    fn apply(&mut self, data: &mut [u8]) {
        match self {
            Encryptor::Aes128(c) => c.encrypt(data),
            Encryptor::Aes192(c) => c.encrypt(data),
            Encryptor::Aes256(c) => c.encrypt(data),
        }
    }
}

enum Decryptor {
    Aes128(BufDecryptor<Aes128>),
    Aes192(BufDecryptor<Aes192>),
    Aes256(BufDecryptor<Aes256>),
}

impl Decryptor {
    fn new(method: Method, key: &CipherKey, iv: &[u8]) -> Result<Self> {
        let key = key.as_bytes();
        let invalid = |_| Error::crypto("key or iv length does not match cipher");
        Ok(match method {
            Method::Aes128Cfb => Decryptor::Aes128(BufDecryptor::new_from_slices(key, iv).map_err(invalid)?),
            Method::Aes192Cfb => Decryptor::Aes192(BufDecryptor::new_from_slices(key, iv).map_err(invalid)?),
            Method::Aes256Cfb => Decryptor::Aes256(BufDecryptor::new_from_slices(key, iv).map_err(invalid)?),
        })
    }

    fn apply(&mut self, data: &mut [u8]) {
        match self {
            Decryptor::Aes128(c) => c.decrypt(data),
            Decryptor::Aes192(c) => c.decrypt(data),
            Decryptor::Aes256(c) => c.decrypt(data),
        }
    }
}

/// Per-connection cipher state.
///
/// Holds the derived key and two keystreams that are seeded lazily: the
/// encrypt side by [`Cipher::begin_encrypt`], the decrypt side by
/// [`Cipher::begin_decrypt`].
pub struct Cipher {
    method: Method,
    key: CipherKey,
    enc: Keystream<Encryptor>,
    dec: Keystream<Decryptor>,
}

impl Cipher {
    /// Create a cipher from a method name and password.
    pub fn new(method_name: &str, password: &str) -> Self {
        let method = Method::from_name(method_name);
        Self::with_key(method, derive_key(method, password))
    }

    /// Create a cipher from an already-derived key.
    ///
    /// Agents derive the key once at startup and hand a clone to every
    /// connection.
    pub fn with_key(method: Method, key: CipherKey) -> Self {
        Self {
            method,
            key,
            enc: Keystream::Uninitialized,
            dec: Keystream::Uninitialized,
        }
    }

    /// Generate a random IV and seed the encrypt keystream with it.
    ///
    /// The IV is returned so it can be sent to the peer ahead of any
    /// ciphertext.
    pub fn begin_encrypt(&mut self) -> Result<[u8; IV_SIZE]> {
        let iv: [u8; IV_SIZE] = SecureRandom::bytes()?;
        self.enc = Keystream::Ready(Encryptor::new(self.method, &self.key, &iv)?);
        Ok(iv)
    }

    /// Seed the decrypt keystream with the IV received from the peer.
    pub fn begin_decrypt(&mut self, iv: &[u8]) -> Result<()> {
        if iv.len() != IV_SIZE {
            return Err(Error::InvalidIvLength(iv.len()));
        }
        self.dec = Keystream::Ready(Decryptor::new(self.method, &self.key, iv)?);
        Ok(())
    }

    /// Whether [`Cipher::begin_encrypt`] has run.
    pub fn is_encrypt_ready(&self) -> bool {
        matches!(self.enc, Keystream::Ready(_))
    }

    /// Whether [`Cipher::begin_decrypt`] has run.
    pub fn is_decrypt_ready(&self) -> bool {
        matches!(self.dec, Keystream::Ready(_))
    }

    /// Encrypt `buf` in place, advancing the encrypt keystream.
    pub fn encrypt(&mut self, buf: &mut [u8]) -> Result<()> {
        match &mut self.enc {
            Keystream::Ready(enc) => {
                enc.apply(buf);
                Ok(())
            }
            Keystream::Uninitialized => Err(Error::crypto("encrypt keystream not initialized")),
        }
    }

    /// Decrypt `buf` in place, advancing the decrypt keystream.
    pub fn decrypt(&mut self, buf: &mut [u8]) -> Result<()> {
        match &mut self.dec {
            Keystream::Ready(dec) => {
                dec.apply(buf);
                Ok(())
            }
            Keystream::Uninitialized => Err(Error::crypto("decrypt keystream not initialized")),
        }
    }
}
