//! Byte-stream plumbing shared by both agent roles.
//!
//! - [`BufferPool`]: bounded pool of fixed-size I/O buffers
//! - [`EncryptedStream`]: AES-CFB wrapper with a lazy IV handshake

mod encrypted;
mod pool;

pub use encrypted::EncryptedStream;
pub use pool::{BufferPool, PooledBuf, DEFAULT_BUFFER_SIZE, DEFAULT_POOL_CAPACITY};
