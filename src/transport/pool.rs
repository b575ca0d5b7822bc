//! Bounded buffer pool shared by every connection.
//!
//! Buffers are fixed-size byte vectors. Checkout never blocks: an empty
//! pool allocates a fresh buffer, and returning to a full pool drops the
//! buffer. Requests larger than the fixed size get a one-off allocation
//! that is never pooled.

use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;

/// Default buffer size (4 KiB)
pub const DEFAULT_BUFFER_SIZE: usize = 4 * 1024;

/// Default number of pooled buffers
pub const DEFAULT_POOL_CAPACITY: usize = 2048;

/// A bounded pool of fixed-size buffers.
pub struct BufferPool {
    buf_size: usize,
    capacity: usize,
    buffers: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    /// Create a pool of `capacity` slots holding `buf_size`-byte buffers.
    pub fn new(buf_size: usize, capacity: usize) -> Self {
        Self {
            buf_size,
            capacity,
            buffers: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// Size of the buffers this pool hands out.
    pub fn buf_size(&self) -> usize {
        self.buf_size
    }

    /// Number of buffers currently idle in the pool.
    pub fn len(&self) -> usize {
        self.buffers.lock().len()
    }

    /// Whether the pool holds no idle buffers.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take a `buf_size` buffer, allocating if the pool is empty.
    pub fn get(&self) -> Vec<u8> {
        let pooled = self.buffers.lock().pop();
        pooled.unwrap_or_else(|| vec![0u8; self.buf_size])
    }

    /// Take a buffer of at least `size` bytes.
    ///
    /// Sizes above `buf_size` are served by a one-off allocation of exactly
    /// `size` bytes.
    pub fn get_at_least(&self, size: usize) -> Vec<u8> {
        if size > self.buf_size {
            return vec![0u8; size];
        }
        self.get()
    }

    /// Return a buffer.
    ///
    /// Buffers whose length differs from `buf_size` are discarded, as are
    /// buffers returned while the pool is full.
    pub fn put(&self, buf: Vec<u8>) {
        if buf.len() != self.buf_size {
            return;
        }
        let mut buffers = self.buffers.lock();
        if buffers.len() < self.capacity {
            buffers.push(buf);
        }
    }

    /// Borrow a buffer that goes back to the pool when dropped.
    pub fn lease(&self, size: usize) -> PooledBuf<'_> {
        PooledBuf {
            pool: self,
            buf: Some(self.get_at_least(size)),
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE, DEFAULT_POOL_CAPACITY)
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("buf_size", &self.buf_size)
            .field("capacity", &self.capacity)
            .field("idle", &self.len())
            .finish()
    }
}

/// A buffer checked out of a [`BufferPool`], returned on drop.
pub struct PooledBuf<'a> {
    pool: &'a BufferPool,
    buf: Option<Vec<u8>>,
}

impl Deref for PooledBuf<'_> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        // Only None after drop
        self.buf.as_ref().expect("buffer taken")
    }
}

impl DerefMut for PooledBuf<'_> {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        self.buf.as_mut().expect("buffer taken")
    }
}

impl Drop for PooledBuf<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.put(buf);
        }
    }
}
