//! Encrypted byte stream.
//!
//! Wraps any async transport and encrypts it with a [`Cipher`]. There is no
//! separate handshake message: the first write sends the local IV in front
//! of the first ciphertext, and the first read consumes the peer's IV before
//! returning any plaintext.
//!
//! ```text
//!  outbound:  | IV (16, plain) | ciphertext ...
//!  inbound:   | IV (16, plain) | ciphertext ...
//! ```

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::crypto::{Cipher, IV_SIZE};
use crate::transport::BufferPool;

/// Inbound handshake progress.
enum ReadState {
    /// Collecting the peer's IV; `filled` bytes received so far
    AwaitingIv { iv: [u8; IV_SIZE], filled: usize },
    /// IV consumed, every further byte is ciphertext
    Ready,
}

/// Ciphertext committed by `poll_write` but not yet accepted by the transport.
struct PendingWrite {
    buf: Vec<u8>,
    len: usize,
    pos: usize,
}

/// A transport whose bytes are AES-CFB encrypted in both directions.
///
/// Reads and writes must each be driven by one task at a time; use
/// [`tokio::io::split`] to drive the two directions concurrently.
pub struct EncryptedStream<S> {
    inner: S,
    cipher: Cipher,
    pool: Arc<BufferPool>,
    read_state: ReadState,
    pending: Option<PendingWrite>,
}

impl<S> EncryptedStream<S> {
    /// Wrap `inner`. No I/O happens until the first read or write.
    pub fn new(inner: S, cipher: Cipher, pool: Arc<BufferPool>) -> Self {
        Self {
            inner,
            cipher,
            pool,
            read_state: ReadState::AwaitingIv {
                iv: [0u8; IV_SIZE],
                filled: 0,
            },
            pending: None,
        }
    }

    /// Whether the peer's IV has been received.
    pub fn is_read_ready(&self) -> bool {
        matches!(self.read_state, ReadState::Ready)
    }

    /// Whether our IV has been sent (or committed for sending).
    pub fn is_write_ready(&self) -> bool {
        self.cipher.is_encrypt_ready()
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> EncryptedStream<S> {
    /// Read the peer's IV if it has not arrived yet.
    ///
    /// Resolves to `false` when the transport ends cleanly before any IV
    /// byte was seen.
    fn poll_read_iv(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<bool>> {
        loop {
            let (iv, filled) = match &mut self.read_state {
                ReadState::Ready => return Poll::Ready(Ok(true)),
                ReadState::AwaitingIv { iv, filled } => (iv, filled),
            };

            if *filled == IV_SIZE {
                let iv = *iv;
                self.cipher.begin_decrypt(&iv)?;
                self.read_state = ReadState::Ready;
                tracing::trace!("decrypt keystream initialized");
                continue;
            }

            let mut rb = ReadBuf::new(&mut iv[*filled..]);
            ready!(Pin::new(&mut self.inner).poll_read(cx, &mut rb))?;
            let n = rb.filled().len();
            if n == 0 {
                if *filled == 0 {
                    return Poll::Ready(Ok(false));
                }
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("connection closed after {} of {} iv bytes", filled, IV_SIZE),
                )));
            }
            *filled += n;
        }
    }

    /// Encrypt `payload` into a pooled buffer, prefixed by our IV on first use.
    fn stage(&mut self, payload: &[u8]) -> io::Result<()> {
        let iv = if self.cipher.is_encrypt_ready() {
            None
        } else {
            let iv = self.cipher.begin_encrypt()?;
            tracing::trace!("encrypt keystream initialized");
            Some(iv)
        };

        let iv_len = if iv.is_some() { IV_SIZE } else { 0 };
        let len = iv_len + payload.len();
        let mut buf = self.pool.get_at_least(len);
        if let Some(iv) = iv {
            buf[..IV_SIZE].copy_from_slice(&iv);
        }
        buf[iv_len..len].copy_from_slice(payload);
        self.cipher.encrypt(&mut buf[iv_len..len])?;

        self.pending = Some(PendingWrite { buf, len, pos: 0 });
        Ok(())
    }

    /// Push staged ciphertext into the transport.
    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        loop {
            let pending = match self.pending.as_mut() {
                None => return Poll::Ready(Ok(())),
                Some(pending) => pending,
            };

            if pending.pos < pending.len {
                let n = ready!(Pin::new(&mut self.inner)
                    .poll_write(cx, &pending.buf[pending.pos..pending.len]))?;
                if n == 0 {
                    return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
                }
                pending.pos += n;
                continue;
            }

            if let Some(done) = self.pending.take() {
                self.pool.put(done.buf);
            }
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncRead for EncryptedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if !ready!(this.poll_read_iv(cx))? {
            return Poll::Ready(Ok(()));
        }

        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        this.cipher.decrypt(&mut buf.filled_mut()[before..])?;
        Poll::Ready(Ok(()))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncWrite for EncryptedStream<S> {
    /// Accepts all of `buf` once earlier ciphertext has been handed to the
    /// transport. The count is in plaintext bytes; IV and ciphertext that the
    /// transport has not taken yet are sent on the next write, flush or
    /// shutdown.
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        ready!(this.poll_drain(cx))?;
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        this.stage(buf)?;
        if let Poll::Ready(Err(e)) = this.poll_drain(cx) {
            return Poll::Ready(Err(e));
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    fn pool() -> Arc<BufferPool> {
        Arc::new(BufferPool::new(64, 8))
    }

    #[tokio::test]
    async fn test_first_write_carries_iv() {
        let (a, mut raw) = duplex(1024);
        let mut enc = EncryptedStream::new(a, Cipher::new("aes-256-cfb", "pw"), pool());
        assert!(!enc.is_write_ready());

        enc.write_all(b"hello").await.unwrap();
        enc.flush().await.unwrap();
        assert!(enc.is_write_ready());

        let mut wire = [0u8; IV_SIZE + 5];
        raw.read_exact(&mut wire).await.unwrap();

        let mut peer = Cipher::new("aes-256-cfb", "pw");
        peer.begin_decrypt(&wire[..IV_SIZE]).unwrap();
        let mut body = wire[IV_SIZE..].to_vec();
        peer.decrypt(&mut body).unwrap();
        assert_eq!(body, b"hello");

        // No second IV on later writes
        enc.write_all(b" world").await.unwrap();
        enc.flush().await.unwrap();
        let mut more = [0u8; 6];
        raw.read_exact(&mut more).await.unwrap();
        peer.decrypt(&mut more).unwrap();
        assert_eq!(&more, b" world");
    }

    #[tokio::test]
    async fn test_roundtrip_between_two_ends() {
        let (a, b) = duplex(1024);
        let mut left = EncryptedStream::new(a, Cipher::new("aes-128-cfb", "pw"), pool());
        let mut right = EncryptedStream::new(b, Cipher::new("aes-128-cfb", "pw"), pool());

        left.write_all(b"ping").await.unwrap();
        left.flush().await.unwrap();
        let mut buf = [0u8; 4];
        right.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        assert!(right.is_read_ready());

        right.write_all(b"pong").await.unwrap();
        right.flush().await.unwrap();
        left.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[tokio::test]
    async fn test_short_reads_pass_through() {
        let (a, mut raw) = duplex(1024);
        let mut enc = EncryptedStream::new(a, Cipher::new("aes-256-cfb", "pw"), pool());

        let mut peer = Cipher::new("aes-256-cfb", "pw");
        let iv = peer.begin_encrypt().unwrap();
        let mut body = b"abc".to_vec();
        peer.encrypt(&mut body).unwrap();
        raw.write_all(&iv).await.unwrap();
        raw.write_all(&body).await.unwrap();

        let mut buf = [0u8; 100];
        let n = enc.read(&mut buf).await.unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf[..3], b"abc");
    }

    #[tokio::test]
    async fn test_clean_eof_before_iv() {
        let (a, raw) = duplex(64);
        let mut enc = EncryptedStream::new(a, Cipher::new("aes-256-cfb", "pw"), pool());
        drop(raw);

        let mut buf = [0u8; 8];
        assert_eq!(enc.read(&mut buf).await.unwrap(), 0);
        assert!(!enc.is_read_ready());
    }

    #[tokio::test]
    async fn test_truncated_iv_fails() {
        let (a, mut raw) = duplex(64);
        let mut enc = EncryptedStream::new(a, Cipher::new("aes-256-cfb", "pw"), pool());
        raw.write_all(&[7u8; 5]).await.unwrap();
        drop(raw);

        let mut buf = [0xEEu8; 8];
        let err = enc.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(buf, [0xEEu8; 8]);
    }

    #[tokio::test]
    async fn test_large_write_through_small_pipe() {
        // Pipe smaller than one write forces partial transport writes
        let (a, b) = duplex(64);
        let shared = pool();
        let mut writer = EncryptedStream::new(a, Cipher::new("aes-192-cfb", "pw"), Arc::clone(&shared));
        let mut reader = EncryptedStream::new(b, Cipher::new("aes-192-cfb", "pw"), shared);

        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();

        let send = tokio::spawn(async move {
            writer.write_all(&payload).await.unwrap();
            writer.write_all(&payload).await.unwrap();
            writer.shutdown().await.unwrap();
        });

        let mut received = Vec::new();
        reader.read_to_end(&mut received).await.unwrap();
        send.await.unwrap();

        assert_eq!(received.len(), expected.len() * 2);
        assert_eq!(&received[..expected.len()], &expected[..]);
        assert_eq!(&received[expected.len()..], &expected[..]);
    }
}
