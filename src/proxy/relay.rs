//! Bidirectional byte relay.
//!
//! Copies bytes both ways between two connected streams until either side
//! closes, fails, or stays silent for longer than the idle timeout. Nothing
//! is reported back to the caller: the session simply ends.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::transport::BufferPool;

/// Default inactivity limit for one relay direction.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Relay traffic between `a` and `b`.
///
/// The `b -> a` direction runs on a spawned task, `a -> b` runs on the
/// caller's task. When the caller's direction ends the spawned one is
/// aborted, which drops (and so closes) both streams.
pub async fn relay<A, B>(a: A, b: B, idle_timeout: Duration, pool: Arc<BufferPool>)
where
    A: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let (a_reader, a_writer) = tokio::io::split(a);
    let (b_reader, b_writer) = tokio::io::split(b);

    let counterpart = tokio::spawn(pipe(b_reader, a_writer, idle_timeout, Arc::clone(&pool), "downstream"));
    pipe(a_reader, b_writer, idle_timeout, pool, "upstream").await;

    counterpart.abort();
    let _ = counterpart.await;
}

/// Copy one direction until EOF, error or idle timeout.
///
/// Returns the number of bytes copied.
pub async fn pipe<R, W>(
    mut src: R,
    mut dst: W,
    idle_timeout: Duration,
    pool: Arc<BufferPool>,
    direction: &'static str,
) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = pool.lease(pool.buf_size());
    let mut copied = 0u64;

    loop {
        let n = match timeout(idle_timeout, src.read(&mut buf[..])).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                tracing::debug!("{} read error: {}", direction, e);
                break;
            }
            Err(_) => {
                tracing::debug!("{} idle for {:?}, closing", direction, idle_timeout);
                break;
            }
        };

        if let Err(e) = dst.write_all(&buf[..n]).await {
            tracing::debug!("{} write error: {}", direction, e);
            break;
        }
        if let Err(e) = dst.flush().await {
            tracing::debug!("{} flush error: {}", direction, e);
            break;
        }
        copied += n as u64;
    }

    let _ = dst.shutdown().await;
    tracing::debug!("{} finished after {} bytes", direction, copied);
    copied
}
