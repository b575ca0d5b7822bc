//! Agent accept loop and per-role session handlers.
//!
//! ```text
//!  local role:
//!    app ──SOCKS5──▶ [local agent] ══IV+AES-CFB══▶ [server agent] ──TCP──▶ destination
//!
//!  first tunnel payload: ATYP | DST.ADDR | DST.PORT, then application bytes
//! ```
//!
//! Every accepted connection runs on its own task. A failing session is
//! logged and dropped; the accept loop never stops because of one.

pub mod config;
mod metrics;

pub use config::{AgentConfig, AgentConfigFile, Role, DEFAULT_CONNECT_TIMEOUT, DEFAULT_METHOD};
pub use metrics::AgentMetrics;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::Level;

use crate::crypto::{Cipher, CipherKey, Method};
use crate::error::{Error, Result};
use crate::proxy::{relay, socks5, Address};
use crate::transport::{BufferPool, EncryptedStream};

/// A running agent in either role.
pub struct Agent {
    config: Arc<AgentConfig>,
    role: Role,
    method: Method,
    key: CipherKey,
    pool: Arc<BufferPool>,
    metrics: Arc<AgentMetrics>,
}

impl Agent {
    /// Create an agent with its own buffer pool.
    pub fn new(config: AgentConfig) -> Result<Self> {
        Self::with_pool(config, Arc::new(BufferPool::default()))
    }

    /// Create an agent sharing an existing buffer pool.
    pub fn with_pool(config: AgentConfig, pool: Arc<BufferPool>) -> Result<Self> {
        config.validate()?;
        let role = config.role()?;

        Ok(Self {
            role,
            method: config.method(),
            key: config.key(),
            config: Arc::new(config),
            pool,
            metrics: Arc::new(AgentMetrics::new()),
        })
    }

    /// Role this agent plays.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Get agent metrics.
    pub fn metrics(&self) -> Arc<AgentMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Bind the configured listen address and serve forever.
    pub async fn run(&self) -> Result<()> {
        let addr = self.config.listen_addr()?;
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Accept connections on `listener` forever.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        tracing::info!(
            "{} agent listening at {} ({})",
            self.role,
            listener.local_addr()?,
            self.method
        );

        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let role = self.role;
                    let config = Arc::clone(&self.config);
                    let cipher = Cipher::with_key(self.method, self.key.clone());
                    let pool = Arc::clone(&self.pool);
                    let metrics = Arc::clone(&self.metrics);

                    tokio::spawn(async move {
                        metrics.increment_connections();

                        let result = match role {
                            Role::Local => {
                                Self::handle_local(config, cipher, pool, stream, peer_addr).await
                            }
                            Role::Server => {
                                Self::handle_server(config, cipher, pool, stream, peer_addr).await
                            }
                        };
                        if let Err(e) = result {
                            metrics.increment_failed();
                            log_session_failure(peer_addr, &e);
                        }

                        metrics.decrement_connections();
                    });
                }
                Err(e) => {
                    self.metrics.increment_accept_errors();
                    tracing::warn!("Accept error: {}", e);
                }
            }
        }
    }

    /// SOCKS5 in, encrypted tunnel out.
    async fn handle_local(
        config: Arc<AgentConfig>,
        cipher: Cipher,
        pool: Arc<BufferPool>,
        mut client: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<()> {
        client.set_nodelay(true)?;

        let target = socks5::accept(&mut client).await?;

        let server_addr = config
            .server_addr
            .as_deref()
            .ok_or_else(|| Error::config("local role without server address"))?;
        let remote = dial(server_addr, config.connect_timeout).await?;
        tracing::info!("connecting {} <-> {} <-> {}", peer_addr, server_addr, target);

        let mut remote = EncryptedStream::new(remote, cipher, Arc::clone(&pool));
        remote.write_all(target.as_bytes()).await?;
        remote.flush().await?;

        relay(client, remote, config.timeout, pool).await;
        Ok(())
    }

    /// Encrypted tunnel in, plaintext destination out.
    async fn handle_server(
        config: Arc<AgentConfig>,
        cipher: Cipher,
        pool: Arc<BufferPool>,
        client: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<()> {
        client.set_nodelay(true)?;

        let mut client = EncryptedStream::new(client, cipher, Arc::clone(&pool));
        let target = Address::read_from(&mut client).await?;

        let remote = dial(&target.to_string(), config.connect_timeout).await?;
        tracing::info!("connecting {} <-> {}", peer_addr, target);

        relay(client, remote, config.timeout, pool).await;
        Ok(())
    }
}

/// Log level for a failed session: protocol violations at warn, transport
/// failures at debug, anything else at info.
fn failure_level(e: &Error) -> Level {
    if e.is_protocol_violation() {
        Level::WARN
    } else if e.is_transport() {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

fn log_session_failure(peer_addr: SocketAddr, e: &Error) {
    let level = failure_level(e);
    if level == Level::WARN {
        tracing::warn!("session from {} rejected: {}", peer_addr, e);
    } else if level == Level::DEBUG {
        tracing::debug!("session from {} closed: {}", peer_addr, e);
    } else {
        tracing::info!("session from {} failed: {}", peer_addr, e);
    }
}

/// Open a plaintext TCP connection, bounded by `limit`.
async fn dial(addr: &str, limit: Duration) -> Result<TcpStream> {
    let stream = timeout(limit, TcpStream::connect(addr))
        .await
        .map_err(|_| Error::Timeout(limit.as_millis() as u64))?
        .map_err(|e| {
            tracing::debug!("fail to dial {}: {}", addr, e);
            Error::Network(e)
        })?;
    stream.set_nodelay(true)?;
    Ok(stream)
}
