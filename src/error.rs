//! Error types for the tunnel.

use thiserror::Error;

/// Result type alias for tunnel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while serving a tunnelled connection.
///
/// Every variant is fatal to the connection it occurred on and to nothing
/// else; the accept loop keeps running.
#[derive(Error, Debug)]
pub enum Error {
    /// Cryptographic operation failed
    #[error("cryptographic error: {0}")]
    Crypto(String),

    /// Peer sent an IV of the wrong size
    #[error("invalid IV length: {0}")]
    InvalidIvLength(usize),

    /// SOCKS protocol version mismatch
    #[error("protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Version this side speaks
        expected: u8,
        /// Version the peer sent
        actual: u8,
    },

    /// Request or greeting did not have the length its header announced
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// SOCKS command other than CONNECT
    #[error("unsupported socks command: 0x{0:02x}")]
    UnsupportedCommand(u8),

    /// Address type outside IPv4 / domain / IPv6
    #[error("unsupported address type: 0x{0:02x}")]
    UnsupportedAddressType(u8),

    /// Connection timeout
    #[error("connection timeout after {0}ms")]
    Timeout(u64),

    /// Network I/O error
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new cryptographic error
    pub fn crypto(msg: impl Into<String>) -> Self {
        Error::Crypto(msg.into())
    }

    /// Create a new malformed-header error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedHeader(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Check if the peer violated the SOCKS or tunnel framing protocol
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Error::VersionMismatch { .. }
                | Error::MalformedHeader(_)
                | Error::UnsupportedCommand(_)
                | Error::UnsupportedAddressType(_)
        )
    }

    /// Check if this error came from the underlying transport
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Timeout(_))
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Network(e) => e,
            Error::Timeout(_) => std::io::Error::new(std::io::ErrorKind::TimedOut, err),
            Error::InvalidIvLength(_) | Error::Crypto(_) => {
                std::io::Error::new(std::io::ErrorKind::InvalidData, err)
            }
            other => std::io::Error::new(std::io::ErrorKind::InvalidInput, other),
        }
    }
}
