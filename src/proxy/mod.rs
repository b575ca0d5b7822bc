//! Proxy protocols layered over the transport.
//!
//! Local side: SOCKS5 front end that turns an application request into an
//! address record. Both sides: the address record codec and the relay that
//! pumps bytes once a session is set up.

pub mod address;
pub mod relay;
pub mod socks5;

pub use address::Address;
pub use relay::{relay, DEFAULT_IDLE_TIMEOUT};
