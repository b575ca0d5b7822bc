//! # cftun
//!
//! An encrypted SOCKS5 tunnel. A local agent accepts SOCKS5 CONNECT
//! requests from applications and forwards each one over a single TCP
//! connection to a server agent, which dials the real destination.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Agent (accept loop, local / server session handlers)   │
//! ├─────────────────────────────────────────────────────────┤
//! │  Proxy (SOCKS5 front end, address codec, relay)         │
//! ├─────────────────────────────────────────────────────────┤
//! │  Transport (encrypted stream, buffer pool)              │
//! ├─────────────────────────────────────────────────────────┤
//! │  Crypto (SHA-256 key derivation, AES-CFB, OS RNG)       │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//!
//! Each direction of the tunnel starts with a random 16-byte IV, followed
//! by the AES-CFB encryption of everything written in that direction. The
//! first plaintext bytes from the local agent are the SOCKS5 address record
//! of the destination (`ATYP | DST.ADDR | DST.PORT`). There is no framing,
//! padding or authentication.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod agent;
pub mod crypto;
pub mod error;
pub mod proxy;
pub mod transport;

pub use error::{Error, Result};
