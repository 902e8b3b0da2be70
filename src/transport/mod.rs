//! Transport layer for graph server connections.
//!
//! This module opens plain or TLS sockets and frames RPC messages on them.

pub mod tcp;
pub mod tls;

pub use tcp::{FramedTransport, Stream, connect};
pub use tls::TlsConfig;
