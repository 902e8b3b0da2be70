//! Blocking connection layer for graph-query services, built on std::net.
//!
//! This crate provides the client side of a graph query service: a
//! per-endpoint [`Connection`] that opens a framed (optionally TLS)
//! transport, checks protocol compatibility, authenticates and executes
//! statements, plus a general-purpose [`AutoPool`] whose handles return to
//! the pool when dropped.
//!
//! # Features
//!
//! - Version handshake on every open
//! - Session authentication and sign-out
//! - Parameterized statements with plain or JSON results
//! - One transparent reopen when a call times out
//! - TLS through rustls
//!
//! # Example
//!
//! ```no_run
//! use graphd_client::{Connection, HostAddress, TlsConfig};
//! use std::time::Duration;
//!
//! let mut conn = Connection::new(HostAddress::new("graphd.example.com", 9669));
//! conn.open(Duration::from_secs(3), Some(TlsConfig::new())).unwrap();
//!
//! let session_id = conn.authenticate("root", "nebula").unwrap().session_id.unwrap();
//! let resp = conn.execute(session_id, "SHOW SPACES").unwrap();
//! assert!(resp.is_succeeded());
//!
//! conn.sign_out(session_id).unwrap();
//! conn.close();
//! ```
//!
//! # Wire Format
//!
//! Every message travels in a length-prefixed frame:
//!
//! ```text
//! +--------+--------+--------+--------+
//! |        Payload length (u32)       |  (4 bytes)
//! +--------+--------+--------+--------+
//! | Method |    Sequence ID (u32) ... |  (5 bytes)
//! +--------+--------+--------+--------+
//! |           Body ...                |  (variable)
//! +--------+--------+--------+--------+
//! ```

pub mod autopool;
pub mod codec;
pub mod connection;
pub mod error;
pub mod message;
pub mod rpc;
pub mod transport;
pub mod types;
pub mod value;

// Re-export commonly used types at the crate root
pub use autopool::{AutoPool, PoolStats, Pooled};
pub use connection::{Connection, ConnectionConfig, ConnectionState, ConnectionStats};
pub use error::{GraphError, Result};
pub use message::{AuthResponse, ExecutionResponse, Parameters};
pub use rpc::{Connector, GraphClient, GraphService, TcpConnector};
pub use transport::TlsConfig;
pub use types::{CLIENT_VERSION, DEFAULT_PORT, ErrorCode, HostAddress};
pub use value::Value;
