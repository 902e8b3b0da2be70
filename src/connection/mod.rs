//! Connections to graph server endpoints.
//!
//! This module provides:
//! - [`Connection`], a per-endpoint connection with version handshake,
//!   authentication and one reopen on timeout
//! - Configuration for timeouts, TLS and buffering
//! - Connection state and statistics
//!
//! # Example
//!
//! ```no_run
//! use graphd_client::connection::Connection;
//! use graphd_client::HostAddress;
//! use std::time::Duration;
//!
//! let mut conn = Connection::new(HostAddress::new("127.0.0.1", 9669));
//! conn.open(Duration::from_secs(3), None).unwrap();
//!
//! let auth = conn.authenticate("root", "nebula").unwrap();
//! let session_id = auth.session_id.unwrap();
//!
//! let resp = conn.execute(session_id, "SHOW HOSTS").unwrap();
//! println!("{:?}", resp.error_code);
//!
//! conn.sign_out(session_id).unwrap();
//! conn.close();
//! ```

mod config;
mod managed;
mod state;

pub use config::{ConnectionConfig, DEFAULT_BUFFER_SIZE};
pub use managed::Connection;
pub use state::{ConnectionState, ConnectionStats};
