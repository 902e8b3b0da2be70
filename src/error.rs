//! Error types for graph client operations.

use std::io;
use thiserror::Error;

/// Errors that can occur while talking to a graph server.
#[derive(Error, Debug)]
pub enum GraphError {
    /// Socket or RPC channel failure.
    #[error("Transport error: {0}")]
    Transport(#[source] io::Error),

    /// The transport did not complete an operation within the configured timeout.
    #[error("Transport timed out: {0}")]
    Timeout(#[source] io::Error),

    /// The connection has no transport bound to it.
    #[error("Connection is not open")]
    NotOpen,

    /// Frame length exceeds the configured maximum.
    #[error("Frame too large: {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    /// Payload could not be decoded.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// TLS setup or handshake failure.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Host name could not be used for TLS server verification.
    #[error("Invalid TLS server name: {0}")]
    InvalidServerName(String),

    /// Server rejected the client's protocol version.
    #[error("Incompatible version between client and server: {0}")]
    IncompatibleVersion(String),

    /// Credentials were rejected, or the authentication call failed.
    #[error("Authentication failed: {0}")]
    Authentication(String),
}

/// Result type alias for graph client operations.
pub type Result<T> = std::result::Result<T, GraphError>;

impl From<io::Error> for GraphError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::Timeout(err),
            _ => Self::Transport(err),
        }
    }
}

impl GraphError {
    /// Create a new invalid message error.
    pub fn invalid_message(msg: impl Into<String>) -> Self {
        Self::InvalidMessage(msg.into())
    }

    /// Check if this error is a transport timeout.
    ///
    /// Timeouts are the only failures that trigger a reopen-and-retry in
    /// [`Connection::execute_with_parameter`](crate::connection::Connection::execute_with_parameter).
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Check if this error came from the transport rather than the server.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::Timeout(_)
                | Self::NotOpen
                | Self::FrameTooLarge { .. }
                | Self::Tls(_)
        )
    }
}
