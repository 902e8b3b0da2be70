//! Core graph client types and constants.

use std::fmt;

/// Version string sent in the client-version handshake.
pub const CLIENT_VERSION: &str = "3.0.0";

/// Default graph service port.
pub const DEFAULT_PORT: u16 = 9669;

/// Statement used by connection probes.
pub const PING_STATEMENT: &str = "YIELD 1";

/// Session ID used by probes that run without an authenticated session.
pub const PROBE_SESSION_ID: i64 = 0;

/// Status codes carried in every server response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ErrorCode {
    /// The request succeeded.
    #[default]
    Succeeded,
    /// The server dropped the connection.
    Disconnected,
    /// The server failed to reach a storage or meta service.
    FailToConnect,
    /// An internal RPC failed.
    RpcFailure,
    /// Unknown user or wrong password.
    BadUsernamePassword,
    /// Session ID is unknown to the server.
    SessionInvalid,
    /// Session expired on the server.
    SessionTimeout,
    /// Statement failed to parse.
    SyntaxError,
    /// Statement failed during execution.
    ExecutionError,
    /// Statement was empty.
    StatementEmpty,
    /// User lacks permission for the statement.
    BadPermission,
    /// Statement is semantically invalid.
    SemanticError,
    /// Server refuses more connections.
    TooManyConnections,
    /// Only part of the statement succeeded.
    PartialSucceeded,
    /// Client and server protocol versions do not match.
    ClientServerIncompatible,
    /// Any code not listed above.
    Other(i32),
}

impl ErrorCode {
    /// Create an ErrorCode from its raw wire value.
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::Succeeded,
            -1 => Self::Disconnected,
            -2 => Self::FailToConnect,
            -3 => Self::RpcFailure,
            -1001 => Self::BadUsernamePassword,
            -1002 => Self::SessionInvalid,
            -1003 => Self::SessionTimeout,
            -1004 => Self::SyntaxError,
            -1005 => Self::ExecutionError,
            -1006 => Self::StatementEmpty,
            -1008 => Self::BadPermission,
            -1009 => Self::SemanticError,
            -1010 => Self::TooManyConnections,
            -1011 => Self::PartialSucceeded,
            -3061 => Self::ClientServerIncompatible,
            other => Self::Other(other),
        }
    }

    /// Raw wire value.
    pub fn as_i32(&self) -> i32 {
        match self {
            Self::Succeeded => 0,
            Self::Disconnected => -1,
            Self::FailToConnect => -2,
            Self::RpcFailure => -3,
            Self::BadUsernamePassword => -1001,
            Self::SessionInvalid => -1002,
            Self::SessionTimeout => -1003,
            Self::SyntaxError => -1004,
            Self::ExecutionError => -1005,
            Self::StatementEmpty => -1006,
            Self::BadPermission => -1008,
            Self::SemanticError => -1009,
            Self::TooManyConnections => -1010,
            Self::PartialSucceeded => -1011,
            Self::ClientServerIncompatible => -3061,
            Self::Other(code) => *code,
        }
    }

    /// Check if this code indicates success.
    pub fn is_success(&self) -> bool {
        *self == Self::Succeeded
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(code) => write!(f, "Other({code})"),
            known => write!(f, "{known:?}({})", known.as_i32()),
        }
    }
}

/// A graph server endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostAddress {
    /// Host name or IP literal.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl HostAddress {
    /// Create a new endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // IPv6 literals must be bracketed to be joined with a port.
        if self.host.contains(':') && !self.host.starts_with('[') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
