//! Connection configuration types.

use std::time::Duration;

use crate::codec::MAX_FRAME_LENGTH;
use crate::transport::TlsConfig;

/// Default size of the transport read and write buffers (128 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 128 << 10;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Bound on connect, read and write. Zero means no timeout.
    pub timeout: Duration,
    /// TLS settings; `None` for a plain socket.
    pub tls: Option<TlsConfig>,
    /// Transport buffer size in bytes.
    pub buffer_size: usize,
    /// Largest frame accepted or sent.
    pub max_frame_length: u32,
    /// Disable Nagle's algorithm on the socket.
    pub nodelay: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::ZERO,
            tls: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_frame_length: MAX_FRAME_LENGTH,
            nodelay: true,
        }
    }
}

impl ConnectionConfig {
    /// Set the I/O timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use TLS with the given settings.
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Use a plain socket.
    pub fn without_tls(mut self) -> Self {
        self.tls = None;
        self
    }

    /// Set the transport buffer size.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set the maximum frame length.
    pub fn with_max_frame_length(mut self, max: u32) -> Self {
        self.max_frame_length = max;
        self
    }

    /// Enable or disable TCP_NODELAY.
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// The socket timeout, or `None` when unbounded.
    pub fn io_timeout(&self) -> Option<Duration> {
        (!self.timeout.is_zero()).then_some(self.timeout)
    }
}
