//! Connection state tracking.

use std::time::Instant;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport is bound.
    #[default]
    Closed,
    /// A transport is bound and passed the version handshake.
    Open,
}

impl ConnectionState {
    /// Check if the connection is usable.
    pub fn is_open(&self) -> bool {
        *self == ConnectionState::Open
    }
}

/// Connection statistics.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    /// Number of transports opened, including reopens.
    pub open_count: u64,
    /// Number of failed open attempts.
    pub failure_count: u64,
    /// Number of timeout-triggered reopens.
    pub reopen_count: u64,
    /// Number of transport timeouts seen by `execute`.
    pub timeout_count: u64,
    /// Number of transports closed.
    pub close_count: u64,
    /// Number of execute attempts sent, retries included.
    pub requests_sent: u64,
    /// Time of last successful open.
    pub last_opened: Option<Instant>,
    /// Time of last close.
    pub last_closed: Option<Instant>,
    /// Time of last failure.
    pub last_error: Option<Instant>,
}

impl ConnectionStats {
    /// Record a successful open.
    pub fn record_open(&mut self) {
        self.open_count += 1;
        self.last_opened = Some(Instant::now());
    }

    /// Record a failed open.
    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_error = Some(Instant::now());
    }

    /// Record a reopen.
    pub fn record_reopen(&mut self) {
        self.reopen_count += 1;
    }

    /// Record a transport timeout.
    pub fn record_timeout(&mut self) {
        self.timeout_count += 1;
        self.last_error = Some(Instant::now());
    }

    /// Record a close.
    pub fn record_close(&mut self) {
        self.close_count += 1;
        self.last_closed = Some(Instant::now());
    }

    /// Record a sent request.
    pub fn record_request(&mut self) {
        self.requests_sent += 1;
    }

    /// Time since the last successful open.
    pub fn uptime(&self) -> Option<std::time::Duration> {
        self.last_opened.map(|t| t.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state() {
        assert!(ConnectionState::Open.is_open());
        assert!(!ConnectionState::Closed.is_open());
        assert_eq!(ConnectionState::default(), ConnectionState::Closed);
    }

    #[test]
    fn test_connection_stats() {
        let mut stats = ConnectionStats::default();

        stats.record_open();
        assert_eq!(stats.open_count, 1);
        assert!(stats.last_opened.is_some());
        assert!(stats.uptime().is_some());

        stats.record_timeout();
        stats.record_reopen();
        assert_eq!(stats.timeout_count, 1);
        assert_eq!(stats.reopen_count, 1);
        assert!(stats.last_error.is_some());

        stats.record_close();
        assert_eq!(stats.close_count, 1);
        assert!(stats.last_closed.is_some());
    }
}
