//! Per-endpoint graph connection with timeout recovery.

use std::io;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::error::{GraphError, Result};
use crate::message::{AuthResponse, ExecutionResponse, Parameters};
use crate::rpc::{Connector, GraphService, TcpConnector};
use crate::transport::TlsConfig;
use crate::types::{HostAddress, PING_STATEMENT, PROBE_SESSION_ID};

use super::config::ConnectionConfig;
use super::state::{ConnectionState, ConnectionStats};

/// A connection to one graph server endpoint.
///
/// A connection starts closed. [`open`](Self::open) binds a transport and
/// runs the version handshake; [`close`](Self::close) drops it again. The
/// transport is present exactly while the connection is open.
///
/// When an execute call times out the connection is reopened once and the
/// call is sent again on the fresh transport. A timed-out transport can
/// still deliver the late response, and that response would otherwise be
/// read as the answer to the next call.
pub struct Connection<C: Connector = TcpConnector> {
    /// Target endpoint.
    endpoint: HostAddress,
    /// Settings used by `open` and reused by reopen.
    config: ConnectionConfig,
    /// Opens transports.
    connector: C,
    /// Bound service client, `Some` only while open.
    client: Option<C::Client>,
    /// When the connection was created or last returned.
    returned_at: Instant,
    /// Connection statistics.
    stats: ConnectionStats,
}

impl Connection {
    /// Create a closed connection to `endpoint` using TCP.
    pub fn new(endpoint: HostAddress) -> Self {
        Self::with_connector(endpoint, TcpConnector)
    }
}

impl<C: Connector> Connection<C> {
    /// Create a closed connection that opens transports through `connector`.
    pub fn with_connector(endpoint: HostAddress, connector: C) -> Self {
        Self {
            endpoint,
            config: ConnectionConfig::default(),
            connector,
            client: None,
            returned_at: Instant::now(),
            stats: ConnectionStats::default(),
        }
    }

    /// Replace the connection configuration.
    ///
    /// Takes effect at the next open.
    pub fn with_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the target endpoint.
    pub fn endpoint(&self) -> &HostAddress {
        &self.endpoint
    }

    /// Get the connection configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Get connection statistics.
    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        if self.client.is_some() {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    /// Check if a transport is bound.
    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// When the connection was created or last released.
    pub fn returned_at(&self) -> Instant {
        self.returned_at
    }

    /// Time since the connection was created or last released.
    pub fn idle_for(&self) -> Duration {
        self.returned_at.elapsed()
    }

    fn client_mut(&mut self) -> Result<&mut C::Client> {
        self.client.as_mut().ok_or(GraphError::NotOpen)
    }

    /// Open a transport to the endpoint and verify version compatibility.
    ///
    /// `timeout` bounds connect, read and write (zero for no bound). With
    /// `tls` set the socket is TLS-wrapped. Both are kept for reopens. An
    /// already-open transport is closed first.
    ///
    /// If the handshake fails the connection is left closed: a call error
    /// is returned as is, and a rejection by the server as
    /// [`GraphError::IncompatibleVersion`].
    pub fn open(&mut self, timeout: Duration, tls: Option<TlsConfig>) -> Result<()> {
        self.config.timeout = timeout;
        self.config.tls = tls;
        self.connect()
    }

    fn connect(&mut self) -> Result<()> {
        self.close();

        tracing::debug!(
            endpoint = %self.endpoint,
            timeout = ?self.config.timeout,
            tls = self.config.tls.is_some(),
            "opening connection"
        );

        let client = match self.connector.connect(&self.endpoint, &self.config) {
            Ok(client) => client,
            Err(e) => {
                self.stats.record_failure();
                tracing::debug!(endpoint = %self.endpoint, error = %e, "failed to open transport");
                return Err(e);
            }
        };

        if !client.is_open() {
            self.stats.record_failure();
            return Err(GraphError::Transport(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("transport to {} is off after connect", self.endpoint),
            )));
        }

        self.client = Some(client);
        self.stats.record_open();
        self.verify_client_version()
    }

    fn verify_client_version(&mut self) -> Result<()> {
        let result = self.client_mut()?.verify_client_version();
        match result {
            Ok(resp) if resp.error_code.is_success() => Ok(()),
            Ok(resp) => {
                let msg = resp
                    .error_msg
                    .unwrap_or_else(|| resp.error_code.to_string());
                tracing::warn!(endpoint = %self.endpoint, %msg, "server rejected client version");
                self.close();
                Err(GraphError::IncompatibleVersion(msg))
            }
            Err(e) => {
                tracing::debug!(endpoint = %self.endpoint, error = %e, "version handshake failed");
                self.close();
                Err(e)
            }
        }
    }

    /// Close and open again with the stored endpoint and configuration.
    fn reopen(&mut self) -> Result<()> {
        self.stats.record_reopen();
        self.connect()
    }

    /// Authenticate and obtain a session.
    ///
    /// If the call itself fails the transport is closed before
    /// [`GraphError::Authentication`] is returned. If the server rejects the
    /// credentials the transport stays open.
    pub fn authenticate(&mut self, username: &str, password: &str) -> Result<AuthResponse> {
        let result = self
            .client_mut()?
            .authenticate(username.as_bytes(), password.as_bytes());

        match result {
            Ok(resp) if resp.error_code.is_success() => {
                tracing::debug!(
                    endpoint = %self.endpoint,
                    session_id = ?resp.session_id,
                    "authenticated"
                );
                Ok(resp)
            }
            Ok(resp) => {
                let msg = resp
                    .error_msg
                    .unwrap_or_else(|| resp.error_code.to_string());
                tracing::warn!(endpoint = %self.endpoint, username, %msg, "authentication rejected");
                Err(GraphError::Authentication(msg))
            }
            Err(e) => {
                tracing::warn!(endpoint = %self.endpoint, error = %e, "authentication call failed");
                self.close();
                Err(GraphError::Authentication(e.to_string()))
            }
        }
    }

    /// Run `call`, reopening and running it once more if it times out.
    ///
    /// The second attempt's result is returned whatever it is.
    fn call_with_reopen<R>(
        &mut self,
        mut call: impl FnMut(&mut C::Client) -> Result<R>,
    ) -> Result<R> {
        let client = self.client.as_mut().ok_or(GraphError::NotOpen)?;
        self.stats.record_request();
        let err = match call(client) {
            Err(e) if e.is_timeout() => e,
            result => return result,
        };

        self.stats.record_timeout();
        tracing::warn!(endpoint = %self.endpoint, error = %err, "request timed out, reopening connection");
        self.reopen()?;

        let client = self.client.as_mut().ok_or(GraphError::NotOpen)?;
        self.stats.record_request();
        call(client)
    }

    /// Execute a statement in a session.
    pub fn execute(&mut self, session_id: i64, statement: &str) -> Result<ExecutionResponse> {
        self.execute_with_parameter(session_id, statement, &Parameters::new())
    }

    /// Execute a statement with bound parameters in a session.
    ///
    /// A transport timeout triggers one reopen and one resend of the same
    /// statement; any other error is returned directly.
    pub fn execute_with_parameter(
        &mut self,
        session_id: i64,
        statement: &str,
        parameters: &Parameters,
    ) -> Result<ExecutionResponse> {
        self.call_with_reopen(|client| {
            client.execute_with_parameter(session_id, statement.as_bytes(), parameters)
        })
    }

    /// Execute a statement, returning the result as a JSON document.
    pub fn execute_json(&mut self, session_id: i64, statement: &str) -> Result<Bytes> {
        self.execute_json_with_parameter(session_id, statement, &Parameters::new())
    }

    /// Execute a statement with bound parameters, returning JSON.
    ///
    /// Recovers from a timeout like [`execute_with_parameter`](Self::execute_with_parameter).
    pub fn execute_json_with_parameter(
        &mut self,
        session_id: i64,
        statement: &str,
        parameters: &Parameters,
    ) -> Result<Bytes> {
        self.call_with_reopen(|client| {
            client.execute_json_with_parameter(session_id, statement.as_bytes(), parameters)
        })
    }

    /// Probe the endpoint with a trivial statement.
    pub fn ping(&mut self) -> bool {
        self.execute(PROBE_SESSION_ID, PING_STATEMENT).is_ok()
    }

    /// Probe the endpoint through the parameterized execute path.
    pub fn ping_with_parameter(&mut self) -> bool {
        self.execute_with_parameter(PROBE_SESSION_ID, PING_STATEMENT, &Parameters::new())
            .is_ok()
    }

    /// Release a server-side session. The transport stays open.
    pub fn sign_out(&mut self, session_id: i64) -> Result<()> {
        tracing::debug!(endpoint = %self.endpoint, session_id, "signing out");
        self.client_mut()?.signout(session_id)
    }

    /// Mark the connection as returned for idle tracking.
    pub fn release(&mut self) {
        self.returned_at = Instant::now();
    }

    /// Close the transport. Does nothing if none is bound.
    pub fn close(&mut self) {
        if let Some(mut client) = self.client.take() {
            if let Err(e) = client.close() {
                tracing::debug!(endpoint = %self.endpoint, error = %e, "error while closing transport");
            }
            self.stats.record_close();
            tracing::debug!(endpoint = %self.endpoint, "connection closed");
        }
    }
}

impl<C: Connector> std::fmt::Debug for Connection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .field("timeout", &self.config.timeout)
            .field("tls", &self.config.tls.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::VerifyClientVersionResponse;
    use crate::types::ErrorCode;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Scripted outcome of one RPC call.
    #[derive(Debug, Clone, Copy)]
    enum Reply {
        Ok,
        Status(ErrorCode),
        Timeout,
        Reset,
    }

    impl Reply {
        fn into_result(self) -> Result<ErrorCode> {
            match self {
                Reply::Ok => Ok(ErrorCode::Succeeded),
                Reply::Status(code) => Ok(code),
                Reply::Timeout => Err(io::Error::new(io::ErrorKind::TimedOut, "timed out").into()),
                Reply::Reset => {
                    Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset").into())
                }
            }
        }
    }

    #[derive(Debug)]
    struct Script {
        /// Connect attempts with index >= this value fail.
        fail_connects_from: usize,
        /// Connected clients report their transport as already closed.
        connect_closed: bool,
        verify: Reply,
        auth: Reply,
        executes: VecDeque<Reply>,
        connects: usize,
        closes: usize,
        execute_calls: usize,
        signouts: Vec<i64>,
        configs: Vec<ConnectionConfig>,
    }

    impl Default for Script {
        fn default() -> Self {
            Self {
                fail_connects_from: usize::MAX,
                connect_closed: false,
                verify: Reply::Ok,
                auth: Reply::Ok,
                executes: VecDeque::new(),
                connects: 0,
                closes: 0,
                execute_calls: 0,
                signouts: Vec::new(),
                configs: Vec::new(),
            }
        }
    }

    #[derive(Clone, Default)]
    struct ScriptedConnector(Arc<Mutex<Script>>);

    struct ScriptedClient {
        script: Arc<Mutex<Script>>,
        open: bool,
    }

    impl Connector for ScriptedConnector {
        type Client = ScriptedClient;

        fn connect(&self, _: &HostAddress, config: &ConnectionConfig) -> Result<ScriptedClient> {
            let mut script = self.0.lock();
            let attempt = script.connects;
            script.connects += 1;
            script.configs.push(config.clone());
            if attempt >= script.fail_connects_from {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused").into());
            }
            Ok(ScriptedClient {
                script: self.0.clone(),
                open: !script.connect_closed,
            })
        }
    }

    impl GraphService for ScriptedClient {
        fn verify_client_version(&mut self) -> Result<VerifyClientVersionResponse> {
            let code = self.script.lock().verify.into_result()?;
            Ok(VerifyClientVersionResponse {
                error_code: code,
                error_msg: (!code.is_success()).then(|| "client version rejected".to_string()),
            })
        }

        fn authenticate(&mut self, _: &[u8], _: &[u8]) -> Result<AuthResponse> {
            let code = self.script.lock().auth.into_result()?;
            Ok(AuthResponse {
                error_code: code,
                error_msg: (!code.is_success()).then(|| "bad username or password".to_string()),
                session_id: code.is_success().then_some(42),
                ..Default::default()
            })
        }

        fn execute_with_parameter(
            &mut self,
            session_id: i64,
            _: &[u8],
            _: &Parameters,
        ) -> Result<ExecutionResponse> {
            let mut script = self.script.lock();
            script.execute_calls += 1;
            let code = script.executes.pop_front().unwrap_or(Reply::Ok).into_result()?;
            Ok(ExecutionResponse {
                error_code: code,
                latency_in_us: session_id,
                ..Default::default()
            })
        }

        fn execute_json_with_parameter(
            &mut self,
            session_id: i64,
            statement: &[u8],
            parameters: &Parameters,
        ) -> Result<Bytes> {
            self.execute_with_parameter(session_id, statement, parameters)?;
            Ok(Bytes::from_static(b"{\"results\":[]}"))
        }

        fn signout(&mut self, session_id: i64) -> Result<()> {
            self.script.lock().signouts.push(session_id);
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn close(&mut self) -> Result<()> {
            self.open = false;
            self.script.lock().closes += 1;
            Ok(())
        }
    }

    fn connection(script: Script) -> (Connection<ScriptedConnector>, Arc<Mutex<Script>>) {
        let connector = ScriptedConnector(Arc::new(Mutex::new(script)));
        let shared = connector.0.clone();
        let conn = Connection::with_connector(HostAddress::new("127.0.0.1", 9669), connector);
        (conn, shared)
    }

    fn opened(script: Script) -> (Connection<ScriptedConnector>, Arc<Mutex<Script>>) {
        let (mut conn, shared) = connection(script);
        conn.open(Duration::from_millis(100), None).unwrap();
        (conn, shared)
    }

    #[test]
    fn test_new_connection_is_closed() {
        let conn = Connection::new(HostAddress::new("127.0.0.1", 9669));
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!conn.is_open());
    }

    #[test]
    fn test_open() {
        let (conn, script) = opened(Script::default());
        assert!(conn.is_open());
        assert_eq!(script.lock().connects, 1);
        assert_eq!(conn.stats().open_count, 1);
    }

    #[test]
    fn test_open_transport_failure() {
        let (mut conn, _) = connection(Script {
            fail_connects_from: 0,
            ..Default::default()
        });

        let err = conn.open(Duration::from_millis(100), None).unwrap_err();
        assert!(matches!(err, GraphError::Transport(_)));
        assert!(!conn.is_open());
        assert_eq!(conn.stats().failure_count, 1);
    }

    #[test]
    fn test_open_with_dead_transport() {
        let (mut conn, script) = connection(Script {
            connect_closed: true,
            ..Default::default()
        });

        let err = conn.open(Duration::from_millis(100), None).unwrap_err();
        assert!(matches!(err, GraphError::Transport(ref e) if e.kind() == io::ErrorKind::NotConnected));
        assert!(!conn.is_open());
        assert_eq!(conn.stats().failure_count, 1);
        assert_eq!(script.lock().connects, 1);
    }

    #[test]
    fn test_incompatible_version_leaves_connection_closed() {
        let (mut conn, script) = connection(Script {
            verify: Reply::Status(ErrorCode::ClientServerIncompatible),
            ..Default::default()
        });

        let err = conn.open(Duration::from_millis(100), None).unwrap_err();
        assert!(matches!(err, GraphError::IncompatibleVersion(ref msg) if msg == "client version rejected"));
        assert!(!conn.is_open());
        assert_eq!(script.lock().closes, 1);

        let err = conn.execute(1, "YIELD 1").unwrap_err();
        assert!(matches!(err, GraphError::NotOpen));
        assert_eq!(script.lock().connects, 1);
        assert_eq!(script.lock().execute_calls, 0);
        assert_eq!(conn.stats().requests_sent, 0);
    }

    #[test]
    fn test_failed_handshake_call_leaves_connection_closed() {
        let (mut conn, script) = connection(Script {
            verify: Reply::Reset,
            ..Default::default()
        });

        let err = conn.open(Duration::from_millis(100), None).unwrap_err();
        assert!(err.is_transport());
        assert!(!conn.is_open());
        assert_eq!(script.lock().closes, 1);
    }

    #[test]
    fn test_timeout_then_success_reopens_once() {
        let (mut conn, script) = opened(Script {
            executes: VecDeque::from([Reply::Timeout, Reply::Ok]),
            ..Default::default()
        });

        let resp = conn.execute(7, "MATCH (v) RETURN v").unwrap();
        assert!(resp.is_succeeded());
        assert_eq!(resp.latency_in_us, 7);

        let script = script.lock();
        assert_eq!(script.connects, 2);
        assert_eq!(script.execute_calls, 2);
        assert_eq!(script.closes, 1);
        assert_eq!(conn.stats().reopen_count, 1);
        assert_eq!(conn.stats().timeout_count, 1);
        assert!(conn.is_open());
    }

    #[test]
    fn test_repeated_timeout_retries_once() {
        let (mut conn, script) = opened(Script {
            executes: VecDeque::from([Reply::Timeout, Reply::Timeout, Reply::Ok]),
            ..Default::default()
        });

        let err = conn.execute(1, "YIELD 1").unwrap_err();
        assert!(err.is_timeout());

        let script = script.lock();
        assert_eq!(script.connects, 2);
        assert_eq!(script.execute_calls, 2);
        assert_eq!(conn.stats().reopen_count, 1);
        assert_eq!(conn.stats().requests_sent, 2);
    }

    #[test]
    fn test_reopen_failure_is_returned() {
        let (mut conn, script) = opened(Script {
            fail_connects_from: 1,
            executes: VecDeque::from([Reply::Timeout]),
            ..Default::default()
        });

        let err = conn.execute(1, "YIELD 1").unwrap_err();
        assert!(matches!(err, GraphError::Transport(_)));
        assert!(!conn.is_open());

        let script = script.lock();
        assert_eq!(script.connects, 2);
        assert_eq!(script.execute_calls, 1);
    }

    #[test]
    fn test_reopen_keeps_original_settings() {
        let (mut conn, script) = connection(Script {
            executes: VecDeque::from([Reply::Timeout]),
            ..Default::default()
        });
        let tls = TlsConfig::new().with_server_name("graphd.internal");
        conn.open(Duration::from_millis(250), Some(tls)).unwrap();

        conn.execute(1, "YIELD 1").unwrap();

        let script = script.lock();
        assert_eq!(script.configs.len(), 2);
        for config in &script.configs {
            assert_eq!(config.timeout, Duration::from_millis(250));
            let tls = config.tls.as_ref().unwrap();
            assert_eq!(tls.server_name.as_deref(), Some("graphd.internal"));
        }
    }

    #[test]
    fn test_other_errors_do_not_reopen() {
        let (mut conn, script) = opened(Script {
            executes: VecDeque::from([Reply::Reset]),
            ..Default::default()
        });

        let err = conn.execute(1, "YIELD 1").unwrap_err();
        assert!(matches!(err, GraphError::Transport(_)));
        assert_eq!(script.lock().connects, 1);
        assert_eq!(conn.stats().reopen_count, 0);
    }

    #[test]
    fn test_server_error_is_a_response() {
        let (mut conn, _) = opened(Script {
            executes: VecDeque::from([Reply::Status(ErrorCode::SyntaxError)]),
            ..Default::default()
        });

        let resp = conn.execute(1, "YIELD").unwrap();
        assert_eq!(resp.error_code, ErrorCode::SyntaxError);
        assert!(!resp.is_succeeded());
    }

    #[test]
    fn test_execute_json_recovers_from_timeout() {
        let (mut conn, script) = opened(Script {
            executes: VecDeque::from([Reply::Timeout]),
            ..Default::default()
        });

        let json = conn.execute_json(1, "YIELD 1").unwrap();
        assert_eq!(json.as_ref(), b"{\"results\":[]}");
        assert_eq!(script.lock().connects, 2);
    }

    #[test]
    fn test_authenticate() {
        let (mut conn, _) = opened(Script::default());
        let resp = conn.authenticate("root", "nebula").unwrap();
        assert_eq!(resp.session_id, Some(42));
    }

    #[test]
    fn test_authentication_call_failure_closes_connection() {
        let (mut conn, script) = opened(Script {
            auth: Reply::Timeout,
            ..Default::default()
        });

        let err = conn.authenticate("root", "nebula").unwrap_err();
        assert!(matches!(err, GraphError::Authentication(_)));
        assert!(!conn.is_open());
        assert_eq!(script.lock().closes, 1);
        assert_eq!(script.lock().connects, 1);
    }

    #[test]
    fn test_authentication_rejection_keeps_connection_open() {
        let (mut conn, script) = opened(Script {
            auth: Reply::Status(ErrorCode::BadUsernamePassword),
            ..Default::default()
        });

        let err = conn.authenticate("root", "wrong").unwrap_err();
        assert_eq!(err.to_string(), "Authentication failed: bad username or password");
        assert!(conn.is_open());
        assert_eq!(script.lock().closes, 0);
    }

    #[test]
    fn test_authenticate_when_closed() {
        let (mut conn, _) = connection(Script::default());
        assert!(matches!(
            conn.authenticate("root", "nebula"),
            Err(GraphError::NotOpen)
        ));
    }

    #[test]
    fn test_ping() {
        let (mut conn, _) = opened(Script {
            executes: VecDeque::from([Reply::Ok, Reply::Reset]),
            ..Default::default()
        });
        assert!(conn.ping());
        assert!(!conn.ping_with_parameter());

        conn.close();
        assert!(!conn.ping());
    }

    #[test]
    fn test_sign_out_keeps_transport() {
        let (mut conn, script) = opened(Script::default());
        conn.sign_out(42).unwrap();
        assert!(conn.is_open());
        assert_eq!(script.lock().signouts, vec![42]);
    }

    #[test]
    fn test_release_updates_returned_at() {
        let (mut conn, script) = opened(Script::default());
        let before = conn.returned_at();
        std::thread::sleep(Duration::from_millis(5));

        conn.release();
        assert!(conn.returned_at() > before);
        assert!(conn.is_open());
        assert_eq!(script.lock().closes, 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut conn, script) = connection(Script::default());
        conn.close();
        assert_eq!(conn.state(), ConnectionState::Closed);

        conn.open(Duration::ZERO, None).unwrap();
        conn.close();
        conn.close();
        assert!(!conn.is_open());
        assert_eq!(script.lock().closes, 1);
        assert_eq!(conn.stats().close_count, 1);
    }

    #[test]
    fn test_open_replaces_existing_transport() {
        let (mut conn, script) = opened(Script::default());
        conn.open(Duration::from_millis(100), None).unwrap();

        let script = script.lock();
        assert_eq!(script.connects, 2);
        assert_eq!(script.closes, 1);
    }
}
