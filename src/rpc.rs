//! The graph service RPC surface.
//!
//! [`GraphService`] is the fixed set of calls a [`Connection`](crate::connection::Connection)
//! makes; [`Connector`] opens a transport and binds a service client to it.
//! [`TcpConnector`] and [`GraphClient`] are the implementations used against
//! real servers.

use bytes::Bytes;

use crate::connection::ConnectionConfig;
use crate::error::{GraphError, Result};
use crate::message::{
    AuthResponse, ExecutionResponse, Method, Parameters, Request, Response,
    VerifyClientVersionResponse,
};
use crate::transport::{self, FramedTransport};
use crate::types::HostAddress;

/// RPC calls of the graph service.
///
/// Each call either returns the server's response, whose error code may
/// still report failure, or a transport-level error.
pub trait GraphService {
    /// Check that the server accepts this client's protocol version.
    fn verify_client_version(&mut self) -> Result<VerifyClientVersionResponse>;

    /// Authenticate and obtain a session.
    fn authenticate(&mut self, username: &[u8], password: &[u8]) -> Result<AuthResponse>;

    /// Execute a statement with bound parameters.
    fn execute_with_parameter(
        &mut self,
        session_id: i64,
        statement: &[u8],
        parameters: &Parameters,
    ) -> Result<ExecutionResponse>;

    /// Execute a statement with bound parameters, returning JSON.
    fn execute_json_with_parameter(
        &mut self,
        session_id: i64,
        statement: &[u8],
        parameters: &Parameters,
    ) -> Result<Bytes>;

    /// Release a server-side session. One-way: no response is awaited.
    fn signout(&mut self, session_id: i64) -> Result<()>;

    /// Check if the transport is still bound.
    fn is_open(&self) -> bool;

    /// Close the transport.
    fn close(&mut self) -> Result<()>;
}

/// Opens transports and binds service clients to them.
pub trait Connector {
    /// The service client produced for each transport.
    type Client: GraphService;

    /// Open a transport to `endpoint` and bind a client to it.
    fn connect(&self, endpoint: &HostAddress, config: &ConnectionConfig) -> Result<Self::Client>;
}

/// Connects over TCP, with TLS when the configuration carries it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Client = GraphClient;

    fn connect(&self, endpoint: &HostAddress, config: &ConnectionConfig) -> Result<GraphClient> {
        let stream = transport::connect(endpoint, config)?;
        Ok(GraphClient::new(FramedTransport::new(
            stream,
            config.buffer_size,
            config.max_frame_length,
        )))
    }
}

/// Graph service client over a framed transport.
#[derive(Debug)]
pub struct GraphClient {
    transport: Option<FramedTransport>,
    seq: u32,
}

impl GraphClient {
    /// Bind a client to an open transport.
    pub fn new(transport: FramedTransport) -> Self {
        Self {
            transport: Some(transport),
            seq: 0,
        }
    }

    fn next_seq(&mut self) -> u32 {
        self.seq = self.seq.wrapping_add(1);
        self.seq
    }

    fn transport(&mut self) -> Result<&mut FramedTransport> {
        self.transport.as_mut().ok_or(GraphError::NotOpen)
    }

    fn send(&mut self, request: &Request) -> Result<u32> {
        let seq = self.next_seq();
        self.transport()?.send(&request.to_bytes(seq))?;
        Ok(seq)
    }

    /// Send a request and, if its method is answered, wait for the response.
    ///
    /// Responses carrying another sequence ID are left over from an earlier
    /// call and are discarded.
    fn dispatch(&mut self, request: &Request) -> Result<Option<Response>> {
        let method = request.method();
        let seq = self.send(request)?;
        if !method.expects_response() {
            return Ok(None);
        }

        loop {
            let frame = self.transport()?.recv()?;
            let (resp_seq, response) = Response::from_bytes(&frame)?;

            if resp_seq != seq {
                tracing::debug!(expected = seq, got = resp_seq, "discarding stale response");
                continue;
            }
            if response.method() != method {
                return Err(GraphError::invalid_message(format!(
                    "expected {method:?} response, got {:?}",
                    response.method()
                )));
            }
            return Ok(Some(response));
        }
    }

    /// Send a request and wait for its response.
    fn call(&mut self, request: &Request) -> Result<Response> {
        self.dispatch(request)?.ok_or_else(|| {
            GraphError::invalid_message(format!("{:?} has no response", request.method()))
        })
    }
}

fn unexpected(method: Method) -> GraphError {
    GraphError::invalid_message(format!("unexpected {method:?} response"))
}

impl GraphService for GraphClient {
    fn verify_client_version(&mut self) -> Result<VerifyClientVersionResponse> {
        match self.call(&Request::verify_client_version())? {
            Response::VerifyClientVersion(resp) => Ok(resp),
            other => Err(unexpected(other.method())),
        }
    }

    fn authenticate(&mut self, username: &[u8], password: &[u8]) -> Result<AuthResponse> {
        let request = Request::Authenticate {
            username: Bytes::copy_from_slice(username),
            password: Bytes::copy_from_slice(password),
        };
        match self.call(&request)? {
            Response::Authenticate(resp) => Ok(resp),
            other => Err(unexpected(other.method())),
        }
    }

    fn execute_with_parameter(
        &mut self,
        session_id: i64,
        statement: &[u8],
        parameters: &Parameters,
    ) -> Result<ExecutionResponse> {
        let request = Request::Execute {
            session_id,
            statement: Bytes::copy_from_slice(statement),
            parameters: parameters.clone(),
        };
        match self.call(&request)? {
            Response::Execute(resp) => Ok(resp),
            other => Err(unexpected(other.method())),
        }
    }

    fn execute_json_with_parameter(
        &mut self,
        session_id: i64,
        statement: &[u8],
        parameters: &Parameters,
    ) -> Result<Bytes> {
        let request = Request::ExecuteJson {
            session_id,
            statement: Bytes::copy_from_slice(statement),
            parameters: parameters.clone(),
        };
        match self.call(&request)? {
            Response::ExecuteJson(json) => Ok(json),
            other => Err(unexpected(other.method())),
        }
    }

    fn signout(&mut self, session_id: i64) -> Result<()> {
        self.dispatch(&Request::Signout { session_id })?;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    fn close(&mut self) -> Result<()> {
        match self.transport.take() {
            Some(mut transport) => transport.shutdown(),
            None => Ok(()),
        }
    }
}
