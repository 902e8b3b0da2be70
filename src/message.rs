//! Graph service RPC messages and their payload encoding.
//!
//! Every frame payload starts with a 5-byte envelope:
//!
//! ```text
//! +--------+--------+--------+--------+--------+
//! | Method |          Sequence ID (32 bits)    |
//! +--------+--------+--------+--------+--------+
//! |                 Body ...                   |
//! +--------+--------+--------+--------+--------+
//! ```
//!
//! Integers are big-endian. Strings and byte strings are a 32-bit length
//! followed by the data. Optional fields carry a one-byte presence flag.
//! Response bodies always begin with a 32-bit error code and an optional
//! error message.

use std::collections::{BTreeMap, HashMap};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{GraphError, Result};
use crate::types::{CLIENT_VERSION, ErrorCode};
use crate::value::Value;

/// Size of the method + sequence envelope in bytes.
pub const ENVELOPE_SIZE: usize = 5;

/// Nesting limit for list and map parameter values.
const MAX_VALUE_DEPTH: usize = 64;

/// Statement parameters keyed by name.
pub type Parameters = HashMap<String, Value>;

/// RPC methods of the graph service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Method {
    /// Client-version compatibility handshake.
    VerifyClientVersion = 0x01,
    /// Credential check returning a session ID.
    Authenticate = 0x02,
    /// Release a server-side session (one-way).
    Signout = 0x03,
    /// Execute a statement, returning a structured response.
    Execute = 0x04,
    /// Execute a statement, returning a JSON document.
    ExecuteJson = 0x05,
}

impl Method {
    /// Create a Method from a raw byte value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::VerifyClientVersion),
            0x02 => Some(Self::Authenticate),
            0x03 => Some(Self::Signout),
            0x04 => Some(Self::Execute),
            0x05 => Some(Self::ExecuteJson),
            _ => None,
        }
    }

    /// Check if the server answers this method.
    pub fn expects_response(&self) -> bool {
        !matches!(self, Self::Signout)
    }
}

/// A request sent to the graph service.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Ask the server whether it accepts this client version.
    VerifyClientVersion {
        /// Client version string.
        version: Bytes,
    },
    /// Authenticate a user.
    Authenticate {
        /// User name.
        username: Bytes,
        /// Password.
        password: Bytes,
    },
    /// Release a session.
    Signout {
        /// Session to release.
        session_id: i64,
    },
    /// Execute a statement.
    Execute {
        /// Session the statement runs in.
        session_id: i64,
        /// Statement text.
        statement: Bytes,
        /// Bound parameters.
        parameters: Parameters,
    },
    /// Execute a statement with a JSON result.
    ExecuteJson {
        /// Session the statement runs in.
        session_id: i64,
        /// Statement text.
        statement: Bytes,
        /// Bound parameters.
        parameters: Parameters,
    },
}

impl Request {
    /// Version handshake for this client's [`CLIENT_VERSION`].
    pub fn verify_client_version() -> Self {
        Request::VerifyClientVersion {
            version: Bytes::from_static(CLIENT_VERSION.as_bytes()),
        }
    }

    /// The RPC method of this request.
    pub fn method(&self) -> Method {
        match self {
            Request::VerifyClientVersion { .. } => Method::VerifyClientVersion,
            Request::Authenticate { .. } => Method::Authenticate,
            Request::Signout { .. } => Method::Signout,
            Request::Execute { .. } => Method::Execute,
            Request::ExecuteJson { .. } => Method::ExecuteJson,
        }
    }

    /// Serialize the request into a frame payload.
    pub fn to_bytes(&self, seq: u32) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(self.method() as u8);
        buf.put_u32(seq);

        match self {
            Request::VerifyClientVersion { version } => put_bytes(&mut buf, version),
            Request::Authenticate { username, password } => {
                put_bytes(&mut buf, username);
                put_bytes(&mut buf, password);
            }
            Request::Signout { session_id } => buf.put_i64(*session_id),
            Request::Execute {
                session_id,
                statement,
                parameters,
            }
            | Request::ExecuteJson {
                session_id,
                statement,
                parameters,
            } => {
                buf.put_i64(*session_id);
                put_bytes(&mut buf, statement);
                buf.put_u32(parameters.len() as u32);
                for (name, value) in parameters {
                    put_bytes(&mut buf, name.as_bytes());
                    put_value(&mut buf, value);
                }
            }
        }

        buf.freeze()
    }

    /// Parse a request from a frame payload, returning its sequence ID.
    pub fn from_bytes(data: &[u8]) -> Result<(u32, Self)> {
        let mut reader = WireReader::new(data);
        let (method, seq) = reader.envelope()?;

        let request = match method {
            Method::VerifyClientVersion => Request::VerifyClientVersion {
                version: reader.bytes()?,
            },
            Method::Authenticate => Request::Authenticate {
                username: reader.bytes()?,
                password: reader.bytes()?,
            },
            Method::Signout => Request::Signout {
                session_id: reader.i64()?,
            },
            Method::Execute | Method::ExecuteJson => {
                let session_id = reader.i64()?;
                let statement = reader.bytes()?;
                let count = reader.u32()? as usize;
                let mut parameters = Parameters::with_capacity(count.min(1024));
                for _ in 0..count {
                    let name = reader.string()?;
                    let value = reader.value(0)?;
                    parameters.insert(name, value);
                }
                if method == Method::Execute {
                    Request::Execute {
                        session_id,
                        statement,
                        parameters,
                    }
                } else {
                    Request::ExecuteJson {
                        session_id,
                        statement,
                        parameters,
                    }
                }
            }
        };

        reader.finish()?;
        Ok((seq, request))
    }
}

/// Response to a client-version handshake.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VerifyClientVersionResponse {
    /// Status code.
    pub error_code: ErrorCode,
    /// Server message, present on failure.
    pub error_msg: Option<String>,
}

/// Response to an authentication request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthResponse {
    /// Status code.
    pub error_code: ErrorCode,
    /// Server message, present on failure.
    pub error_msg: Option<String>,
    /// Session assigned by the server.
    pub session_id: Option<i64>,
    /// Server time zone offset from UTC.
    pub time_zone_offset_seconds: Option<i32>,
    /// Server time zone name.
    pub time_zone_name: Option<String>,
}

/// Response to a statement execution.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecutionResponse {
    /// Status code.
    pub error_code: ErrorCode,
    /// Server-side latency in microseconds.
    pub latency_in_us: i64,
    /// Encoded result set, if the statement produced one.
    pub data: Option<Bytes>,
    /// Graph space the session is using after the statement.
    pub space_name: Option<String>,
    /// Server message, present on failure.
    pub error_msg: Option<String>,
    /// Free-form server comment.
    pub comment: Option<String>,
}

impl ExecutionResponse {
    /// Check if the statement succeeded.
    pub fn is_succeeded(&self) -> bool {
        self.error_code.is_success()
    }
}

/// A response received from the graph service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Answer to [`Request::VerifyClientVersion`].
    VerifyClientVersion(VerifyClientVersionResponse),
    /// Answer to [`Request::Authenticate`].
    Authenticate(AuthResponse),
    /// Answer to [`Request::Execute`].
    Execute(ExecutionResponse),
    /// Answer to [`Request::ExecuteJson`]: the raw JSON document.
    ExecuteJson(Bytes),
}

impl Response {
    /// The RPC method this response answers.
    pub fn method(&self) -> Method {
        match self {
            Response::VerifyClientVersion(_) => Method::VerifyClientVersion,
            Response::Authenticate(_) => Method::Authenticate,
            Response::Execute(_) => Method::Execute,
            Response::ExecuteJson(_) => Method::ExecuteJson,
        }
    }

    /// Serialize the response into a frame payload.
    pub fn to_bytes(&self, seq: u32) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(self.method() as u8);
        buf.put_u32(seq);

        match self {
            Response::VerifyClientVersion(resp) => {
                buf.put_i32(resp.error_code.as_i32());
                put_opt_string(&mut buf, resp.error_msg.as_deref());
            }
            Response::Authenticate(resp) => {
                buf.put_i32(resp.error_code.as_i32());
                put_opt_string(&mut buf, resp.error_msg.as_deref());
                put_opt(&mut buf, resp.session_id, |b, v| b.put_i64(v));
                put_opt(&mut buf, resp.time_zone_offset_seconds, |b, v| b.put_i32(v));
                put_opt_string(&mut buf, resp.time_zone_name.as_deref());
            }
            Response::Execute(resp) => {
                buf.put_i32(resp.error_code.as_i32());
                put_opt_string(&mut buf, resp.error_msg.as_deref());
                buf.put_i64(resp.latency_in_us);
                put_opt(&mut buf, resp.data.as_deref(), put_bytes);
                put_opt_string(&mut buf, resp.space_name.as_deref());
                put_opt_string(&mut buf, resp.comment.as_deref());
            }
            Response::ExecuteJson(json) => put_bytes(&mut buf, json),
        }

        buf.freeze()
    }

    /// Parse a response from a frame payload, returning its sequence ID.
    pub fn from_bytes(data: &[u8]) -> Result<(u32, Self)> {
        let mut reader = WireReader::new(data);
        let (method, seq) = reader.envelope()?;

        let response = match method {
            Method::VerifyClientVersion => {
                Response::VerifyClientVersion(VerifyClientVersionResponse {
                    error_code: ErrorCode::from_i32(reader.i32()?),
                    error_msg: reader.opt_string()?,
                })
            }
            Method::Authenticate => {
                let error_code = ErrorCode::from_i32(reader.i32()?);
                let error_msg = reader.opt_string()?;
                let session_id = reader.opt(WireReader::i64)?;
                let time_zone_offset_seconds = reader.opt(WireReader::i32)?;
                let time_zone_name = reader.opt_string()?;
                Response::Authenticate(AuthResponse {
                    error_code,
                    error_msg,
                    session_id,
                    time_zone_offset_seconds,
                    time_zone_name,
                })
            }
            Method::Execute => {
                let error_code = ErrorCode::from_i32(reader.i32()?);
                let error_msg = reader.opt_string()?;
                let latency_in_us = reader.i64()?;
                let data = reader.opt(WireReader::bytes)?;
                let space_name = reader.opt_string()?;
                let comment = reader.opt_string()?;
                Response::Execute(ExecutionResponse {
                    error_code,
                    latency_in_us,
                    data,
                    space_name,
                    error_msg,
                    comment,
                })
            }
            Method::ExecuteJson => Response::ExecuteJson(reader.bytes()?),
            Method::Signout => {
                return Err(GraphError::invalid_message("signout has no response"));
            }
        };

        reader.finish()?;
        Ok((seq, response))
    }
}

fn put_bytes(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u32(data.len() as u32);
    buf.put_slice(data);
}

fn put_opt<T>(buf: &mut BytesMut, value: Option<T>, put: impl FnOnce(&mut BytesMut, T)) {
    match value {
        Some(v) => {
            buf.put_u8(1);
            put(buf, v);
        }
        None => buf.put_u8(0),
    }
}

fn put_opt_string(buf: &mut BytesMut, value: Option<&str>) {
    put_opt(buf, value, |b, s| put_bytes(b, s.as_bytes()));
}

fn put_value(buf: &mut BytesMut, value: &Value) {
    buf.put_u8(value.tag());
    match value {
        Value::Null => {}
        Value::Bool(b) => buf.put_u8(u8::from(*b)),
        Value::Int(i) => buf.put_i64(*i),
        Value::Float(f) => buf.put_f64(*f),
        Value::String(s) => put_bytes(buf, s.as_bytes()),
        Value::List(items) => {
            buf.put_u32(items.len() as u32);
            for item in items {
                put_value(buf, item);
            }
        }
        Value::Map(entries) => {
            buf.put_u32(entries.len() as u32);
            for (key, item) in entries {
                put_bytes(buf, key.as_bytes());
                put_value(buf, item);
            }
        }
    }
}

/// Bounds-checked cursor over a frame payload.
struct WireReader<'a> {
    data: &'a [u8],
}

impl<'a> WireReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if self.data.remaining() < needed {
            return Err(GraphError::invalid_message(format!(
                "truncated payload: need {needed} bytes, have {}",
                self.data.remaining()
            )));
        }
        Ok(())
    }

    fn envelope(&mut self) -> Result<(Method, u32)> {
        self.ensure(ENVELOPE_SIZE)?;
        let raw = self.data.get_u8();
        let method = Method::from_u8(raw)
            .ok_or_else(|| GraphError::invalid_message(format!("unknown method: 0x{raw:02X}")))?;
        Ok((method, self.data.get_u32()))
    }

    fn u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.data.get_u8())
    }

    fn u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.data.get_u32())
    }

    fn i32(&mut self) -> Result<i32> {
        self.ensure(4)?;
        Ok(self.data.get_i32())
    }

    fn i64(&mut self) -> Result<i64> {
        self.ensure(8)?;
        Ok(self.data.get_i64())
    }

    fn f64(&mut self) -> Result<f64> {
        self.ensure(8)?;
        Ok(self.data.get_f64())
    }

    fn bytes(&mut self) -> Result<Bytes> {
        let len = self.u32()? as usize;
        self.ensure(len)?;
        let out = Bytes::copy_from_slice(&self.data[..len]);
        self.data.advance(len);
        Ok(out)
    }

    fn string(&mut self) -> Result<String> {
        let raw = self.bytes()?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| GraphError::invalid_message(format!("invalid UTF-8 string: {e}")))
    }

    fn opt<T>(&mut self, read: impl FnOnce(&mut Self) -> Result<T>) -> Result<Option<T>> {
        match self.u8()? {
            0 => Ok(None),
            1 => read(self).map(Some),
            flag => Err(GraphError::invalid_message(format!(
                "invalid presence flag: 0x{flag:02X}"
            ))),
        }
    }

    fn opt_string(&mut self) -> Result<Option<String>> {
        self.opt(Self::string)
    }

    fn value(&mut self, depth: usize) -> Result<Value> {
        if depth > MAX_VALUE_DEPTH {
            return Err(GraphError::invalid_message("parameter value nested too deeply"));
        }

        let value = match self.u8()? {
            0 => Value::Null,
            1 => Value::Bool(self.u8()? != 0),
            2 => Value::Int(self.i64()?),
            3 => Value::Float(self.f64()?),
            4 => Value::String(self.string()?),
            5 => {
                let count = self.u32()? as usize;
                let mut items = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    items.push(self.value(depth + 1)?);
                }
                Value::List(items)
            }
            6 => {
                let count = self.u32()? as usize;
                let mut entries = BTreeMap::new();
                for _ in 0..count {
                    let key = self.string()?;
                    entries.insert(key, self.value(depth + 1)?);
                }
                Value::Map(entries)
            }
            tag => {
                return Err(GraphError::invalid_message(format!(
                    "unknown value tag: 0x{tag:02X}"
                )));
            }
        };
        Ok(value)
    }

    fn finish(&self) -> Result<()> {
        if self.data.has_remaining() {
            return Err(GraphError::invalid_message(format!(
                "{} trailing bytes after message body",
                self.data.remaining()
            )));
        }
        Ok(())
    }
}
