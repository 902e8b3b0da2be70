//! TCP transport with optional TLS and length framing.

use std::io::{self, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use rustls::{ClientConnection, StreamOwned};

use crate::codec::{encode_frame, read_frame};
use crate::connection::ConnectionConfig;
use crate::error::{GraphError, Result};
use crate::types::HostAddress;

use super::tls::TlsConfig;

/// A byte stream to a graph server, plain or TLS-wrapped.
#[derive(Debug)]
pub enum Stream {
    /// Plain TCP socket.
    Plain(TcpStream),
    /// TLS session over a TCP socket.
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl Stream {
    /// Get the underlying socket.
    pub fn socket(&self) -> &TcpStream {
        match self {
            Stream::Plain(sock) => sock,
            Stream::Tls(tls) => tls.get_ref(),
        }
    }

    /// Check if the stream is TLS-wrapped.
    pub fn is_tls(&self) -> bool {
        matches!(self, Stream::Tls(_))
    }

    /// Shut down both halves of the socket.
    pub fn shutdown(&mut self) -> io::Result<()> {
        if let Stream::Tls(tls) = self {
            tls.conn.send_close_notify();
            // Best effort: the peer may already be gone.
            let _ = tls.flush();
        }
        self.socket().shutdown(Shutdown::Both)
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(sock) => sock.read(buf),
            Stream::Tls(tls) => tls.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(sock) => sock.write(buf),
            Stream::Tls(tls) => tls.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Plain(sock) => sock.flush(),
            Stream::Tls(tls) => tls.flush(),
        }
    }
}

/// Open a socket to `endpoint`, bounded by the configured timeout.
///
/// A zero timeout means blocking without limit. Every resolved address is
/// tried in order; the last failure is returned if none accepts.
pub fn connect_socket(endpoint: &HostAddress, config: &ConnectionConfig) -> Result<TcpStream> {
    let timeout = config.io_timeout();
    let mut last_err = None;

    for addr in endpoint.to_string().to_socket_addrs()? {
        match connect_addr(&addr, timeout) {
            Ok(sock) => {
                sock.set_read_timeout(timeout)?;
                sock.set_write_timeout(timeout)?;
                sock.set_nodelay(config.nodelay)?;
                return Ok(sock);
            }
            Err(e) => {
                tracing::trace!(%addr, error = %e, "connect attempt failed");
                last_err = Some(e);
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("no addresses resolved for {endpoint}"),
            )
        })
        .into())
}

fn connect_addr(addr: &SocketAddr, timeout: Option<Duration>) -> io::Result<TcpStream> {
    match timeout {
        Some(timeout) => TcpStream::connect_timeout(addr, timeout),
        None => TcpStream::connect(addr),
    }
}

/// Wrap a connected socket in TLS and drive the handshake to completion.
pub fn start_tls(sock: TcpStream, host: &str, tls: &TlsConfig) -> Result<Stream> {
    let mut sock = sock;
    let mut conn = ClientConnection::new(tls.client_config()?, tls.server_name_for(host)?)?;
    while conn.is_handshaking() {
        conn.complete_io(&mut sock)?;
    }
    tracing::trace!(host, "TLS handshake complete");
    Ok(Stream::Tls(Box::new(StreamOwned::new(conn, sock))))
}

/// Open a plain or TLS stream as the configuration requires.
pub fn connect(endpoint: &HostAddress, config: &ConnectionConfig) -> Result<Stream> {
    let sock = connect_socket(endpoint, config)?;
    match &config.tls {
        Some(tls) => start_tls(sock, &endpoint.host, tls),
        None => Ok(Stream::Plain(sock)),
    }
}

/// A buffered, length-framed transport.
///
/// Reads go through a fixed-size buffer; each outgoing frame is assembled in
/// a write buffer and flushed with a single write.
#[derive(Debug)]
pub struct FramedTransport {
    reader: BufReader<Stream>,
    write_buf: BytesMut,
    max_frame_length: u32,
}

impl FramedTransport {
    /// Wrap a stream with buffers of `buffer_size` bytes.
    pub fn new(stream: Stream, buffer_size: usize, max_frame_length: u32) -> Self {
        Self {
            reader: BufReader::with_capacity(buffer_size, stream),
            write_buf: BytesMut::with_capacity(buffer_size),
            max_frame_length,
        }
    }

    /// Get the underlying stream.
    pub fn stream(&self) -> &Stream {
        self.reader.get_ref()
    }

    /// Get the peer address.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream().socket().peer_addr()
    }

    /// Send one frame.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.write_buf.clear();
        encode_frame(&mut self.write_buf, payload, self.max_frame_length)?;

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buf)?;
        stream.flush()?;
        tracing::trace!(len = payload.len(), "frame sent");
        Ok(())
    }

    /// Receive one frame, blocking up to the socket read timeout.
    pub fn recv(&mut self) -> Result<Bytes> {
        let frame = read_frame(&mut self.reader, self.max_frame_length)?;
        tracing::trace!(len = frame.len(), "frame received");
        Ok(frame)
    }

    /// Shut down the stream.
    pub fn shutdown(&mut self) -> Result<()> {
        self.reader.get_mut().shutdown().map_err(GraphError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{MAX_FRAME_LENGTH, write_frame};
    use std::net::TcpListener;
    use std::thread;

    fn local_endpoint(listener: &TcpListener) -> HostAddress {
        let addr = listener.local_addr().unwrap();
        HostAddress::new(addr.ip().to_string(), addr.port())
    }

    #[test]
    fn test_framed_echo() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = local_endpoint(&listener);

        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let frame = read_frame(&mut sock, MAX_FRAME_LENGTH).unwrap();
            write_frame(&mut sock, &frame, MAX_FRAME_LENGTH).unwrap();
        });

        let config = ConnectionConfig::default().with_timeout(Duration::from_secs(5));
        let stream = connect(&endpoint, &config).unwrap();
        assert!(!stream.is_tls());

        let mut transport = FramedTransport::new(stream, config.buffer_size, MAX_FRAME_LENGTH);
        transport.send(b"echo me").unwrap();
        assert_eq!(transport.recv().unwrap().as_ref(), b"echo me");

        server.join().unwrap();
    }

    #[test]
    fn test_read_timeout_surfaces_as_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = local_endpoint(&listener);

        let server = thread::spawn(move || {
            let (sock, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(500));
            drop(sock);
        });

        let config = ConnectionConfig::default().with_timeout(Duration::from_millis(100));
        let stream = connect(&endpoint, &config).unwrap();
        let mut transport = FramedTransport::new(stream, 1024, MAX_FRAME_LENGTH);

        let err = transport.recv().unwrap_err();
        assert!(err.is_timeout(), "unexpected error: {err}");

        server.join().unwrap();
    }

    #[test]
    fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = local_endpoint(&listener);
        drop(listener);

        let config = ConnectionConfig::default().with_timeout(Duration::from_secs(1));
        let err = connect(&endpoint, &config).unwrap_err();
        assert!(matches!(err, GraphError::Transport(_)));
    }
}
