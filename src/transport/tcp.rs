//! TCP transport for protocol connections.
//!
//! This provides a TCP-based transport using tokio for async I/O. Every
//! receive is bounded by a read timeout; an idle peer becomes a protocol error
//! instead of pinning the handler forever.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::{TcpListener as TokioTcpListener, TcpStream, ToSocketAddrs};

use crate::error::AuthError;
use crate::protocol::Message;
use crate::transport::{read_line, write_line, MessageTransport};

/// Default bound on a single blocking receive.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// TCP connection wrapper using tokio.
pub struct TcpConnection {
    reader: BufReader<tokio::io::ReadHalf<TcpStream>>,
    writer: BufWriter<tokio::io::WriteHalf<TcpStream>>,
    peer_addr: String,
    read_timeout: Duration,
    closed: bool,
}

impl TcpConnection {
    /// Create a new TCP connection from a stream.
    pub fn new(stream: TcpStream) -> Self {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let (read_half, write_half) = tokio::io::split(stream);

        Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            peer_addr,
            read_timeout: DEFAULT_READ_TIMEOUT,
            closed: false,
        }
    }

    /// Connect to a remote address.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, AuthError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::new(stream))
    }

    /// Set the bound on each receive.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

#[async_trait]
impl MessageTransport for TcpConnection {
    async fn send(&mut self, message: &Message) -> Result<(), AuthError> {
        if self.closed {
            return Err(AuthError::protocol("connection closed"));
        }
        write_line(&mut self.writer, message).await
    }

    async fn receive(&mut self) -> Result<Message, AuthError> {
        if self.closed {
            return Err(AuthError::protocol("connection closed"));
        }
        tokio::time::timeout(self.read_timeout, read_line(&mut self.reader))
            .await
            .map_err(|_| AuthError::TimedOut)?
    }

    async fn close(&mut self) -> Result<(), AuthError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.writer.flush().await?;
        self.writer.shutdown().await?;
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    fn peer_addr(&self) -> String {
        self.peer_addr.clone()
    }
}

/// TCP listener for accepting protocol connections using tokio.
pub struct TcpListener {
    listener: TokioTcpListener,
    read_timeout: Duration,
}

impl TcpListener {
    /// Bind to an address and start listening.
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self, AuthError> {
        let listener = TokioTcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            read_timeout: DEFAULT_READ_TIMEOUT,
        })
    }

    /// Set the read timeout applied to accepted connections.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Accept a new connection.
    pub async fn accept(&self) -> Result<TcpConnection, AuthError> {
        let (stream, _addr) = self.listener.accept().await?;
        Ok(TcpConnection::new(stream).with_read_timeout(self.read_timeout))
    }

    /// Get the local address.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, AuthError> {
        Ok(self.listener.local_addr()?)
    }
}
