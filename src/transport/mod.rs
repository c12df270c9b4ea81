//! Transport layer for protocol connections.
//!
//! Messages travel as newline-terminated JSON objects. This module defines the
//! async transport trait and the line framing helpers; `tcp` provides the
//! tokio TCP implementation.

mod tcp;

pub use tcp::{TcpConnection, TcpListener};

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::AuthError;
use crate::protocol::Message;

/// Maximum accepted line length, newline included.
pub const MAX_LINE_LEN: usize = 1024 * 1024;

/// Trait for bidirectional async message transport.
#[async_trait]
pub trait MessageTransport: Send {
    /// Send one message as a single line.
    async fn send(&mut self, message: &Message) -> Result<(), AuthError>;

    /// Receive one message. Fails with [`AuthError::ConnectionClosed`] at end of
    /// stream, [`AuthError::TimedOut`] when the read timeout elapses and
    /// [`AuthError::Protocol`] for an unknown message.
    async fn receive(&mut self) -> Result<Message, AuthError>;

    /// Change the bound on each subsequent receive.
    fn set_read_timeout(&mut self, timeout: Duration);

    /// Close the connection. Safe to call more than once.
    async fn close(&mut self) -> Result<(), AuthError>;

    /// Get the peer address as a string.
    fn peer_addr(&self) -> String;
}

/// Write one message followed by `\n` and flush.
pub async fn write_line<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &Message,
) -> Result<(), AuthError> {
    let mut line = message.to_line()?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one `\n`-terminated line and parse it.
pub async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Message, AuthError> {
    let mut line = String::new();
    let read = reader
        .take(MAX_LINE_LEN as u64)
        .read_line(&mut line)
        .await
        .map_err(|e| AuthError::Protocol(format!("read failed: {}", e)))?;

    if read == 0 {
        return Err(AuthError::ConnectionClosed);
    }
    if !line.ends_with('\n') {
        if read >= MAX_LINE_LEN {
            return Err(AuthError::protocol("message too large"));
        }
        return Err(AuthError::protocol("connection closed mid-message"));
    }

    Message::from_line(&line)
}
