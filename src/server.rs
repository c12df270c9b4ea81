//! Connection dispatcher.
//!
//! Accepts inbound connections and spawns one task per connection. Shared
//! state (secret store, nonce caches, key material) lives inside the handler,
//! which every task borrows through an `Arc`. A failing connection is logged
//! and dropped; it never takes the listener down.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::AuthError;
use crate::transport::{MessageTransport, TcpConnection, TcpListener};

/// Handles one accepted connection from start to finish.
#[async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Drive the protocol on `conn`. The dispatcher closes it afterwards.
    async fn handle(&self, conn: &mut TcpConnection) -> Result<(), AuthError>;
}

/// Accept loop bound to a listener.
pub struct Dispatcher<H> {
    listener: TcpListener,
    handler: Arc<H>,
}

impl<H: ConnectionHandler> Dispatcher<H> {
    /// Wrap a bound listener.
    pub fn new(listener: TcpListener, handler: H) -> Self {
        Self {
            listener,
            handler: Arc::new(handler),
        }
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, AuthError> {
        self.listener.local_addr()
    }

    /// Accept connections forever. Only a failing `accept` ends the loop.
    pub async fn run(self) -> Result<(), AuthError> {
        info!(addr = ?self.listener.local_addr().ok(), "listening");

        loop {
            let mut conn = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(AuthError::Io(e)) if is_transient(&e) => {
                    warn!(error = %e, "accept failed, continuing");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                let peer = conn.peer_addr();
                debug!(%peer, "connection accepted");

                if let Err(e) = handler.handle(&mut conn).await {
                    warn!(%peer, error = %e, "connection failed");
                }
                let _ = conn.close().await;
                debug!(%peer, "connection closed");
            });
        }
    }
}

fn is_transient(e: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        e.kind(),
        ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset | ErrorKind::Interrupted
    )
}
