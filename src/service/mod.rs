//! Ticket-protected services.
//!
//! A [`Service`] validates the client's ticket, completes the handshake and
//! then runs a request/reply loop over a [`SecureSession`], handing each
//! message body to a [`PayloadHandler`]. Any failure sends a best-effort
//! `Error` message and ends the connection.

mod handshake;

pub use handshake::{Established, HandshakeResponder};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::{ServiceConfig, DEFAULT_IDLE_TIMEOUT_SECS};
use crate::crypto::{Kdf, Key, NonceCache, DEFAULT_NONCE_WINDOW, NONCE_SIZE};
use crate::error::AuthError;
use crate::protocol::{Failure, Message};
use crate::server::ConnectionHandler;
use crate::session::SecureSession;
use crate::transport::{MessageTransport, TcpConnection};

/// Application logic behind a service.
pub trait PayloadHandler: Send + Sync + 'static {
    /// Produce the reply to one message body from `client_id`.
    fn handle(&self, client_id: &str, body: &str) -> String;
}

impl<F> PayloadHandler for F
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    fn handle(&self, _client_id: &str, body: &str) -> String {
        self(body)
    }
}

/// Replies with the body upper-cased.
#[derive(Debug, Clone, Copy, Default)]
pub struct Echo;

impl PayloadHandler for Echo {
    fn handle(&self, _client_id: &str, body: &str) -> String {
        body.to_uppercase()
    }
}

/// How long an established session may wait for the next message by default.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS);

/// A service principal serving connections.
pub struct Service<P> {
    name: String,
    service_key: Key,
    handshake_nonces: Arc<NonceCache>,
    message_nonces: Arc<NonceCache>,
    idle_timeout: Duration,
    payload: P,
}

impl<P: PayloadHandler> Service<P> {
    /// Create a service. The service key is derived here, once.
    pub async fn new(
        name: impl Into<String>,
        secret: &str,
        kdf: &Kdf,
        payload: P,
    ) -> Result<Self, AuthError> {
        let service_key = kdf.derive_key_async(secret).await?;
        Ok(Self::with_key(name, service_key, payload))
    }

    /// Create a service from an already derived key, with default nonce caches.
    pub fn with_key(name: impl Into<String>, service_key: Key, payload: P) -> Self {
        Self {
            name: name.into(),
            service_key,
            handshake_nonces: Arc::new(NonceCache::new(NONCE_SIZE, DEFAULT_NONCE_WINDOW)),
            message_nonces: Arc::new(NonceCache::new(NONCE_SIZE, DEFAULT_NONCE_WINDOW)),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            payload,
        }
    }

    /// Replace the wait allowed between application messages. The handshake
    /// keeps the connection's own read timeout.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Build from a service config.
    pub async fn from_config(config: &ServiceConfig, payload: P) -> Result<Self, AuthError> {
        let mut service = Self::new(
            config.service_name.clone(),
            &config.service_secret,
            &config.network.kdf(),
            payload,
        )
        .await?;

        let window = config.network.nonce_window();
        service.handshake_nonces = Arc::new(NonceCache::new(NONCE_SIZE, window));
        service.message_nonces = Arc::new(NonceCache::new(NONCE_SIZE, window));
        Ok(service.with_idle_timeout(config.idle_timeout()))
    }

    /// This service's principal name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handshake, then serve messages until the peer hangs up.
    pub async fn serve<T>(&self, transport: &mut T) -> Result<(), AuthError>
    where
        T: MessageTransport + ?Sized,
    {
        let result = self.run(transport).await;
        if let Err(e) = &result {
            let failure = Failure {
                message: e.peer_reason().to_string(),
            };
            let _ = transport.send(&Message::Failure(failure)).await;
        }
        result
    }

    async fn run<T>(&self, transport: &mut T) -> Result<(), AuthError>
    where
        T: MessageTransport + ?Sized,
    {
        let peer = transport.peer_addr();

        let responder =
            HandshakeResponder::new(&self.name, &self.service_key, &self.handshake_nonces);
        let established = responder.respond(transport).await?;
        info!(
            %peer,
            user = %established.client_id,
            service = %self.name,
            "session established"
        );

        let session = SecureSession::new(
            established.session_key,
            self.name.clone(),
            established.client_id,
            Arc::clone(&self.message_nonces),
        );
        transport.set_read_timeout(self.idle_timeout);

        loop {
            let body = match session.receive(transport).await {
                Ok(body) => body,
                Err(AuthError::ConnectionClosed) => {
                    debug!(%peer, user = %session.peer_id(), "client hung up");
                    return Ok(());
                }
                Err(AuthError::TimedOut) => {
                    info!(%peer, user = %session.peer_id(), "session idle, closing");
                    let failure = Failure {
                        message: AuthError::TimedOut.peer_reason().to_string(),
                    };
                    let _ = transport.send(&Message::Failure(failure)).await;
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            let reply = self.payload.handle(session.peer_id(), &body);
            session.send(transport, &reply).await?;
        }
    }
}

#[async_trait]
impl<P: PayloadHandler> ConnectionHandler for Service<P> {
    async fn handle(&self, conn: &mut TcpConnection) -> Result<(), AuthError> {
        self.serve(conn).await
    }
}
