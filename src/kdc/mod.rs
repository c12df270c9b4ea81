//! Key distribution center.
//!
//! One connection carries one CHAP exchange followed by one ticket request.
//! The secret store and the CHAP nonce cache are shared by every connection.

mod chap;
mod issuer;

pub use chap::ChapAuthenticator;
pub use issuer::TicketIssuer;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::config::KdcConfig;
use crate::crypto::{Kdf, NonceCache, CHAP_NONCE_SIZE, DEFAULT_NONCE_WINDOW};
use crate::error::AuthError;
use crate::secrets::SecretStore;
use crate::server::ConnectionHandler;
use crate::transport::{MessageTransport, TcpConnection};

/// KDC connection handler.
pub struct Kdc {
    secrets: Arc<SecretStore>,
    chap_nonces: Arc<NonceCache>,
    kdf: Kdf,
    validity: Duration,
}

impl Kdc {
    /// Create a KDC with a fresh CHAP nonce cache.
    pub fn new(secrets: Arc<SecretStore>, kdf: Kdf, validity: Duration) -> Self {
        Self::with_nonce_cache(
            secrets,
            Arc::new(NonceCache::new(CHAP_NONCE_SIZE, DEFAULT_NONCE_WINDOW)),
            kdf,
            validity,
        )
    }

    /// Create a KDC around an existing nonce cache.
    pub fn with_nonce_cache(
        secrets: Arc<SecretStore>,
        chap_nonces: Arc<NonceCache>,
        kdf: Kdf,
        validity: Duration,
    ) -> Self {
        Self {
            secrets,
            chap_nonces,
            kdf,
            validity,
        }
    }

    /// Build from a config and its secret store.
    pub fn from_config(config: &KdcConfig, secrets: SecretStore) -> Self {
        Self::with_nonce_cache(
            Arc::new(secrets),
            Arc::new(NonceCache::new(
                CHAP_NONCE_SIZE,
                config.network.nonce_window(),
            )),
            config.network.kdf(),
            config.validity(),
        )
    }

    /// Authenticate and issue one ticket on `transport`.
    pub async fn serve<T>(&self, transport: &mut T) -> Result<(), AuthError>
    where
        T: MessageTransport + ?Sized,
    {
        let peer = transport.peer_addr();

        let user = ChapAuthenticator::new(&self.secrets, &self.chap_nonces)
            .authenticate(transport)
            .await?;
        info!(%peer, %user, "authenticated");

        let ticket = TicketIssuer::new(&self.secrets, &self.kdf, self.validity)
            .issue(transport, &user)
            .await?;
        info!(%peer, %user, service = %ticket.service, "ticket issued");
        Ok(())
    }
}

#[async_trait]
impl ConnectionHandler for Kdc {
    async fn handle(&self, conn: &mut TcpConnection) -> Result<(), AuthError> {
        self.serve(conn).await
    }
}
