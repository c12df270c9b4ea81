//! Client side: CHAP with the KDC, ticket request, service handshake.
//!
//! ```text
//! let grant = ClientAgent::new("alice", kdf).obtain_ticket(&mut kdc, password, "echo").await?;
//! let session = ServiceHandshake::new(&grant).connect(&mut service).await?;
//! session.send(&mut service, "hi").await?;
//! ```

mod handshake;

pub use handshake::ServiceHandshake;

use std::fmt;

use tracing::debug;

use crate::crypto::{chap_digest, decrypt, Kdf, Key};
use crate::error::AuthError;
use crate::protocol::{decode_field, encode_field, Claim, Message, Response, Ticket, TicketRequest};
use crate::transport::MessageTransport;

/// A ticket and the session key it carries, as recovered by the client.
pub struct TicketGrant {
    /// Our principal name.
    pub client_id: String,
    /// Plaintext session key.
    pub session_key: Key,
    /// Ticket to present to the service.
    pub ticket: Ticket,
}

impl fmt::Debug for TicketGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TicketGrant")
            .field("client_id", &self.client_id)
            .field("service", &self.ticket.service)
            .field("expires_at", &self.ticket.expires_at())
            .finish_non_exhaustive()
    }
}

/// Drives the KDC exchange for one user.
///
/// The password is passed per call and never stored.
pub struct ClientAgent {
    user: String,
    kdf: Kdf,
}

impl ClientAgent {
    /// Agent for `user`; `kdf` must match the KDC's salt and parameters.
    pub fn new(user: impl Into<String>, kdf: Kdf) -> Self {
        Self {
            user: user.into(),
            kdf,
        }
    }

    /// The user this agent authenticates as.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Run CHAP. Fails with [`AuthError::AuthenticationFailed`] when the KDC
    /// answers `false`, including for an unknown user.
    pub async fn authenticate<T>(
        &self,
        transport: &mut T,
        password: &str,
    ) -> Result<(), AuthError>
    where
        T: MessageTransport + ?Sized,
    {
        transport
            .send(&Message::Claim(Claim {
                id: self.user.clone(),
            }))
            .await?;

        let challenge = match transport.receive().await? {
            Message::Challenge(challenge) => decode_field("challenge", &challenge.challenge)?,
            Message::ChapResult(result) if !result.result => {
                return Err(AuthError::AuthenticationFailed)
            }
            other => return Err(other.unexpected("RFC1994 Challenge")),
        };

        let hash = encode_field(&chap_digest(password, &challenge));
        transport.send(&Message::Response(Response { hash })).await?;

        match transport.receive().await? {
            Message::ChapResult(result) if result.result => {
                debug!(user = %self.user, "authenticated with KDC");
                Ok(())
            }
            Message::ChapResult(_) => Err(AuthError::AuthenticationFailed),
            other => Err(other.unexpected("RFC1994 Result")),
        }
    }

    /// Request a ticket for `service` on an authenticated connection and
    /// recover the session key with the password-derived key.
    pub async fn request_ticket<T>(
        &self,
        transport: &mut T,
        password: &str,
        service: &str,
    ) -> Result<TicketGrant, AuthError>
    where
        T: MessageTransport + ?Sized,
    {
        transport
            .send(&Message::TicketRequest(TicketRequest {
                service: service.to_string(),
                id: self.user.clone(),
            }))
            .await?;

        let response = match transport.receive().await? {
            Message::TicketResponse(response) => response,
            Message::ChapResult(result) if !result.result => {
                return Err(AuthError::UnknownPrincipal(service.to_string()))
            }
            other => return Err(other.unexpected("Ticket Response")),
        };

        let user_key = self.kdf.derive_key_async(password).await?;
        let sealed = response.sealed_session_key()?;
        let plaintext = zeroize::Zeroizing::new(decrypt(&sealed, &user_key)?);
        let session_key = Key::from_slice(&plaintext)?;

        Ok(TicketGrant {
            client_id: self.user.clone(),
            session_key,
            ticket: response.ticket,
        })
    }

    /// [`authenticate`](Self::authenticate) then
    /// [`request_ticket`](Self::request_ticket) on one connection.
    pub async fn obtain_ticket<T>(
        &self,
        transport: &mut T,
        password: &str,
        service: &str,
    ) -> Result<TicketGrant, AuthError>
    where
        T: MessageTransport + ?Sized,
    {
        self.authenticate(transport, password).await?;
        self.request_ticket(transport, password, service).await
    }
}
