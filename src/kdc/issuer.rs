//! Ticket issuance for an authenticated user.
//!
//! A fresh session key is sealed twice: once under the service's derived key
//! (inside the ticket) and once under the user's derived key (the combined
//! blob in the response). The plaintext key never leaves this module.

use std::time::Duration;

use tracing::debug;

use crate::crypto::{encrypt, Kdf, Key};
use crate::error::AuthError;
use crate::kdc::chap::reject;
use crate::protocol::{Message, Ticket, TicketResponse};
use crate::secrets::SecretStore;
use crate::transport::MessageTransport;

/// Mints tickets against a secret store.
pub struct TicketIssuer<'a> {
    secrets: &'a SecretStore,
    kdf: &'a Kdf,
    validity: Duration,
}

impl<'a> TicketIssuer<'a> {
    /// Issuer over `secrets`; tickets live for `validity`.
    pub fn new(secrets: &'a SecretStore, kdf: &'a Kdf, validity: Duration) -> Self {
        Self {
            secrets,
            kdf,
            validity,
        }
    }

    /// Serve one ticket request from `user`, who has already passed CHAP on
    /// this connection. Answers `Result { result: false }` on any failure.
    pub async fn issue<T>(&self, transport: &mut T, user: &str) -> Result<Ticket, AuthError>
    where
        T: MessageTransport + ?Sized,
    {
        match self.serve(transport, user).await {
            Ok(ticket) => Ok(ticket),
            Err(e) => {
                reject(transport).await;
                Err(e)
            }
        }
    }

    async fn serve<T>(&self, transport: &mut T, user: &str) -> Result<Ticket, AuthError>
    where
        T: MessageTransport + ?Sized,
    {
        let request = match transport.receive().await? {
            Message::TicketRequest(request) => request,
            other => return Err(other.unexpected("Ticket Request")),
        };

        if request.id != user {
            return Err(AuthError::WrongTarget {
                expected: user.to_string(),
                got: request.id,
            });
        }

        let response = self.mint(user, &request.service).await?;
        let ticket = response.ticket.clone();
        transport.send(&Message::TicketResponse(response)).await?;
        Ok(ticket)
    }

    /// Build a ticket response for `user` and `service`.
    pub async fn mint(&self, user: &str, service: &str) -> Result<TicketResponse, AuthError> {
        let user_secret = self.secrets.require(user)?;
        let service_secret = self.secrets.require(service)?;

        let service_key = self.kdf.derive_key_async(service_secret).await?;
        let user_key = self.kdf.derive_key_async(user_secret).await?;

        let session_key = Key::generate();
        let for_service = encrypt(session_key.as_bytes(), &service_key)?;
        let for_user = encrypt(session_key.as_bytes(), &user_key)?;

        let ticket = Ticket::new(user, service, self.validity, &for_service);
        debug!(%user, %service, expires_at = ticket.expires_at(), "ticket minted");

        Ok(TicketResponse {
            session_key: for_user.to_combined(),
            iv: None,
            ticket,
        })
    }
}
