//! Service side of the mutual authentication handshake.
//!
//! States: AwaitHello -> AwaitClientResponse -> Established.
//!
//! ```text
//! client                                  service
//!   | -- ClientHello { ticket, Nc } ------> |  open ticket, check expiry, Nc fresh
//!   | <-- HandshakeResponse { Ns, E(Nc) } - |
//!   | -- ClientResponse { Nr, E(Ns) } ----> |  Nr fresh, E(Ns) == Ns
//! ```

use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::crypto::{decrypt, encrypt, Key, NonceCache, Sealed};
use crate::error::AuthError;
use crate::protocol::{decode_field, encode_field, ClientHello, HandshakeResponse, Message};
use crate::transport::MessageTransport;

/// Result of a completed handshake.
#[derive(Debug)]
pub struct Established {
    /// The ticket's user, confirmed by the client's proof.
    pub client_id: String,
    /// Key both ends now hold.
    pub session_key: Key,
}

/// Validates tickets for one service.
pub struct HandshakeResponder<'a> {
    service_name: &'a str,
    service_key: &'a Key,
    nonces: &'a NonceCache,
}

impl<'a> HandshakeResponder<'a> {
    /// `service_key` is the service's derived key; `nonces` holds Nc/Nr.
    pub fn new(service_name: &'a str, service_key: &'a Key, nonces: &'a NonceCache) -> Self {
        Self {
            service_name,
            service_key,
            nonces,
        }
    }

    /// Run the handshake to completion.
    ///
    /// Failures after the hello arrives are logged with the ticket's user.
    pub async fn respond<T>(&self, transport: &mut T) -> Result<Established, AuthError>
    where
        T: MessageTransport + ?Sized,
    {
        // AwaitHello
        let hello = match transport.receive().await? {
            Message::ClientHello(hello) => hello,
            other => return Err(other.unexpected("Client Hello")),
        };

        let user = hello.ticket.username.clone();
        self.accept(transport, hello).await.map_err(|e| {
            warn!(
                user = %user,
                service = %self.service_name,
                error = %e,
                "handshake failed"
            );
            e
        })
    }

    async fn accept<T>(
        &self,
        transport: &mut T,
        hello: ClientHello,
    ) -> Result<Established, AuthError>
    where
        T: MessageTransport + ?Sized,
    {
        let ticket = hello.ticket;

        if ticket.service != self.service_name {
            return Err(AuthError::WrongTarget {
                expected: self.service_name.to_string(),
                got: ticket.service,
            });
        }
        let session_key = ticket.open_session_key(self.service_key)?;
        if ticket.is_expired() {
            return Err(AuthError::TicketExpired);
        }

        let client_nonce = self.fresh_nonce("nonce", &hello.nonce)?;
        debug!(user = %ticket.username, "ticket accepted");

        let service_nonce = self.nonces.generate_registered();
        let sealed = encrypt(&client_nonce, &session_key)?;
        transport
            .send(&Message::HandshakeResponse(HandshakeResponse {
                nonce: encode_field(&service_nonce),
                service: self.service_name.to_string(),
                iv: sealed.iv_b64(),
                encrypted_nonce: sealed.ciphertext_b64(),
            }))
            .await?;

        // AwaitClientResponse
        let reply = match transport.receive().await? {
            Message::ClientResponse(reply) => reply,
            other => return Err(other.unexpected("Client Response")),
        };

        if reply.client_id != ticket.username {
            return Err(AuthError::WrongTarget {
                expected: ticket.username,
                got: reply.client_id,
            });
        }
        self.fresh_nonce("nonce", &reply.nonce)?;

        let sealed = Sealed::from_b64(&reply.iv, &reply.encrypted_nonce)?;
        let echoed = decrypt(&sealed, &session_key)?;
        if !bool::from(echoed.as_slice().ct_eq(&service_nonce)) {
            return Err(AuthError::MutualAuthFailed);
        }

        Ok(Established {
            client_id: ticket.username,
            session_key,
        })
    }

    /// Decode a peer nonce and record it, rejecting replays.
    fn fresh_nonce(&self, field: &str, value: &str) -> Result<Vec<u8>, AuthError> {
        let nonce = decode_field(field, value)?;
        if nonce.len() != self.nonces.nonce_len() {
            return Err(AuthError::Protocol(format!(
                "field `{}` must be {} bytes",
                field,
                self.nonces.nonce_len()
            )));
        }
        self.nonces.insert_if_absent(&nonce)?;
        Ok(nonce)
    }
}
