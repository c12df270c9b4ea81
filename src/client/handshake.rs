//! Client side of the service handshake.
//!
//! The client proves nothing until the service has shown it can open the
//! ticket: Nr and E(Ns) are only sent once E(Nc) checks out.

use std::sync::Arc;

use subtle::ConstantTimeEq;
use tracing::debug;

use crate::client::TicketGrant;
use crate::crypto::{decrypt, encrypt, NonceCache, Sealed, DEFAULT_NONCE_WINDOW, NONCE_SIZE};
use crate::error::AuthError;
use crate::protocol::{decode_field, encode_field, ClientHello, ClientResponse, Message};
use crate::session::SecureSession;
use crate::transport::MessageTransport;

/// Handshake initiator for one ticket.
pub struct ServiceHandshake<'a> {
    grant: &'a TicketGrant,
    nonces: Arc<NonceCache>,
}

impl<'a> ServiceHandshake<'a> {
    /// Use a private nonce cache for this connection.
    pub fn new(grant: &'a TicketGrant) -> Self {
        Self::with_nonce_cache(
            grant,
            Arc::new(NonceCache::new(NONCE_SIZE, DEFAULT_NONCE_WINDOW)),
        )
    }

    /// Share a nonce cache across connections.
    pub fn with_nonce_cache(grant: &'a TicketGrant, nonces: Arc<NonceCache>) -> Self {
        Self { grant, nonces }
    }

    /// Run the handshake and open a session with the ticket's service.
    pub async fn connect<T>(&self, transport: &mut T) -> Result<SecureSession, AuthError>
    where
        T: MessageTransport + ?Sized,
    {
        let service = &self.grant.ticket.service;
        let key = &self.grant.session_key;

        let client_nonce = self.nonces.generate_registered();
        transport
            .send(&Message::ClientHello(ClientHello {
                ticket: self.grant.ticket.clone(),
                nonce: encode_field(&client_nonce),
            }))
            .await?;

        let response = match transport.receive().await? {
            Message::HandshakeResponse(response) => response,
            other => return Err(other.unexpected("Handshake Response")),
        };
        if &response.service != service {
            return Err(AuthError::WrongTarget {
                expected: service.clone(),
                got: response.service,
            });
        }

        let sealed = Sealed::from_b64(&response.iv, &response.encrypted_nonce)?;
        let echoed = decrypt(&sealed, key)?;
        if !bool::from(echoed.as_slice().ct_eq(&client_nonce)) {
            return Err(AuthError::MutualAuthFailed);
        }

        let service_nonce = decode_field("nonce", &response.nonce)?;
        if service_nonce.len() != NONCE_SIZE {
            return Err(AuthError::protocol("service nonce has the wrong length"));
        }
        self.nonces.insert_if_absent(&service_nonce)?;
        debug!(%service, "service proved key possession");

        let reply_nonce = self.nonces.generate_registered();
        let sealed = encrypt(&service_nonce, key)?;
        transport
            .send(&Message::ClientResponse(ClientResponse {
                nonce: encode_field(&reply_nonce),
                client_id: self.grant.client_id.clone(),
                iv: sealed.iv_b64(),
                encrypted_nonce: sealed.ciphertext_b64(),
            }))
            .await?;

        Ok(SecureSession::new(
            key.clone(),
            self.grant.client_id.clone(),
            service.clone(),
            Arc::clone(&self.nonces),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::crypto::Key;
    use crate::protocol::{HandshakeResponse, Ticket};
    use crate::service::{Echo, Service};
    use crate::transport::{TcpConnection, TcpListener};

    fn grant(service_key: &Key) -> TicketGrant {
        let session_key = Key::generate();
        let sealed = encrypt(session_key.as_bytes(), service_key).unwrap();
        TicketGrant {
            client_id: "alice".to_string(),
            session_key,
            ticket: Ticket::new("alice", "echo", Duration::from_secs(60), &sealed),
        }
    }

    #[tokio::test]
    async fn test_handshake_and_echo() {
        let service_key = Key::generate();
        let grant = grant(&service_key);
        let service = Service::with_key("echo", service_key, Echo);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut conn = listener.accept().await.unwrap();
            service.serve(&mut conn).await
        });

        let mut conn = TcpConnection::connect(addr).await.unwrap();
        let session = ServiceHandshake::new(&grant).connect(&mut conn).await.unwrap();
        assert_eq!(session.peer_id(), "echo");
        assert_eq!(session.key(), &grant.session_key);

        session.send(&mut conn, "hi").await.unwrap();
        assert_eq!(session.receive(&mut conn).await.unwrap(), "HI");
        session.send(&mut conn, "again").await.unwrap();
        assert_eq!(session.receive(&mut conn).await.unwrap(), "AGAIN");

        conn.close().await.unwrap();
        server.await.unwrap().unwrap();
    }

    /// A responder that answers the hello with whatever `respond` builds.
    async fn fake_service<F>(grant: &TicketGrant, respond: F) -> Result<SecureSession, AuthError>
    where
        F: FnOnce(&[u8], &Key) -> HandshakeResponse + Send + 'static,
    {
        let nonces = Arc::new(NonceCache::new(NONCE_SIZE, DEFAULT_NONCE_WINDOW));
        fake_service_sharing(grant, nonces, respond).await
    }

    /// Same as `fake_service`, with the client's nonce cache supplied.
    async fn fake_service_sharing<F>(
        grant: &TicketGrant,
        nonces: Arc<NonceCache>,
        respond: F,
    ) -> Result<SecureSession, AuthError>
    where
        F: FnOnce(&[u8], &Key) -> HandshakeResponse + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let key = grant.session_key.clone();

        let server = tokio::spawn(async move {
            let mut conn = listener.accept().await.unwrap();
            let hello = match conn.receive().await.unwrap() {
                Message::ClientHello(hello) => hello,
                other => panic!("expected hello, got {:?}", other),
            };
            let nonce = decode_field("nonce", &hello.nonce).unwrap();
            conn.send(&Message::HandshakeResponse(respond(&nonce, &key)))
                .await
                .unwrap();
            // Hold the connection until the client is done
            let _ = conn.receive().await;
        });

        let mut conn = TcpConnection::connect(addr).await.unwrap();
        let result = ServiceHandshake::with_nonce_cache(grant, nonces)
            .connect(&mut conn)
            .await;
        drop(conn);
        server.await.unwrap();
        result
    }

    fn honest(nonce: &[u8], key: &Key) -> HandshakeResponse {
        let sealed = encrypt(nonce, key).unwrap();
        HandshakeResponse {
            nonce: encode_field(&[3u8; NONCE_SIZE]),
            service: "echo".to_string(),
            iv: sealed.iv_b64(),
            encrypted_nonce: sealed.ciphertext_b64(),
        }
    }

    #[tokio::test]
    async fn test_tampered_response_fails_cleanly() {
        let grant = grant(&Key::generate());
        let result = fake_service(&grant, |nonce, key| {
            let mut sealed = encrypt(nonce, key).unwrap();
            sealed.ciphertext[0] ^= 0x80;
            HandshakeResponse {
                encrypted_nonce: sealed.ciphertext_b64(),
                iv: sealed.iv_b64(),
                ..honest(nonce, key)
            }
        })
        .await;

        assert!(matches!(result, Err(AuthError::Decryption)));
    }

    #[tokio::test]
    async fn test_wrong_nonce_echo_is_mutual_auth_failure() {
        let grant = grant(&Key::generate());
        let result = fake_service(&grant, |_nonce, key| honest(&[0u8; NONCE_SIZE], key)).await;

        assert!(matches!(result, Err(AuthError::MutualAuthFailed)));
    }

    #[tokio::test]
    async fn test_service_without_key_fails() {
        let grant = grant(&Key::generate());
        let result = fake_service(&grant, |nonce, _key| honest(nonce, &Key::generate())).await;

        assert!(matches!(result, Err(AuthError::Decryption)));
    }

    #[tokio::test]
    async fn test_response_from_other_service_rejected() {
        let grant = grant(&Key::generate());
        let result = fake_service(&grant, |nonce, key| HandshakeResponse {
            service: "print".to_string(),
            ..honest(nonce, key)
        })
        .await;

        assert!(matches!(result, Err(AuthError::WrongTarget { .. })));
    }

    #[tokio::test]
    async fn test_honest_fake_completes() {
        let grant = grant(&Key::generate());
        let session = fake_service(&grant, honest).await.unwrap();
        assert_eq!(session.local_id(), "alice");
    }

    #[tokio::test]
    async fn test_replayed_service_nonce_rejected() {
        let grant = grant(&Key::generate());
        let nonces = Arc::new(NonceCache::new(NONCE_SIZE, DEFAULT_NONCE_WINDOW));

        // `honest` always answers with the same Ns
        let first = fake_service_sharing(&grant, Arc::clone(&nonces), honest).await;
        assert!(first.is_ok());

        let second = fake_service_sharing(&grant, nonces, honest).await;
        assert!(matches!(second, Err(AuthError::ReplayDetected)));
    }

    #[tokio::test]
    async fn test_service_failure_message_surfaces() {
        let service_key = Key::generate();
        let mut grant = grant(&service_key);
        grant.ticket.creation_time = 0;
        grant.ticket.validity_time = 1;
        let service = Service::with_key("echo", service_key, Echo);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut conn = listener.accept().await.unwrap();
            service.serve(&mut conn).await
        });

        let mut conn = TcpConnection::connect(addr).await.unwrap();
        let err = ServiceHandshake::new(&grant).connect(&mut conn).await.unwrap_err();
        assert!(err.to_string().contains("ticket expired"));
        assert!(matches!(server.await.unwrap(), Err(AuthError::TicketExpired)));
    }
}
