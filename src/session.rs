//! Secure session channel.
//!
//! After the handshake both ends hold the same session key. Each application
//! message is a [`SecurePayload`] sealed into an [`Envelope`] with a fresh IV.
//! The receiver checks that it is the target, that the sender is the peer it
//! shook hands with, and that the payload nonce is new.

use std::fmt;
use std::sync::Arc;

use crate::crypto::{decrypt, encrypt, Key, NonceCache};
use crate::error::AuthError;
use crate::protocol::{decode_field, encode_field, Envelope, Message, SecurePayload};
use crate::transport::MessageTransport;

/// One established session between `local_id` and `peer_id`.
pub struct SecureSession {
    key: Key,
    local_id: String,
    peer_id: String,
    nonces: Arc<NonceCache>,
}

impl SecureSession {
    /// Create a session.
    ///
    /// `nonces` may be private to this session or shared by every session of
    /// a server; sessions register their outgoing nonces in it as well.
    pub fn new(
        key: Key,
        local_id: impl Into<String>,
        peer_id: impl Into<String>,
        nonces: Arc<NonceCache>,
    ) -> Self {
        Self {
            key,
            local_id: local_id.into(),
            peer_id: peer_id.into(),
            nonces,
        }
    }

    /// Our identity.
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// The authenticated peer.
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// The session key.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Seal `body` for the peer.
    pub fn seal(&self, body: &str) -> Result<Envelope, AuthError> {
        let payload = SecurePayload {
            nonce: encode_field(&self.nonces.generate_registered()),
            sender_id: self.local_id.clone(),
            target_service: self.peer_id.clone(),
            message: body.to_string(),
        };
        let plaintext = zeroize::Zeroizing::new(
            serde_json::to_vec(&payload).map_err(|e| AuthError::protocol(e.to_string()))?,
        );
        let sealed = encrypt(&plaintext, &self.key)?;
        Ok(Envelope::from_sealed(&sealed))
    }

    /// Open an envelope from the peer and return its body.
    pub fn open(&self, envelope: &Envelope) -> Result<String, AuthError> {
        let sealed = envelope.to_sealed()?;
        let plaintext = zeroize::Zeroizing::new(decrypt(&sealed, &self.key)?);
        let payload: SecurePayload = serde_json::from_slice(&plaintext)
            .map_err(|e| AuthError::Protocol(format!("bad secure payload: {}", e)))?;

        if payload.target_service != self.local_id {
            return Err(AuthError::WrongTarget {
                expected: self.local_id.clone(),
                got: payload.target_service,
            });
        }
        if payload.sender_id != self.peer_id {
            return Err(AuthError::WrongTarget {
                expected: self.peer_id.clone(),
                got: payload.sender_id,
            });
        }

        let nonce = decode_field("nonce", &payload.nonce)?;
        if nonce.len() != self.nonces.nonce_len() {
            return Err(AuthError::protocol("message nonce has the wrong length"));
        }
        self.nonces.insert_if_absent(&nonce)?;

        Ok(payload.message)
    }

    /// Seal and send `body`.
    pub async fn send<T>(&self, transport: &mut T, body: &str) -> Result<(), AuthError>
    where
        T: MessageTransport + ?Sized,
    {
        let envelope = self.seal(body)?;
        transport.send(&Message::Envelope(envelope)).await
    }

    /// Receive and open one envelope.
    pub async fn receive<T>(&self, transport: &mut T) -> Result<String, AuthError>
    where
        T: MessageTransport + ?Sized,
    {
        match transport.receive().await? {
            Message::Envelope(envelope) => self.open(&envelope),
            other => Err(other.unexpected("Secure Message")),
        }
    }
}

impl fmt::Debug for SecureSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureSession")
            .field("local_id", &self.local_id)
            .field("peer_id", &self.peer_id)
            .finish_non_exhaustive()
    }
}
