//! Wire message types.
//!
//! Every message is one JSON object with a `type` discriminator, sent as a
//! single line. The set is closed: an unknown `type` fails to parse.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::crypto::Sealed;
use crate::error::AuthError;
use crate::protocol::ticket::Ticket;

/// CHAP step 1: the identity being claimed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claim {
    /// Claimed principal name.
    pub id: String,
}

/// CHAP step 2: the KDC's random challenge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Challenge {
    /// Base64 challenge bytes.
    pub challenge: String,
}

/// CHAP step 3: the client's hash over secret and challenge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Response {
    /// Base64 SHA-256 digest.
    pub hash: String,
}

/// CHAP step 4, also used as the KDC's generic failure reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChapResult {
    /// Whether authentication succeeded.
    pub result: bool,
}

/// Request for a ticket to `service`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TicketRequest {
    /// Target service.
    pub service: String,
    /// Requesting user; must be the CHAP-authenticated identity.
    pub id: String,
}

/// The KDC's answer to a ticket request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TicketResponse {
    /// Session key sealed under the user's key. Legacy combined blob unless
    /// `iv` is present.
    pub session_key: String,
    /// Sibling IV for `session_key`, when the sender uses that layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,
    /// Ticket for the service.
    pub ticket: Ticket,
}

impl TicketResponse {
    /// The client-facing sealed session key.
    pub fn sealed_session_key(&self) -> Result<Sealed, AuthError> {
        Sealed::from_either(self.iv.as_deref(), &self.session_key)
    }
}

/// Handshake step 1: ticket plus the client's nonce Nc.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientHello {
    /// Ticket issued by the KDC.
    pub ticket: Ticket,
    /// Base64 Nc.
    pub nonce: String,
}

/// Handshake step 2: the service's nonce Ns and Nc sealed under the session key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeResponse {
    /// Base64 Ns.
    pub nonce: String,
    /// Responding service name.
    pub service: String,
    /// Base64 IV.
    pub iv: String,
    /// Base64 sealed Nc.
    pub encrypted_nonce: String,
}

/// Handshake step 3: the client's fresh nonce Nr and Ns sealed under the session key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientResponse {
    /// Base64 Nr.
    pub nonce: String,
    /// Client identity; must match the ticket's user.
    pub client_id: String,
    /// Base64 IV.
    pub iv: String,
    /// Base64 sealed Ns.
    pub encrypted_nonce: String,
}

/// Application traffic after the handshake.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Envelope {
    /// Base64 IV.
    pub iv: String,
    /// Base64 sealed [`SecurePayload`].
    pub message: String,
}

impl Envelope {
    /// Wrap a sealed box.
    pub fn from_sealed(sealed: &Sealed) -> Self {
        Self {
            iv: sealed.iv_b64(),
            message: sealed.ciphertext_b64(),
        }
    }

    /// Unwrap to a sealed box.
    pub fn to_sealed(&self) -> Result<Sealed, AuthError> {
        Sealed::from_b64(&self.iv, &self.message)
    }
}

/// Plaintext inside an [`Envelope`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecurePayload {
    /// Base64 per-message nonce.
    pub nonce: String,
    /// Sender identity.
    pub sender_id: String,
    /// Intended recipient identity.
    pub target_service: String,
    /// Application body.
    pub message: String,
}

/// Generic failure notice. Carries a reason safe to show the peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Failure {
    /// Short reason.
    pub message: String,
}

/// Every message the protocol can carry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "RFC1994 Initial")]
    Claim(Claim),
    #[serde(rename = "RFC1994 Challenge")]
    Challenge(Challenge),
    #[serde(rename = "RFC1994 Response")]
    Response(Response),
    #[serde(rename = "RFC1994 Result")]
    ChapResult(ChapResult),
    #[serde(rename = "Ticket Request")]
    TicketRequest(TicketRequest),
    #[serde(rename = "Ticket Response")]
    TicketResponse(TicketResponse),
    #[serde(rename = "Client Hello")]
    ClientHello(ClientHello),
    #[serde(rename = "Handshake Response")]
    HandshakeResponse(HandshakeResponse),
    #[serde(rename = "Client Response")]
    ClientResponse(ClientResponse),
    #[serde(rename = "Secure Message")]
    Envelope(Envelope),
    #[serde(rename = "Error")]
    Failure(Failure),
}

impl Message {
    /// The `type` discriminator this message is sent with.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Claim(_) => "RFC1994 Initial",
            Message::Challenge(_) => "RFC1994 Challenge",
            Message::Response(_) => "RFC1994 Response",
            Message::ChapResult(_) => "RFC1994 Result",
            Message::TicketRequest(_) => "Ticket Request",
            Message::TicketResponse(_) => "Ticket Response",
            Message::ClientHello(_) => "Client Hello",
            Message::HandshakeResponse(_) => "Handshake Response",
            Message::ClientResponse(_) => "Client Response",
            Message::Envelope(_) => "Secure Message",
            Message::Failure(_) => "Error",
        }
    }

    /// Serialize to a single JSON line (no trailing newline).
    pub fn to_line(&self) -> Result<String, AuthError> {
        serde_json::to_string(self).map_err(|e| AuthError::protocol(e.to_string()))
    }

    /// Parse one JSON line.
    pub fn from_line(line: &str) -> Result<Self, AuthError> {
        serde_json::from_str(line.trim_end()).map_err(|e| AuthError::protocol(e.to_string()))
    }

    /// Error for receiving this message when `expected` was due.
    pub fn unexpected(self, expected: &str) -> AuthError {
        match self {
            Message::Failure(f) => AuthError::Protocol(format!("peer reported: {}", f.message)),
            other => AuthError::Protocol(format!("expected {}, got {}", expected, other.kind())),
        }
    }
}

/// Decode a base64 field, naming it in the error.
pub fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, AuthError> {
    STANDARD
        .decode(value)
        .map_err(|_| AuthError::Protocol(format!("field `{}` is not valid base64", name)))
}

/// Base64 encode a binary field.
pub fn encode_field(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::crypto::{encrypt, Key};

    fn sample_ticket() -> Ticket {
        let sealed = encrypt(&[1u8; 32], &Key::generate()).unwrap();
        Ticket::new("alice", "echo", Duration::from_secs(60), &sealed)
    }

    #[test]
    fn test_claim_wire_format() {
        let msg = Message::Claim(Claim { id: "alice".to_string() });
        let line = msg.to_line().unwrap();

        assert!(!line.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "RFC1994 Initial");
        assert_eq!(value["id"], "alice");
    }

    #[test]
    fn test_parse_from_foreign_json() {
        let line = r#"{"type": "RFC1994 Result", "result": false}"#;
        assert_eq!(
            Message::from_line(line).unwrap(),
            Message::ChapResult(ChapResult { result: false })
        );

        let line = r#"{"service":"echo","id":"alice","type":"Ticket Request"}"#;
        assert_eq!(
            Message::from_line(line).unwrap(),
            Message::TicketRequest(TicketRequest {
                service: "echo".to_string(),
                id: "alice".to_string(),
            })
        );
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = Message::from_line(r#"{"type":"claim","username":"alice"}"#).unwrap_err();
        assert!(matches!(err, AuthError::Protocol(_)));
    }

    #[test]
    fn test_missing_field_rejected() {
        let err = Message::from_line(r#"{"type":"RFC1994 Response"}"#).unwrap_err();
        assert!(matches!(err, AuthError::Protocol(_)));
    }

    #[test]
    fn test_not_json_rejected() {
        assert!(Message::from_line("hello").is_err());
        assert!(Message::from_line("").is_err());
    }

    #[test]
    fn test_handshake_field_names() {
        let msg = Message::HandshakeResponse(HandshakeResponse {
            nonce: "Tg==".to_string(),
            service: "echo".to_string(),
            iv: "SVY=".to_string(),
            encrypted_nonce: "RU4=".to_string(),
        });
        let value: serde_json::Value = serde_json::from_str(&msg.to_line().unwrap()).unwrap();
        assert_eq!(value["type"], "Handshake Response");
        assert_eq!(value["encryptedNonce"], "RU4=");

        let msg = Message::ClientResponse(ClientResponse {
            nonce: "Tg==".to_string(),
            client_id: "alice".to_string(),
            iv: "SVY=".to_string(),
            encrypted_nonce: "RU4=".to_string(),
        });
        let value: serde_json::Value = serde_json::from_str(&msg.to_line().unwrap()).unwrap();
        assert_eq!(value["clientId"], "alice");
    }

    #[test]
    fn test_ticket_response_embeds_ticket_object() {
        let msg = Message::TicketResponse(TicketResponse {
            session_key: "blob".to_string(),
            iv: None,
            ticket: sample_ticket(),
        });
        let value: serde_json::Value = serde_json::from_str(&msg.to_line().unwrap()).unwrap();

        assert_eq!(value["type"], "Ticket Response");
        assert_eq!(value["sessionKey"], "blob");
        assert!(value.get("iv").is_none());
        assert!(value["ticket"].is_object());
        assert_eq!(value["ticket"]["username"], "alice");
    }

    #[test]
    fn test_ticket_response_accepts_both_layouts() {
        let user_key = Key::generate();
        let sealed = encrypt(&[5u8; 32], &user_key).unwrap();

        let combined = TicketResponse {
            session_key: sealed.to_combined(),
            iv: None,
            ticket: sample_ticket(),
        };
        let siblings = TicketResponse {
            session_key: sealed.ciphertext_b64(),
            iv: Some(sealed.iv_b64()),
            ticket: sample_ticket(),
        };

        assert_eq!(combined.sealed_session_key().unwrap(), sealed);
        assert_eq!(siblings.sealed_session_key().unwrap(), sealed);
    }

    #[test]
    fn test_unexpected_surfaces_peer_failure() {
        let err = Message::Failure(Failure { message: "ticket expired".to_string() })
            .unexpected("Handshake Response");
        assert!(err.to_string().contains("ticket expired"));

        let err = Message::ChapResult(ChapResult { result: true }).unexpected("RFC1994 Challenge");
        assert!(err.to_string().contains("RFC1994 Result"));
    }

    #[test]
    fn test_decode_field() {
        assert_eq!(decode_field("nonce", &encode_field(&[1, 2, 3])).unwrap(), vec![1, 2, 3]);
        let err = decode_field("nonce", "***").unwrap_err();
        assert!(err.to_string().contains("nonce"));
    }
}
