//! Error types shared by the KDC, the service responder and the client.

use thiserror::Error;

/// Errors that can occur while running any of the protocol state machines.
///
/// Every variant is handled inside the connection that raised it: the handler
/// sends a best-effort failure message and closes. None of them is fatal to
/// the process.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Malformed or unexpected message for the current state.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Peer closed the stream where a message was due. A protocol error at
    /// every step except between application messages.
    #[error("Protocol error: connection closed by peer")]
    ConnectionClosed,

    /// No message arrived within the read timeout.
    #[error("Protocol error: read timed out")]
    TimedOut,

    /// Identity not present in the secret store.
    #[error("Unknown principal: {0}")]
    UnknownPrincipal(String),

    /// CHAP response did not match, or the KDC answered `false`.
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// AEAD open failed. Bad tag, wrong key and malformed input all land here.
    #[error("Message authentication failed")]
    Decryption,

    /// Nonce already seen inside its cache window.
    #[error("Replay detected")]
    ReplayDetected,

    /// Ticket lifetime has elapsed.
    #[error("Ticket expired")]
    TicketExpired,

    /// Handshake nonce did not decrypt to the value we sent.
    #[error("Mutual authentication failed")]
    MutualAuthFailed,

    /// Message or ticket addressed to a different principal.
    #[error("Wrong target: expected {expected}, got {got}")]
    WrongTarget {
        /// Local identity.
        expected: String,
        /// Identity named by the peer.
        got: String,
    },

    /// Caller passed a value the operation cannot accept.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// scrypt rejected its parameters.
    #[error("Key derivation failed")]
    KeyDerivation,

    /// Configuration or secret store could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthError {
    /// A short reason that is safe to send to the peer.
    ///
    /// Never includes principal names, key material or parser details.
    pub fn peer_reason(&self) -> &'static str {
        match self {
            AuthError::Protocol(_)
            | AuthError::ConnectionClosed
            | AuthError::InvalidArgument(_) => "protocol error",
            AuthError::UnknownPrincipal(_) | AuthError::AuthenticationFailed => {
                "authentication failed"
            }
            AuthError::TimedOut => "timed out",
            AuthError::ReplayDetected => "replay detected",
            AuthError::TicketExpired => "ticket expired",
            AuthError::Decryption
            | AuthError::MutualAuthFailed
            | AuthError::WrongTarget { .. } => "handshake failed",
            AuthError::KeyDerivation | AuthError::Config(_) | AuthError::Io(_) => "internal error",
        }
    }

    /// Shorthand for building a [`AuthError::Protocol`].
    pub fn protocol(msg: impl Into<String>) -> Self {
        AuthError::Protocol(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_reason_hides_details() {
        let err = AuthError::UnknownPrincipal("mallory".to_string());
        assert!(!err.peer_reason().contains("mallory"));

        let err = AuthError::protocol("missing field `hash` at line 1");
        assert_eq!(err.peer_reason(), "protocol error");
    }

    #[test]
    fn test_timeout_is_reported_as_such() {
        assert_eq!(AuthError::TimedOut.peer_reason(), "timed out");
        assert!(AuthError::TimedOut.to_string().starts_with("Protocol error"));
    }

    #[test]
    fn test_decryption_and_mutual_auth_look_alike() {
        assert_eq!(
            AuthError::Decryption.peer_reason(),
            AuthError::MutualAuthFailed.peer_reason()
        );
    }
}
