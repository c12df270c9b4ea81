//! CHAP response computation (RFC 1994 style, SHA-256).
//!
//! The response is `SHA-256(secret || nonce)` over raw bytes: the secret's
//! UTF-8 bytes followed directly by the challenge bytes. No string round-trip
//! of the nonce, so both sides hash exactly the same input.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Size of the KDC-generated challenge.
pub const CHAP_NONCE_SIZE: usize = 32;

/// Compute the CHAP response for a secret and challenge.
pub fn chap_digest(secret: &str, challenge: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(challenge);
    hasher.finalize().into()
}

/// Check a peer's response in constant time.
pub fn verify_chap(secret: &str, challenge: &[u8], response: &[u8]) -> bool {
    let expected = chap_digest(secret, challenge);
    expected.as_slice().ct_eq(response).into()
}
