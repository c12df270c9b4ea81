//! Tickets: the KDC's credential binding a user to a service.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::crypto::{decrypt, Key, Sealed};
use crate::error::AuthError;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A ticket as carried on the wire.
///
/// The session key inside is sealed under the service's derived key, so the
/// client can only transport it. `iv` may be empty, in which case
/// `encrypted_session_key` is the legacy combined blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    /// Issue time, Unix milliseconds.
    pub creation_time: u64,
    /// Lifetime in milliseconds.
    pub validity_time: u64,
    /// The authenticated user.
    pub username: String,
    /// The service this ticket is good for.
    pub service: String,
    /// Base64 IV of the sealed session key.
    #[serde(default)]
    pub iv: String,
    /// Base64 session key sealed under the service key.
    pub encrypted_session_key: String,
}

impl Ticket {
    /// Build a ticket issued now.
    pub fn new(username: &str, service: &str, validity: Duration, sealed_key: &Sealed) -> Self {
        Self::issued_at(username, service, now_millis(), validity, sealed_key)
    }

    /// Build a ticket with an explicit issue time.
    pub fn issued_at(
        username: &str,
        service: &str,
        creation_time: u64,
        validity: Duration,
        sealed_key: &Sealed,
    ) -> Self {
        Self {
            creation_time,
            validity_time: validity.as_millis() as u64,
            username: username.to_string(),
            service: service.to_string(),
            iv: sealed_key.iv_b64(),
            encrypted_session_key: sealed_key.ciphertext_b64(),
        }
    }

    /// Last valid instant, Unix milliseconds.
    pub fn expires_at(&self) -> u64 {
        self.creation_time.saturating_add(self.validity_time)
    }

    /// Expired iff `now > creation_time + validity_time`.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms > self.expires_at()
    }

    /// Expiry against the wall clock.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }

    /// The sealed session key, in whichever layout the ticket carries.
    pub fn sealed_session_key(&self) -> Result<Sealed, AuthError> {
        Sealed::from_either(Some(&self.iv), &self.encrypted_session_key)
    }

    /// Recover the session key with the service's derived key.
    pub fn open_session_key(&self, service_key: &Key) -> Result<Key, AuthError> {
        let sealed = self.sealed_session_key()?;
        let plaintext = zeroize::Zeroizing::new(decrypt(&sealed, service_key)?);
        Key::from_slice(&plaintext)
    }
}
