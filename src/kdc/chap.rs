//! KDC side of the CHAP exchange.
//!
//! States: AwaitClaim -> AwaitResponse -> Authenticated | Rejected.
//! Every failure, including a message that does not parse, answers
//! `Result { result: false }` before the connection is closed.

use tracing::{debug, warn};

use crate::crypto::{verify_chap, NonceCache};
use crate::error::AuthError;
use crate::protocol::{decode_field, encode_field, Challenge, ChapResult, Message};
use crate::secrets::SecretStore;
use crate::transport::MessageTransport;

/// Send a negative result, ignoring a failed write.
pub(crate) async fn reject<T>(transport: &mut T)
where
    T: MessageTransport + ?Sized,
{
    let _ = transport
        .send(&Message::ChapResult(ChapResult { result: false }))
        .await;
}

/// Challenge/response check of a claimed identity.
pub struct ChapAuthenticator<'a> {
    secrets: &'a SecretStore,
    nonces: &'a NonceCache,
}

impl<'a> ChapAuthenticator<'a> {
    /// `nonces` must hold 32-byte entries.
    pub fn new(secrets: &'a SecretStore, nonces: &'a NonceCache) -> Self {
        Self { secrets, nonces }
    }

    /// Run the exchange. Returns the authenticated principal.
    pub async fn authenticate<T>(&self, transport: &mut T) -> Result<String, AuthError>
    where
        T: MessageTransport + ?Sized,
    {
        match self.exchange(transport).await {
            Ok(user) => Ok(user),
            Err(e) => {
                reject(transport).await;
                Err(e)
            }
        }
    }

    async fn exchange<T>(&self, transport: &mut T) -> Result<String, AuthError>
    where
        T: MessageTransport + ?Sized,
    {
        // AwaitClaim
        let claim = match transport.receive().await? {
            Message::Claim(claim) => claim,
            other => return Err(other.unexpected("RFC1994 Initial")),
        };
        let secret = self.secrets.require(&claim.id)?;

        let nonce = self.nonces.generate_registered();
        transport
            .send(&Message::Challenge(Challenge {
                challenge: encode_field(&nonce),
            }))
            .await?;
        debug!(user = %claim.id, "challenge sent");

        // AwaitResponse
        let response = match transport.receive().await? {
            Message::Response(response) => response,
            other => return Err(other.unexpected("RFC1994 Response")),
        };
        let hash = decode_field("hash", &response.hash)?;

        if !verify_chap(secret, &nonce, &hash) {
            warn!(user = %claim.id, "CHAP response mismatch");
            return Err(AuthError::AuthenticationFailed);
        }

        transport
            .send(&Message::ChapResult(ChapResult { result: true }))
            .await?;
        Ok(claim.id)
    }
}
