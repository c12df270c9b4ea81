//! Key derivation and authenticated encryption.
//!
//! This module provides:
//! - scrypt key derivation from a shared secret, with a salt that is
//!   configuration and never the secret itself
//! - AES-256-GCM sealing with a fresh 96-bit IV per message
//!
//! Every failure to open a box surfaces as [`AuthError::Decryption`], whether
//! the tag was wrong, the key was wrong, or the base64 was garbage.

use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::{rngs::OsRng, RngCore};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

use crate::error::AuthError;

/// Symmetric key size (AES-256).
pub const KEY_SIZE: usize = 32;

/// GCM IV size.
pub const IV_SIZE: usize = 12;

/// GCM tag size, appended to every ciphertext.
pub const TAG_SIZE: usize = 16;

/// Default scrypt salt shared by every party that has not configured one.
pub const DEFAULT_KDF_SALT: &[u8] = b"ticketgate/kdf/v1";

/// Default scrypt cost: N = 2^14.
pub const DEFAULT_KDF_LOG_N: u8 = 14;

/// Default scrypt block size.
pub const DEFAULT_KDF_R: u32 = 8;

/// Default scrypt parallelism.
pub const DEFAULT_KDF_P: u32 = 1;

/// A 256-bit symmetric key, zeroized on drop.
#[derive(Clone)]
pub struct Key([u8; KEY_SIZE]);

impl Key {
    /// Generate a fresh random key (used for session keys).
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build a key from a decrypted blob. Wrong length is a decryption failure.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, AuthError> {
        let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| AuthError::Decryption)?;
        Ok(Self(bytes))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for Key {}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key(<redacted>)")
    }
}

impl Drop for Key {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// scrypt cost parameters. All parties must agree on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// log2 of the CPU/memory cost N.
    pub log_n: u8,
    /// Block size.
    pub r: u32,
    /// Parallelism.
    pub p: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            log_n: DEFAULT_KDF_LOG_N,
            r: DEFAULT_KDF_R,
            p: DEFAULT_KDF_P,
        }
    }
}

impl KdfParams {
    /// Default parameters with a different cost.
    pub fn with_log_n(log_n: u8) -> Self {
        Self {
            log_n,
            ..Default::default()
        }
    }
}

/// Derives symmetric keys from shared secrets.
#[derive(Debug, Clone)]
pub struct Kdf {
    salt: Vec<u8>,
    params: KdfParams,
}

impl Default for Kdf {
    fn default() -> Self {
        Self::new(DEFAULT_KDF_SALT.to_vec(), KdfParams::default())
    }
}

impl Kdf {
    /// Create a deriver with an explicit salt and cost.
    pub fn new(salt: Vec<u8>, params: KdfParams) -> Self {
        Self { salt, params }
    }

    /// Derive the 256-bit key for a shared secret.
    pub fn derive_key(&self, secret: &str) -> Result<Key, AuthError> {
        let params = scrypt::Params::new(self.params.log_n, self.params.r, self.params.p, KEY_SIZE)
            .map_err(|_| AuthError::KeyDerivation)?;

        let mut key = [0u8; KEY_SIZE];
        scrypt::scrypt(secret.as_bytes(), &self.salt, &params, &mut key)
            .map_err(|_| AuthError::KeyDerivation)?;

        Ok(Key(key))
    }

    /// Same as [`Kdf::derive_key`], run on the blocking pool.
    pub async fn derive_key_async(&self, secret: &str) -> Result<Key, AuthError> {
        let kdf = self.clone();
        let secret = Zeroizing::new(secret.to_string());
        tokio::task::spawn_blocking(move || kdf.derive_key(&secret))
            .await
            .map_err(|_| AuthError::KeyDerivation)?
    }
}

/// An AEAD box: IV plus ciphertext-with-tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    /// 96-bit IV, unique per encryption.
    pub iv: [u8; IV_SIZE],
    /// Ciphertext followed by the 128-bit tag.
    pub ciphertext: Vec<u8>,
}

impl Sealed {
    /// Decode the sibling-field wire layout (`iv` and ciphertext as separate base64 strings).
    pub fn from_b64(iv: &str, ciphertext: &str) -> Result<Self, AuthError> {
        let iv = STANDARD.decode(iv).map_err(|_| AuthError::Decryption)?;
        let iv: [u8; IV_SIZE] = iv.as_slice().try_into().map_err(|_| AuthError::Decryption)?;
        let ciphertext = STANDARD.decode(ciphertext).map_err(|_| AuthError::Decryption)?;
        Ok(Self { iv, ciphertext })
    }

    /// Decode the legacy combined blob: base64(iv || ciphertext).
    pub fn from_combined(blob: &str) -> Result<Self, AuthError> {
        let data = STANDARD.decode(blob).map_err(|_| AuthError::Decryption)?;
        if data.len() < IV_SIZE + TAG_SIZE {
            return Err(AuthError::Decryption);
        }
        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(&data[..IV_SIZE]);
        Ok(Self {
            iv,
            ciphertext: data[IV_SIZE..].to_vec(),
        })
    }

    /// Decode either layout: sibling fields when an IV is present and
    /// non-empty, otherwise the combined blob.
    pub fn from_either(iv: Option<&str>, data: &str) -> Result<Self, AuthError> {
        match iv {
            Some(iv) if !iv.is_empty() => Self::from_b64(iv, data),
            _ => Self::from_combined(data),
        }
    }

    /// Base64 of the IV.
    pub fn iv_b64(&self) -> String {
        STANDARD.encode(self.iv)
    }

    /// Base64 of the ciphertext (tag included).
    pub fn ciphertext_b64(&self) -> String {
        STANDARD.encode(&self.ciphertext)
    }

    /// Encode as the legacy combined blob.
    pub fn to_combined(&self) -> String {
        let mut data = Vec::with_capacity(IV_SIZE + self.ciphertext.len());
        data.extend_from_slice(&self.iv);
        data.extend_from_slice(&self.ciphertext);
        STANDARD.encode(data)
    }
}

/// Encrypt under `key` with a fresh random IV.
pub fn encrypt(plaintext: &[u8], key: &Key) -> Result<Sealed, AuthError> {
    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| AuthError::KeyDerivation)?;

    // Only fails on absurd plaintext lengths.
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| AuthError::InvalidArgument("plaintext too long".to_string()))?;

    Ok(Sealed { iv, ciphertext })
}

/// Open a box. Any failure is [`AuthError::Decryption`].
pub fn decrypt(sealed: &Sealed, key: &Key) -> Result<Vec<u8>, AuthError> {
    if sealed.ciphertext.len() < TAG_SIZE {
        return Err(AuthError::Decryption);
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| AuthError::Decryption)?;

    cipher
        .decrypt(Nonce::from_slice(&sealed.iv), sealed.ciphertext.as_ref())
        .map_err(|_| AuthError::Decryption)
}
