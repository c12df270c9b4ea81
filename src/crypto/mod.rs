//! Cryptographic operations for ticketgate.
//!
//! This module provides:
//! - scrypt key derivation from shared secrets
//! - AES-256-GCM authenticated encryption
//! - CHAP response hashing (SHA-256)
//! - A time-windowed nonce cache for replay protection

pub mod chap;
pub mod nonce_cache;
pub mod symmetric;

pub use chap::{chap_digest, verify_chap, CHAP_NONCE_SIZE};
pub use nonce_cache::{NonceCache, DEFAULT_NONCE_WINDOW};
pub use symmetric::{
    decrypt, encrypt, Kdf, KdfParams, Key, Sealed, DEFAULT_KDF_SALT, IV_SIZE, KEY_SIZE, TAG_SIZE,
};

/// Size of handshake nonces (Nc, Ns, Nr) and application message nonces.
pub const NONCE_SIZE: usize = 16;
