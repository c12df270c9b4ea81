//! Time-windowed replay cache.
//!
//! Entries live for `window` after insertion and are then evicted, so a
//! long-running server keeps only what it saw in the last window. Insertions
//! arrive in time order, which lets a `VecDeque` serve as the expiry queue.
//!
//! One cache is shared by every connection of a server. `insert_if_absent`
//! does the check and the insert under one lock, so two connections racing
//! with the same nonce get exactly one acceptance.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rand::{rngs::OsRng, RngCore};

use crate::error::AuthError;

/// Default lifetime of a cache entry.
pub const DEFAULT_NONCE_WINDOW: Duration = Duration::from_secs(60);

#[derive(Default)]
struct Entries {
    seen: HashSet<Vec<u8>>,
    expiry: VecDeque<(Instant, Vec<u8>)>,
}

impl Entries {
    fn evict_expired(&mut self, now: Instant) {
        while let Some((deadline, _)) = self.expiry.front() {
            if *deadline > now {
                break;
            }
            if let Some((_, nonce)) = self.expiry.pop_front() {
                self.seen.remove(&nonce);
            }
        }
    }
}

/// Set of recently seen nonces of one fixed size.
pub struct NonceCache {
    nonce_len: usize,
    window: Duration,
    entries: Mutex<Entries>,
}

impl NonceCache {
    /// Create a cache for `nonce_len`-byte nonces held for `window`.
    pub fn new(nonce_len: usize, window: Duration) -> Self {
        Self {
            nonce_len,
            window,
            entries: Mutex::new(Entries::default()),
        }
    }

    /// Nonce size this cache accepts.
    pub fn nonce_len(&self) -> usize {
        self.nonce_len
    }

    /// How long an entry is remembered.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Generate a random nonce of this cache's size. Not registered.
    pub fn generate(&self) -> Vec<u8> {
        let mut nonce = vec![0u8; self.nonce_len];
        OsRng.fill_bytes(&mut nonce);
        nonce
    }

    /// Generate a random nonce and register it. Retries on the (astronomically
    /// unlikely) collision with a live entry.
    pub fn generate_registered(&self) -> Vec<u8> {
        loop {
            let nonce = self.generate();
            if self.insert_if_absent(&nonce).is_ok() {
                return nonce;
            }
        }
    }

    /// Whether `nonce` was added within the current window.
    pub fn contains(&self, nonce: &[u8]) -> bool {
        self.contains_at(nonce, Instant::now())
    }

    /// Remember `nonce`. A no-op if it is already present.
    pub fn add(&self, nonce: &[u8]) -> Result<(), AuthError> {
        self.add_at(nonce, Instant::now()).map(|_| ())
    }

    /// Atomically check and remember `nonce`.
    ///
    /// Returns [`AuthError::ReplayDetected`] if it is already present.
    pub fn insert_if_absent(&self, nonce: &[u8]) -> Result<(), AuthError> {
        if self.add_at(nonce, Instant::now())? {
            Ok(())
        } else {
            Err(AuthError::ReplayDetected)
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let mut entries = self.lock();
        entries.evict_expired(Instant::now());
        entries.seen.len()
    }

    /// Whether there are no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains_at(&self, nonce: &[u8], now: Instant) -> bool {
        let mut entries = self.lock();
        entries.evict_expired(now);
        entries.seen.contains(nonce)
    }

    /// Returns `true` if the nonce was newly inserted.
    fn add_at(&self, nonce: &[u8], now: Instant) -> Result<bool, AuthError> {
        if nonce.len() != self.nonce_len {
            return Err(AuthError::InvalidArgument(format!(
                "nonce must be {} bytes, got {}",
                self.nonce_len,
                nonce.len()
            )));
        }

        let mut entries = self.lock();
        entries.evict_expired(now);

        if !entries.seen.insert(nonce.to_vec()) {
            return Ok(false);
        }
        entries.expiry.push_back((now + self.window, nonce.to_vec()));
        Ok(true)
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for NonceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonceCache")
            .field("nonce_len", &self.nonce_len)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}
