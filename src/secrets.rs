//! Shared-secret store for the KDC.
//!
//! Stored as TOML in `~/.ticketgate/secrets.toml` unless a path is given:
//!
//! ```toml
//! [secrets]
//! alice = "pw1"
//! echo = "pw2"
//! ```
//!
//! Loaded once at startup and read-only afterwards.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use zeroize::Zeroize;

use crate::error::AuthError;

/// Principal name to shared secret.
#[derive(Deserialize, Default)]
pub struct SecretStore {
    #[serde(default)]
    secrets: HashMap<String, String>,
}

impl SecretStore {
    /// Load a store from a TOML file.
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let content = fs::read_to_string(path).map_err(|e| {
            AuthError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
            .map_err(|e| AuthError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse a store from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, AuthError> {
        toml::from_str(content).map_err(|e| AuthError::Config(e.to_string()))
    }

    /// Build a store from name/secret pairs.
    pub fn from_pairs<I, N, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, S)>,
        N: Into<String>,
        S: Into<String>,
    {
        Self {
            secrets: pairs
                .into_iter()
                .map(|(name, secret)| (name.into(), secret.into()))
                .collect(),
        }
    }

    /// Secret for `principal`, if known.
    pub fn get(&self, principal: &str) -> Option<&str> {
        self.secrets.get(principal).map(String::as_str)
    }

    /// Secret for `principal`, or [`AuthError::UnknownPrincipal`].
    pub fn require(&self, principal: &str) -> Result<&str, AuthError> {
        self.get(principal)
            .ok_or_else(|| AuthError::UnknownPrincipal(principal.to_string()))
    }

    /// Whether `principal` has an entry.
    pub fn contains(&self, principal: &str) -> bool {
        self.secrets.contains_key(principal)
    }

    /// Number of principals.
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    /// Whether the store has no principals.
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

impl fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.secrets.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("SecretStore")
            .field("principals", &names)
            .finish_non_exhaustive()
    }
}

impl Drop for SecretStore {
    fn drop(&mut self) {
        for secret in self.secrets.values_mut() {
            secret.zeroize();
        }
    }
}
