//! TOML configuration for the KDC, the echo service and the client.
//!
//! Files live in `~/.ticketgate/` unless a path is passed explicitly. Keys are
//! kebab-case:
//!
//! ```toml
//! # kdcd.toml
//! secrets-file = "secrets.toml"
//! port = 5000
//! validity-period = 60000
//! ```
//!
//! ```toml
//! # echo.toml
//! port = 5001
//! debug = true
//! service-name = "echo"
//! service-secret = "pw2"
//! idle-timeout-secs = 300
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::crypto::{Kdf, KdfParams, DEFAULT_KDF_SALT};
use crate::error::AuthError;

/// Default KDC port.
pub const DEFAULT_KDC_PORT: u16 = 5000;

/// Default ticket lifetime in milliseconds.
pub const DEFAULT_VALIDITY_MS: u64 = 60_000;

/// Default time a service waits for the next message of an established session.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Host entry name the client uses for the KDC.
pub const KDC_HOST_NAME: &str = "kdcd";

/// Get the ticketgate config directory (`~/.ticketgate`).
pub fn get_config_dir() -> Result<PathBuf, AuthError> {
    dirs::home_dir()
        .map(|home| home.join(".ticketgate"))
        .ok_or_else(|| AuthError::Config("unable to determine home directory".to_string()))
}

/// Read and parse a TOML file.
fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T, AuthError> {
    let content = fs::read_to_string(path)
        .map_err(|e| AuthError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    toml::from_str(&content).map_err(|e| AuthError::Config(format!("{}: {}", path.display(), e)))
}

/// Settings every server shares.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct NetworkSettings {
    /// Replay cache lifetime in seconds.
    pub nonce_window_secs: u64,
    /// Bound on each blocking receive, in seconds.
    pub read_timeout_secs: u64,
    /// scrypt salt shared by every party.
    pub kdf_salt: String,
    /// scrypt cost exponent; the default is used when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kdf_log_n: Option<u8>,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            nonce_window_secs: 60,
            read_timeout_secs: 30,
            kdf_salt: String::from_utf8_lossy(DEFAULT_KDF_SALT).into_owned(),
            kdf_log_n: None,
        }
    }
}

impl NetworkSettings {
    /// Key derivation configured by these settings.
    pub fn kdf(&self) -> Kdf {
        let params = self
            .kdf_log_n
            .map(KdfParams::with_log_n)
            .unwrap_or_default();
        Kdf::new(self.kdf_salt.as_bytes().to_vec(), params)
    }

    /// Replay cache lifetime.
    pub fn nonce_window(&self) -> Duration {
        Duration::from_secs(self.nonce_window_secs)
    }

    /// Receive timeout.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

/// KDC configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct KdcConfig {
    /// Secret store path. Relative paths resolve against the config file.
    pub secrets_file: PathBuf,
    /// Listen port.
    pub port: u16,
    /// Ticket lifetime in milliseconds.
    #[serde(default = "default_validity")]
    pub validity_period: u64,
    #[serde(flatten)]
    pub network: NetworkSettings,
}

fn default_validity() -> u64 {
    DEFAULT_VALIDITY_MS
}

impl Default for KdcConfig {
    fn default() -> Self {
        Self {
            secrets_file: PathBuf::from("secrets.toml"),
            port: DEFAULT_KDC_PORT,
            validity_period: DEFAULT_VALIDITY_MS,
            network: NetworkSettings::default(),
        }
    }
}

impl KdcConfig {
    /// Load from `path`, resolving a relative `secrets-file` against its directory.
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let mut config: Self = load_toml(path)?;
        if config.secrets_file.is_relative() {
            if let Some(dir) = path.parent() {
                config.secrets_file = dir.join(&config.secrets_file);
            }
        }
        Ok(config)
    }

    /// Default location, `~/.ticketgate/kdcd.toml`.
    pub fn default_path() -> Result<PathBuf, AuthError> {
        Ok(get_config_dir()?.join("kdcd.toml"))
    }

    /// Load `path`, writing a default config there first if it does not exist.
    pub fn load_or_create(path: &Path) -> Result<Self, AuthError> {
        if !path.exists() {
            Self::default().save(path)?;
        }
        Self::load(path)
    }

    /// Write this config as TOML.
    pub fn save(&self, path: &Path) -> Result<(), AuthError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AuthError::Config(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Ticket lifetime.
    pub fn validity(&self) -> Duration {
        Duration::from_millis(self.validity_period)
    }
}

/// Service configuration.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceConfig {
    /// Listen port.
    pub port: u16,
    /// Log at debug level.
    #[serde(default)]
    pub debug: bool,
    /// This service's principal name.
    pub service_name: String,
    /// This service's shared secret with the KDC.
    pub service_secret: String,
    /// Seconds an established session may sit idle before it is closed.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(flatten)]
    pub network: NetworkSettings,
}

fn default_idle_timeout() -> u64 {
    DEFAULT_IDLE_TIMEOUT_SECS
}

impl ServiceConfig {
    /// Load from `path`.
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        load_toml(path)
    }

    /// Bound on the wait for the next application message.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Default location, `~/.ticketgate/<name>.toml`.
    pub fn default_path(name: &str) -> Result<PathBuf, AuthError> {
        Ok(get_config_dir()?.join(format!("{}.toml", name)))
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("port", &self.port)
            .field("debug", &self.debug)
            .field("service_name", &self.service_name)
            .field("service_secret", &"<redacted>")
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .field("network", &self.network)
            .finish()
    }
}

/// One named endpoint in the client's hosts file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Host {
    /// Principal name, or `kdcd` for the KDC.
    pub host_name: String,
    /// IP address or DNS name.
    pub address: String,
    /// TCP port.
    pub port: u16,
}

impl Host {
    /// `address:port`.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// The client's hosts file.
///
/// ```toml
/// [[hosts]]
/// host-name = "kdcd"
/// address = "127.0.0.1"
/// port = 5000
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct HostsConfig {
    /// Known endpoints.
    #[serde(default)]
    pub hosts: Vec<Host>,
    /// Shared KDF and timeout settings.
    #[serde(flatten)]
    pub network: NetworkSettings,
}

impl HostsConfig {
    /// Load from `path`.
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        load_toml(path)
    }

    /// Default location, `~/.ticketgate/hosts.toml`.
    pub fn default_path() -> Result<PathBuf, AuthError> {
        Ok(get_config_dir()?.join("hosts.toml"))
    }

    /// Find a host by name.
    pub fn get(&self, name: &str) -> Option<&Host> {
        self.hosts.iter().find(|h| h.host_name == name)
    }

    /// Address of `name`, or a config error naming it.
    pub fn resolve(&self, name: &str) -> Result<String, AuthError> {
        self.get(name)
            .map(Host::socket_addr)
            .ok_or_else(|| AuthError::Config(format!("no host entry for `{}`", name)))
    }
}
