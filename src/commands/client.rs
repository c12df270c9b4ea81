//! Client command: authenticate, fetch a ticket, talk to a service.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use zeroize::Zeroizing;

use ticketgate::config::{NetworkSettings, KDC_HOST_NAME};
use ticketgate::crypto::{NonceCache, NONCE_SIZE};
use ticketgate::transport::{MessageTransport, TcpConnection};
use ticketgate::{ClientAgent, HostsConfig, ServiceHandshake};

use super::{init_logging, runtime, CommandExecutor};

/// Environment variable consulted before prompting for the password.
const PASSWORD_ENV: &str = "TICKETGATE_PASSWORD";

/// Prompt for a password (input hidden) unless one is in the environment.
fn read_password(user: &str) -> Result<Zeroizing<String>> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(Zeroizing::new(password));
    }
    rpassword::prompt_password(format!("Password for {}: ", user))
        .map(Zeroizing::new)
        .context("Failed to read password")
}

/// Authenticate to the KDC and open a secure session with a service.
///
/// Without --message, each line read from stdin is sent and the reply printed.
#[derive(Args, Debug)]
pub struct ClientCommand {
    /// Hosts file mapping `kdcd` and service names to addresses
    /// (default: ~/.ticketgate/hosts.toml)
    #[arg(long)]
    pub hosts: Option<PathBuf>,

    /// KDC address (host:port), overrides the hosts file
    #[arg(long)]
    pub kdc: Option<String>,

    /// Service address (host:port), overrides the hosts file
    #[arg(long)]
    pub service_addr: Option<String>,

    /// User name
    #[arg(short, long)]
    pub user: String,

    /// Service name
    #[arg(short, long)]
    pub service: String,

    /// Send one message and exit
    #[arg(short, long)]
    pub message: Option<String>,
}

impl ClientCommand {
    /// Hosts file, if one was given or exists at the default location.
    fn load_hosts(&self) -> Result<Option<HostsConfig>> {
        let path = match &self.hosts {
            Some(path) => path.clone(),
            None => {
                let path = HostsConfig::default_path()?;
                if !path.exists() {
                    return Ok(None);
                }
                path
            }
        };
        HostsConfig::load(&path)
            .map(Some)
            .with_context(|| format!("Failed to load {}", path.display()))
    }

    fn resolve(
        explicit: &Option<String>,
        hosts: Option<&HostsConfig>,
        name: &str,
    ) -> Result<String> {
        if let Some(addr) = explicit {
            return Ok(addr.clone());
        }
        let hosts = hosts.ok_or_else(|| {
            anyhow!("No address for `{}`: pass it explicitly or provide a hosts file", name)
        })?;
        Ok(hosts.resolve(name)?)
    }
}

impl CommandExecutor for ClientCommand {
    fn execute(&self) -> Result<()> {
        init_logging(false);

        let hosts = self.load_hosts()?;
        let kdc_addr = Self::resolve(&self.kdc, hosts.as_ref(), KDC_HOST_NAME)?;
        let service_addr = Self::resolve(&self.service_addr, hosts.as_ref(), &self.service)?;
        let network: NetworkSettings = hosts.map(|h| h.network).unwrap_or_default();
        let password = read_password(&self.user)?;

        runtime()?.block_on(async {
            let mut kdc = TcpConnection::connect(&kdc_addr)
                .await
                .with_context(|| format!("Failed to connect to KDC at {}", kdc_addr))?
                .with_read_timeout(network.read_timeout());
            let grant = ClientAgent::new(self.user.clone(), network.kdf())
                .obtain_ticket(&mut kdc, &password, &self.service)
                .await
                .map_err(|e| anyhow::Error::new(e).context("authentication failed"))?;
            let _ = kdc.close().await;

            let mut conn = TcpConnection::connect(&service_addr)
                .await
                .with_context(|| {
                    format!("Failed to connect to {} at {}", self.service, service_addr)
                })?
                .with_read_timeout(network.read_timeout());
            let nonces = Arc::new(NonceCache::new(NONCE_SIZE, network.nonce_window()));
            let session = ServiceHandshake::with_nonce_cache(&grant, nonces)
                .connect(&mut conn)
                .await
                .map_err(|e| anyhow::Error::new(e).context("handshake failed"))?;

            let ended = || format!("session with {} ended", self.service);
            if let Some(message) = &self.message {
                session.send(&mut conn, message).await.with_context(ended)?;
                println!("{}", session.receive(&mut conn).await.with_context(ended)?);
            } else {
                let mut lines = BufReader::new(tokio::io::stdin()).lines();
                while let Some(line) = lines.next_line().await? {
                    if line.is_empty() {
                        continue;
                    }
                    session.send(&mut conn, &line).await.with_context(ended)?;
                    println!("{}", session.receive(&mut conn).await.with_context(ended)?);
                }
            }

            let _ = conn.close().await;
            Ok::<(), anyhow::Error>(())
        })
    }
}
