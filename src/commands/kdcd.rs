//! KDC daemon command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use ticketgate::transport::TcpListener;
use ticketgate::{Dispatcher, Kdc, KdcConfig, SecretStore};

use super::{init_logging, runtime, CommandExecutor};

/// Run the key distribution center.
#[derive(Args, Debug)]
pub struct KdcdCommand {
    /// Config file (default: ~/.ticketgate/kdcd.toml, created if missing)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl CommandExecutor for KdcdCommand {
    fn execute(&self) -> Result<()> {
        init_logging(false);

        let path = match &self.config {
            Some(path) => path.clone(),
            None => KdcConfig::default_path()?,
        };
        let config = KdcConfig::load_or_create(&path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        let secrets = SecretStore::load(&config.secrets_file).with_context(|| {
            format!("Failed to load secrets from {}", config.secrets_file.display())
        })?;
        info!(principals = secrets.len(), validity_ms = config.validity_period, "KDC configured");

        runtime()?.block_on(async {
            let listener = TcpListener::bind(("0.0.0.0", config.port))
                .await
                .with_context(|| format!("Failed to bind port {}", config.port))?
                .with_read_timeout(config.network.read_timeout());

            let kdc = Kdc::from_config(&config, secrets);
            Dispatcher::new(listener, kdc)
                .run()
                .await
                .context("KDC listener failed")
        })
    }
}
