//! Echo service command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use ticketgate::transport::TcpListener;
use ticketgate::{Dispatcher, Echo, Service, ServiceConfig};

use super::{init_logging, runtime, CommandExecutor};

/// Run the echo service: replies to every message upper-cased.
#[derive(Args, Debug)]
pub struct EchoCommand {
    /// Config file (default: ~/.ticketgate/echo.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl CommandExecutor for EchoCommand {
    fn execute(&self) -> Result<()> {
        let path = match &self.config {
            Some(path) => path.clone(),
            None => ServiceConfig::default_path("echo")?,
        };
        let config = ServiceConfig::load(&path)
            .with_context(|| format!("Failed to load {}", path.display()))?;

        init_logging(config.debug);

        runtime()?.block_on(async {
            let listener = TcpListener::bind(("0.0.0.0", config.port))
                .await
                .with_context(|| format!("Failed to bind port {}", config.port))?
                .with_read_timeout(config.network.read_timeout());

            let service = Service::from_config(&config, Echo)
                .await
                .context("Failed to derive service key")?;
            Dispatcher::new(listener, service)
                .run()
                .await
                .context("Echo listener failed")
        })
    }
}
