//! Ticketgate - ticket-based authentication for TCP services
//!
//! One binary for all three roles: the KDC daemon, the echo service and the
//! interactive client.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{ClientCommand, CommandExecutor, EchoCommand, KdcdCommand};

/// Ticketgate - ticket-based authentication for TCP services
///
/// Users log in to a KDC with a challenge/response over their shared secret and
/// receive a ticket for a service. The service checks the ticket, both sides
/// prove they hold the session key, and traffic continues under AES-GCM.
#[derive(Parser)]
#[command(name = "ticketgate")]
#[command(version)]
#[command(about = "Kerberos-style ticket authentication for TCP services")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the key distribution center
    Kdcd(KdcdCommand),

    /// Run the echo service
    Echo(EchoCommand),

    /// Log in, get a ticket and talk to a service
    Client(ClientCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Kdcd(cmd) => cmd.execute(),
        Commands::Echo(cmd) => cmd.execute(),
        Commands::Client(cmd) => cmd.execute(),
    }
}
