//! Relay: bulk synchronization of employee records to a message broker.
//!
//! # Usage
//!
//! ```text
//! relay init [--force]
//! relay records add --first-name <F> --last-name <L> --age <N> --department <D> [--post <P>] [--publish]
//! relay records list [--unsynced] [--json]
//! relay records resync [IDS..] [--all]
//! relay sync [--stop] [--json]
//! relay status [--json]
//! relay daemon start|stop|status|logs
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand, init::InitArgs, records::RecordsCommand, status::StatusArgs,
    sync::SyncArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "relay",
    version,
    about = "Propagate unsynced employee records to the message broker",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the default configuration to ~/.relay/config.yaml.
    Init(InitArgs),

    /// Insert, list, and re-flag employee records.
    Records {
        #[command(subcommand)]
        command: RecordsCommand,
    },

    /// Start (or stop) a bulk synchronization run.
    Sync(SyncArgs),

    /// Show the bulk sync job and record store counts.
    Status(StatusArgs),

    /// Manage the relay background daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    if !matches!(cli.command, Commands::Daemon { .. }) {
        init_tracing();
    }
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Records { command } => commands::records::run(command),
        Commands::Sync(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}

/// Diagnostics go to stderr so command output on stdout stays parseable.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
