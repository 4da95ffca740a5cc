//! Sync Hub: scheduled provider syncs over a shared record store.
//!
//! # Usage
//!
//! ```text
//! synchub daemon start|stop|status
//! synchub sync <provider> [--full]
//! synchub sync --all
//! synchub status [--json]
//! synchub providers [--json]
//! synchub activity <provider> [--limit N]
//! synchub reset
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    activity::ActivityArgs, daemon::DaemonCommand, providers::ProvidersArgs, status::StatusArgs,
    sync::SyncArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "synchub",
    version,
    about = "Run and inspect scheduled sync providers",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Trigger a sync through the running daemon.
    Sync(SyncArgs),

    /// Show every provider record.
    Status(StatusArgs),

    /// List providers registered with the running daemon.
    Providers(ProvidersArgs),

    /// Print a provider's activity log.
    Activity(ActivityArgs),

    /// Reset every record stuck in the syncing state.
    Reset,

    /// Run or control the background daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Sync(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Providers(args) => args.run(),
        Commands::Activity(args) => args.run(),
        Commands::Reset => commands::reset::run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
