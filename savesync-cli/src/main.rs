//! savesync: keep game save directories in sync with a shared object store.
//!
//! # Usage
//!
//! ```text
//! savesync init --remote-root <path> [--games-dir <path>] [--appdata-dir <path>]
//! savesync scan [--json]
//! savesync status [--json]
//! savesync sync <title> [--dry-run]
//! savesync sync --all [--dry-run]
//! savesync daemon start|stop|status
//! savesync daemon sync [title]
//! ```

mod commands;
mod prompt;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand, init::InitArgs, scan::ScanArgs, status::StatusArgs, sync::SyncArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "savesync",
    version,
    about = "Synchronize game save data through a shared remote folder",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write or update ~/.savesync/config.yaml.
    Init(InitArgs),

    /// List the games detected on this machine.
    Scan(ScanArgs),

    /// Show what a sync would do for every detected game, without transferring.
    Status(StatusArgs),

    /// Reconcile saves once, without the daemon.
    Sync(SyncArgs),

    /// Run or control the background sync daemon.
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
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Scan(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Sync(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
