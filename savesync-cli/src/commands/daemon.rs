//! `savesync daemon`: background sync lifecycle.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Subcommand;

use savesync_daemon::paths::socket_path;
use savesync_daemon::{request_status, request_stop, request_sync, start_blocking, DaemonError};

use super::home;
use crate::prompt::DialoguerResolver;

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (watchers + sync loop + socket server).
    Start,
    /// Request graceful daemon shutdown over the Unix socket.
    Stop,
    /// Query daemon runtime status over the Unix socket.
    Status,
    /// Ask a running daemon to reconcile one game, or all games.
    Sync {
        /// Game title; every game when omitted.
        title: Option<String>,
    },
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home = home()?;

    match command {
        DaemonCommand::Start => {
            start_blocking(&home, Arc::new(DialoguerResolver)).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(&home) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => match request_status(&home) {
            Ok(status) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&status)
                        .context("failed to render daemon status JSON")?
                );
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                let payload = serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&payload)
                        .context("failed to render daemon status JSON")?
                );
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        },
        DaemonCommand::Sync { title } => {
            let queued = request_sync(&home, title).context("failed to queue sync")?;
            println!(
                "{}",
                serde_json::to_string_pretty(&queued).context("failed to render response JSON")?
            );
        }
    }

    Ok(())
}
