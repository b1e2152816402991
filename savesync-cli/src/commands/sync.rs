//! `savesync sync`: reconcile saves once without the daemon.

use anyhow::{bail, Context, Result};
use clap::Args;

use savesync_core::{config, ItemTitle, SyncAction};
use savesync_sync::pipeline::{self, ReconcileResult, SyncScope};

use super::home;
use crate::prompt::DialoguerResolver;

/// Arguments for `savesync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Title of the game to sync, e.g. `Touhou13` (omit when using `--all`).
    pub title: Option<String>,

    /// Sync every detected game.
    #[arg(long, conflicts_with = "title")]
    pub all: bool,

    /// Show what would happen without transferring anything.
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let config = config::load_at(&home).context("failed to load configuration")?;

        let scope = if self.all {
            SyncScope::All
        } else {
            let title = self
                .title
                .clone()
                .context("provide a game title or use --all")?;
            SyncScope::Item(ItemTitle::from(title))
        };

        let results = pipeline::run(&home, &config, scope, &DialoguerResolver, self.dry_run)
            .context("sync failed")?;
        if results.is_empty() {
            println!("No games detected. Check `savesync scan`.");
        }

        let mut failures = 0usize;
        for result in &results {
            println!("{}", render(result));
            if result.is_failure() {
                failures += 1;
            }
        }
        if failures > 0 {
            bail!("{failures} game(s) failed to sync");
        }
        Ok(())
    }
}

fn render(result: &ReconcileResult) -> String {
    match result {
        ReconcileResult::Applied {
            title,
            action,
            conflict,
        } => {
            let resolved = if *conflict { " (conflict resolved)" } else { "" };
            format!("✓ '{title}' {}{resolved}", describe(*action))
        }
        ReconcileResult::WouldApply { title, action } => {
            format!("[dry-run] '{title}' would {}", verb(*action))
        }
        ReconcileResult::WouldConflict { title, conflict } => {
            format!("[dry-run] '{title}' needs a decision: {conflict}")
        }
        ReconcileResult::Failed { title, error } => format!("✗ '{title}' failed: {error}"),
    }
}

fn describe(action: SyncAction) -> &'static str {
    match action {
        SyncAction::Push => "uploaded",
        SyncAction::Pull => "downloaded",
        SyncAction::None => "already up to date",
    }
}

fn verb(action: SyncAction) -> &'static str {
    match action {
        SyncAction::Push => "upload",
        SyncAction::Pull => "download",
        SyncAction::None => "do nothing",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_marks_dry_run_and_failures() {
        let title = ItemTitle::from("Touhou13");
        let dry = render(&ReconcileResult::WouldApply {
            title: title.clone(),
            action: SyncAction::Push,
        });
        assert_eq!(dry, "[dry-run] 'Touhou13' would upload");

        let failed = render(&ReconcileResult::Failed {
            title,
            error: "disk full".to_string(),
        });
        assert!(failed.contains("failed: disk full"));
    }
}
