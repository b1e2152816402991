//! `savesync status`: what a sync would do right now, per game.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use savesync_core::{config, PayloadStat};
use savesync_sync::pipeline::{self, ItemReport};

use super::home;

/// Arguments for `savesync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct StatusReportJson<'a> {
    summary: StatusSummaryJson,
    items: &'a [ItemReport],
}

#[derive(Serialize)]
struct StatusSummaryJson {
    items: usize,
    pending: usize,
    conflicts: usize,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "title")]
    title: String,
    #[tabled(rename = "gen")]
    generation: String,
    #[tabled(rename = "local save")]
    local: String,
    #[tabled(rename = "remote save")]
    remote: String,
    #[tabled(rename = "action")]
    action: String,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let config = config::load_at(&home).context("failed to load configuration")?;
        let reports = pipeline::status(&home, &config).context("status check failed")?;

        let summary = StatusSummaryJson {
            items: reports.len(),
            pending: reports.iter().filter(|r| r.decision != "none").count(),
            conflicts: reports.iter().filter(|r| r.decision == "conflict").count(),
        };

        if self.json {
            let payload = StatusReportJson {
                summary,
                items: &reports,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_table(&reports, &summary);
        Ok(())
    }
}

fn print_table(reports: &[ItemReport], summary: &StatusSummaryJson) {
    println!(
        "savesync v{} | {} games | {} need sync | {} conflicts",
        env!("CARGO_PKG_VERSION"),
        summary.items,
        summary.pending,
        summary.conflicts,
    );

    if reports.is_empty() {
        println!("No games detected. Check `savesync scan`.");
        return;
    }

    let rows: Vec<StatusTableRow> = reports
        .iter()
        .map(|report| StatusTableRow {
            title: report.title.to_string(),
            generation: report.generation.to_string(),
            local: describe(&report.local),
            remote: report
                .remote
                .as_ref()
                .map(|meta| describe(&meta.payload()))
                .unwrap_or_else(|| "unknown".to_string()),
            action: colorize(&report.decision),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    for report in reports {
        if let Some(note) = report.note.as_ref() {
            println!("{} {}: {note}", "note".bright_black(), report.title);
        }
    }

    if summary.pending > 0 {
        println!("Run 'savesync sync --all' to reconcile.");
    }
}

fn describe(stat: &PayloadStat) -> String {
    match (stat.modified_at, stat.size) {
        (Some(at), Some(size)) => format!("{} ({size} B)", format_age(at, Utc::now())),
        _ => "absent".to_string(),
    }
}

fn colorize(decision: &str) -> String {
    match decision {
        "none" => "up to date".green().to_string(),
        "push" => "push".cyan().bold().to_string(),
        "pull" => "pull".blue().bold().to_string(),
        "conflict" => "conflict".yellow().bold().to_string(),
        other => other.red().bold().to_string(),
    }
}

/// `3m ago`, `2h ago`, `5d ago`; future timestamps read `just now`.
fn format_age(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds();
    match secs {
        s if s < 60 => "just now".to_string(),
        s if s < 3_600 => format!("{}m ago", s / 60),
        s if s < 86_400 => format!("{}h ago", s / 3_600),
        s => format!("{}d ago", s / 86_400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn ages_are_coarse() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let ago = |s: i64| format_age(now - chrono::Duration::seconds(s), now);
        assert_eq!(ago(-5), "just now");
        assert_eq!(ago(59), "just now");
        assert_eq!(ago(120), "2m ago");
        assert_eq!(ago(7_200), "2h ago");
        assert_eq!(ago(3 * 86_400), "3d ago");
    }

    #[test]
    fn absent_payload_is_described() {
        assert_eq!(describe(&PayloadStat::absent()), "absent");
    }
}
