//! `savesync scan`: list detected games.

use anyhow::{Context, Result};
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

use savesync_core::config;
use savesync_detector::detect_items;

use super::home;

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct ScanRow {
    #[tabled(rename = "title")]
    title: String,
    #[tabled(rename = "generation")]
    generation: String,
    #[tabled(rename = "executable")]
    executable: String,
    #[tabled(rename = "save directory")]
    save_dir: String,
}

impl ScanArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let config = config::load_at(&home).context("failed to load configuration")?;
        let items = detect_items(&config).context("detection failed")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&items).context("failed to serialize scan JSON")?
            );
            return Ok(());
        }

        if items.is_empty() {
            println!("No games detected.");
            return Ok(());
        }

        let rows: Vec<ScanRow> = items
            .into_iter()
            .map(|item| ScanRow {
                title: item.title.0,
                generation: item.generation.to_string(),
                executable: item.executable,
                save_dir: item.save_dir.display().to_string(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}
