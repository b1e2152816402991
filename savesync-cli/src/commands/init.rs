//! `savesync init --remote-root <path> [--games-dir <path>] [--appdata-dir <path>]`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use savesync_core::config;

use super::home;

/// Write or update the savesync configuration.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory backing the shared store (e.g. a synced drive folder).
    #[arg(long, value_name = "PATH")]
    pub remote_root: PathBuf,

    /// Directory searched recursively for older games' executables.
    #[arg(long = "games-dir", value_name = "PATH")]
    pub games_dir: Option<PathBuf>,

    /// Directory holding `ShanghaiAlice/` (defaults to the platform app-data dir).
    #[arg(long = "appdata-dir", value_name = "PATH")]
    pub appdata_dir: Option<PathBuf>,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let cwd = std::env::current_dir().context("cannot read current directory")?;

        if let Some(games) = self.games_dir.as_ref() {
            anyhow::ensure!(
                games.is_dir(),
                "games directory '{}' does not exist",
                games.display()
            );
        }

        let remote_root = absolute(&cwd, &self.remote_root);
        let config = config::init_at(
            &home,
            remote_root.clone(),
            self.games_dir.map(|p| absolute(&cwd, &p)),
            self.appdata_dir.map(|p| absolute(&cwd, &p)),
        )
        .context("failed to write configuration")?;

        println!("✓ Configuration saved to {}", config::config_path_at(&home).display());
        println!("  Remote: {}/{}", remote_root.display(), config.remote_folder);
        if let Some(games) = config.games_directory.as_ref() {
            println!("  Games:  {}", games.display());
        }
        match config.appdata_root() {
            Some(appdata) => println!("  AppData: {}", appdata.display()),
            None => println!("  AppData: (none found)"),
        }
        Ok(())
    }
}

fn absolute(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}
