//! Savesync configuration file.
//!
//! # Storage layout
//!
//! ```text
//! ~/.savesync/
//!   config.yaml           (mode 0600, written by `savesync init`)
//!   scratch/<title>.zip   (per-item scratch archives)
//!   run/
//!   daemon.sock
//! ```
//!
//! # API pattern
//!
//! Every function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};

pub const DEFAULT_REMOTE_FOLDER: &str = "TouhouSaveSync";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_SYNC_THRESHOLD_SECS: u64 = 60;

/// Persisted settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Root scanned recursively for old-generation game executables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub games_directory: Option<PathBuf>,
    /// Directory holding `ShanghaiAlice/`; `dirs::config_dir()` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appdata_directory: Option<PathBuf>,
    /// Root directory of the filesystem object store.
    pub remote_root: PathBuf,
    /// Container (folder) name inside the object store.
    #[serde(default = "default_remote_folder")]
    pub remote_folder: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Payload timestamps closer than this are considered equal.
    #[serde(default = "default_sync_threshold_secs")]
    pub sync_threshold_secs: u64,
}

fn default_remote_folder() -> String {
    DEFAULT_REMOTE_FOLDER.to_string()
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_sync_threshold_secs() -> u64 {
    DEFAULT_SYNC_THRESHOLD_SECS
}

impl Config {
    pub fn new(remote_root: PathBuf) -> Self {
        Self {
            games_directory: None,
            appdata_directory: None,
            remote_root,
            remote_folder: default_remote_folder(),
            poll_interval_secs: default_poll_interval_secs(),
            sync_threshold_secs: default_sync_threshold_secs(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Where new-generation save folders live, falling back to the platform
    /// application-data directory (`%APPDATA%` on Windows).
    pub fn appdata_root(&self) -> Option<PathBuf> {
        self.appdata_directory.clone().or_else(dirs::config_dir)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote_folder.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "remote_folder",
                reason: "must not be empty".to_string(),
            });
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "poll_interval_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.savesync/`
pub fn root_at(home: &Path) -> PathBuf {
    home.join(".savesync")
}

/// `<home>/.savesync/config.yaml`
pub fn config_path_at(home: &Path) -> PathBuf {
    root_at(home).join("config.yaml")
}

/// `<home>/.savesync/scratch/`
pub fn scratch_dir_at(home: &Path) -> PathBuf {
    root_at(home).join("scratch")
}

/// Scratch archive path private to one item.
pub fn scratch_archive_at(home: &Path, title: &crate::ItemTitle) -> PathBuf {
    scratch_dir_at(home).join(format!("{}.zip", title.0))
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load `<home>/.savesync/config.yaml`.
///
/// Returns `ConfigError::NotInitialized` if absent and `ConfigError::Parse`
/// if malformed.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Err(ConfigError::NotInitialized { path });
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let config: Config =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })?;
    config.validate()?;
    Ok(config)
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Config, ConfigError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save the config.
///
/// Write flow: serialize → `config.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &Config) -> Result<(), ConfigError> {
    config.validate()?;
    let root = root_at(home);
    if !root.exists() {
        std::fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
        set_dir_permissions(&root)?;
    }
    let path = config_path_at(home);
    let tmp_path = path.with_file_name("config.yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    save_at(&home()?, config)
}

// ---------------------------------------------------------------------------
// 4. Init
// ---------------------------------------------------------------------------

/// First-run setup: write a config if none exists, otherwise update the
/// fields that were supplied and keep the rest.
pub fn init_at(
    home: &Path,
    remote_root: PathBuf,
    games_directory: Option<PathBuf>,
    appdata_directory: Option<PathBuf>,
) -> Result<Config, ConfigError> {
    let mut config = match load_at(home) {
        Ok(existing) => existing,
        Err(ConfigError::NotInitialized { .. }) => Config::new(remote_root.clone()),
        Err(err) => return Err(err),
    };
    config.remote_root = remote_root;
    if games_directory.is_some() {
        config.games_directory = games_directory;
    }
    if appdata_directory.is_some() {
        config.appdata_directory = appdata_directory;
    }

    let scratch = scratch_dir_at(home);
    std::fs::create_dir_all(&scratch).map_err(|e| io_err(&scratch, e))?;
    save_at(home, &config)?;
    Ok(config)
}

/// `init_at` convenience wrapper.
pub fn init(
    remote_root: PathBuf,
    games_directory: Option<PathBuf>,
    appdata_directory: Option<PathBuf>,
) -> Result<Config, ConfigError> {
    init_at(&home()?, remote_root, games_directory, appdata_directory)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}
