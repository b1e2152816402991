//! Save-directory discovery for `savesync-detector`.
//!
//! [`detect_items`] inspects the configured roots and returns one
//! [`DetectedItem`] per installed game. Two layouts are recognised:
//!
//! - old generation: saves live next to a known executable somewhere under the
//!   games directory, found by a recursive walk;
//! - new generation: saves live in `<appdata>/ShanghaiAlice/th<NN>/`, found by
//!   listing that folder.
//!
//! Discovery runs once at start-up; the result feeds Local Replica construction.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use savesync_core::{Config, Generation, ItemTitle};

/// Name of the vendor folder that holds new-generation save directories.
pub const NEW_GEN_VENDOR_DIR: &str = "ShanghaiAlice";

/// Old-generation titles and the executable that identifies each install.
pub const OLD_GEN_GAMES: &[(&str, &str)] = &[
    ("Touhou06", "東方紅魔郷.exe"),
    ("Touhou07", "th07.exe"),
    ("Touhou75", "th075.exe"),
    ("Touhou08", "th08.exe"),
    ("Touhou09", "th09.exe"),
    ("Touhou95", "th095.exe"),
    ("Touhou10", "th10.exe"),
    ("Touhou105", "th105.exe"),
    ("Touhou11", "th11.exe"),
    ("Touhou12", "th12.exe"),
];

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// One discovered item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectedItem {
    pub title: ItemTitle,
    pub generation: Generation,
    /// Directory whose contents are synchronized.
    pub save_dir: PathBuf,
    /// Executable base name without extension, used for liveness checks.
    pub executable: String,
}

/// Errors from discovery.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("games directory does not exist: {path}")]
    MissingGamesDirectory { path: PathBuf },
}

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DetectError {
    DetectError::Io {
        path: path.into(),
        source,
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Detect every item reachable from `config`, sorted by title.
///
/// A title found in both layouts keeps the new-generation entry.
pub fn detect_items(config: &Config) -> Result<Vec<DetectedItem>, DetectError> {
    let mut items = BTreeMap::new();

    if let Some(games) = config.games_directory.as_deref() {
        for item in detect_old_generation(games)? {
            items.insert(item.title.clone(), item);
        }
    }

    match config.appdata_root() {
        Some(appdata) => {
            for item in detect_new_generation(&appdata)? {
                items.insert(item.title.clone(), item);
            }
        }
        None => tracing::warn!("no application-data directory; skipping new-generation detection"),
    }

    Ok(items.into_values().collect())
}

/// Walk `games_dir` recursively for known old-generation executables.
///
/// Directories are visited in sorted order and the first match per title wins.
pub fn detect_old_generation(games_dir: &Path) -> Result<Vec<DetectedItem>, DetectError> {
    if !games_dir.is_dir() {
        return Err(DetectError::MissingGamesDirectory {
            path: games_dir.to_path_buf(),
        });
    }

    let mut found = BTreeMap::<ItemTitle, DetectedItem>::new();
    for dir in collect_dirs(games_dir)? {
        for file in sorted_entries(&dir)? {
            if !file.is_file() {
                continue;
            }
            let Some(name) = file.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(title) = old_gen_title_for_executable(name) else {
                continue;
            };
            if found.contains_key(&title) {
                continue;
            }
            tracing::info!("found {title} at {}", file.display());
            found.insert(
                title.clone(),
                DetectedItem {
                    title,
                    generation: Generation::Old,
                    save_dir: dir.clone(),
                    executable: executable_base(name).to_string(),
                },
            );
        }
    }
    Ok(found.into_values().collect())
}

/// List `<appdata>/ShanghaiAlice/th<NN>` folders as `Touhou<NN>` items.
///
/// A missing vendor folder is not an error: nothing is installed yet.
pub fn detect_new_generation(appdata: &Path) -> Result<Vec<DetectedItem>, DetectError> {
    let vendor = appdata.join(NEW_GEN_VENDOR_DIR);
    if !vendor.is_dir() {
        tracing::info!(
            "skipping new-generation detection: {} does not exist",
            vendor.display()
        );
        return Ok(Vec::new());
    }

    let mut items = Vec::new();
    for dir in sorted_entries(&vendor)? {
        if !dir.is_dir() {
            continue;
        }
        let Some(folder) = dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(title) = new_gen_title_for_folder(folder) else {
            tracing::debug!("ignoring unrecognised folder {}", dir.display());
            continue;
        };
        tracing::info!("found {title} at {}", dir.display());
        items.push(DetectedItem {
            title,
            generation: Generation::New,
            executable: folder.to_string(),
            save_dir: dir,
        });
    }
    Ok(items)
}

/// `th13` → `Touhou13`. Anything else is rejected.
pub fn new_gen_title_for_folder(folder: &str) -> Option<ItemTitle> {
    let prefix = folder.get(..2)?;
    if !prefix.eq_ignore_ascii_case("th") {
        return None;
    }
    let version = &folder[2..];
    if version.is_empty() || !version.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(ItemTitle::from(format!("Touhou{version}")))
}

/// Old-generation title for an executable file name (case-insensitive).
pub fn old_gen_title_for_executable(file_name: &str) -> Option<ItemTitle> {
    OLD_GEN_GAMES
        .iter()
        .find(|(_, exe)| exe.eq_ignore_ascii_case(file_name))
        .map(|(title, _)| ItemTitle::from(*title))
}

/// Old-generation executable base name for a title.
pub fn old_gen_executable_for_title(title: &ItemTitle) -> Option<&'static str> {
    OLD_GEN_GAMES
        .iter()
        .find(|(t, _)| *t == title.as_str())
        .map(|(_, exe)| executable_base(exe))
}

/// `th07.exe` → `th07`.
pub fn executable_base(file_name: &str) -> &str {
    file_name.split('.').next().unwrap_or(file_name)
}

// ---------------------------------------------------------------------------
// Filesystem helpers
// ---------------------------------------------------------------------------

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, DetectError> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

fn collect_dirs(root: &Path) -> Result<Vec<PathBuf>, DetectError> {
    let mut dirs = vec![root.to_path_buf()];
    let mut cursor = 0;
    while cursor < dirs.len() {
        let current = dirs[cursor].clone();
        cursor += 1;
        let entries = match fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) if err.kind() == ErrorKind::PermissionDenied => {
                tracing::warn!("cannot read {}: {err}", current.display());
                continue;
            }
            Err(err) => return Err(io_err(&current, err)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&current, e))?;
            let ty = entry.file_type().map_err(|e| io_err(entry.path(), e))?;
            if ty.is_dir() {
                dirs.push(entry.path());
            }
        }
    }
    dirs.sort();
    dirs.dedup();
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executable_base_strips_extension() {
        assert_eq!(executable_base("th07.exe"), "th07");
        assert_eq!(executable_base("東方紅魔郷.exe"), "東方紅魔郷");
        assert_eq!(executable_base("noext"), "noext");
    }

    #[test]
    fn title_lookups_are_symmetric() {
        let title = old_gen_title_for_executable("TH08.EXE").expect("title");
        assert_eq!(title, ItemTitle::from("Touhou08"));
        assert_eq!(old_gen_executable_for_title(&title), Some("th08"));
        assert!(old_gen_title_for_executable("th99.exe").is_none());
    }

    #[test]
    fn new_gen_folder_names() {
        assert_eq!(
            new_gen_title_for_folder("th13"),
            Some(ItemTitle::from("Touhou13"))
        );
        assert_eq!(
            new_gen_title_for_folder("TH185"),
            Some(ItemTitle::from("Touhou185"))
        );
        assert!(new_gen_title_for_folder("th").is_none());
        assert!(new_gen_title_for_folder("thumbs").is_none());
        assert!(new_gen_title_for_folder("東").is_none());
    }
}
