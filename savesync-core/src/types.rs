//! Domain types shared by every savesync crate.
//!
//! All path fields use `PathBuf`; timestamps are `DateTime<Utc>`.
//! [`Metadata`] is the only value that crosses the local/remote boundary.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Stable key of a synchronized item (e.g. `Touhou13`).
///
/// Also used verbatim as the remote object name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemTitle(pub String);

impl ItemTitle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ItemTitle {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ItemTitle {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// On-disk layout family of an item.
///
/// `Old` games keep saves next to the executable and only a few files are
/// synchronized. `New` games keep a dedicated save directory under the user's
/// application-data folder, whose location is predicted rather than observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Generation {
    Old,
    New,
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Generation::Old => write!(f, "old"),
            Generation::New => write!(f, "new"),
        }
    }
}

/// Outcome of reconciliation for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    /// Local copy wins; replace the remote object.
    Push,
    /// Remote copy wins; overwrite the local directory.
    Pull,
    /// Both sides are equivalent.
    None,
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncAction::Push => write!(f, "push"),
            SyncAction::Pull => write!(f, "pull"),
            SyncAction::None => write!(f, "none"),
        }
    }
}

// ---------------------------------------------------------------------------
// Payload + metadata
// ---------------------------------------------------------------------------

/// Freshness and size of an item's authoritative data file.
///
/// Both fields are `None` when no such file exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PayloadStat {
    pub modified_at: Option<DateTime<Utc>>,
    pub size: Option<u64>,
}

impl PayloadStat {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn is_absent(&self) -> bool {
        self.modified_at.is_none()
    }

    /// Modification time used for comparisons. An absent file compares as
    /// one second before the Unix epoch, i.e. older than any real file.
    pub fn effective_modified_at(&self) -> DateTime<Utc> {
        self.modified_at.unwrap_or_else(absent_timestamp)
    }

    /// Size used for comparisons. An absent file compares as `-1`.
    pub fn effective_size(&self) -> i128 {
        self.size.map(i128::from).unwrap_or(-1)
    }
}

fn absent_timestamp() -> DateTime<Utc> {
    Utc.timestamp_opt(-1, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// State of a synchronized item, produced whenever a Local Replica packs
/// itself and persisted as the remote object's description.
///
/// `payload_modified_at` is the authoritative data file's last-write time and
/// is the field compared for staleness; archive fields describe the packed
/// blob only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub checksum: String,
    pub archive_modified_at: DateTime<Utc>,
    pub archive_size: u64,
    pub payload_modified_at: Option<DateTime<Utc>>,
    pub payload_size: Option<u64>,
}

impl Metadata {
    pub fn payload(&self) -> PayloadStat {
        PayloadStat {
            modified_at: self.payload_modified_at,
            size: self.payload_size,
        }
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "checksum: {} | archive modified: {} | payload modified: {}",
            self.checksum,
            self.archive_modified_at.to_rfc3339(),
            self.payload_modified_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "absent".to_string()),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
