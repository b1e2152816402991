//! Item handles and the change notices that feed the reconcile loop.

use std::path::Path;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use savesync_core::{Generation, ItemTitle, SyncAction};
use savesync_sync::{ConflictResolver, Engine, ReplicaPair, SyncError};

/// Messages into the reconcile loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeNotice {
    /// A save file of the item changed on disk.
    Changed(ItemTitle),
    /// A client asked for the item to be reconciled.
    Requested(ItemTitle),
    /// A client asked for every item to be reconciled.
    RequestAll,
}

/// One item as tracked by the daemon: its replica pair plus cached state.
#[derive(Debug)]
pub struct ItemHandle {
    pair: ReplicaPair,
    archive_size: Option<u64>,
}

impl ItemHandle {
    pub fn new(pair: ReplicaPair) -> Self {
        Self {
            pair,
            archive_size: None,
        }
    }

    pub fn title(&self) -> &ItemTitle {
        self.pair.title()
    }

    pub fn executable(&self) -> &str {
        self.pair.local.executable()
    }

    pub fn generation(&self) -> Generation {
        self.pair.local.generation()
    }

    pub fn save_dir(&self) -> &Path {
        self.pair.local.source_dir()
    }

    /// Cached archive size, without recomputing.
    pub fn cached_archive_size(&self) -> Option<u64> {
        self.archive_size
    }

    /// Archive size of the current save directory. Repacks into the scratch
    /// archive when the cache was invalidated. Blocking.
    pub fn archive_size(&mut self) -> Result<u64, SyncError> {
        if let Some(size) = self.archive_size {
            return Ok(size);
        }
        let metadata = self.pair.local.pack()?;
        self.pair.local.discard_scratch()?;
        self.archive_size = Some(metadata.archive_size);
        Ok(metadata.archive_size)
    }

    pub fn invalidate(&mut self) {
        self.archive_size = None;
    }

    /// Decide, resolve, and execute once. Blocking.
    pub fn reconcile(
        &mut self,
        engine: &Engine,
        resolver: &dyn ConflictResolver,
    ) -> Result<SyncAction, SyncError> {
        let action = engine.action(&mut self.pair)?.resolve(resolver)?;
        if let Some(metadata) = engine.execute(&mut self.pair, action)? {
            self.archive_size = Some(metadata.archive_size);
        }
        Ok(action)
    }
}

/// Watch `dir` (non-recursively) for `.dat` writes and report them as
/// [`ChangeNotice::Changed`] for `title`. The watcher stops when dropped.
pub fn watch_item(
    title: ItemTitle,
    dir: &Path,
    notices: UnboundedSender<ChangeNotice>,
) -> Result<RecommendedWatcher, notify::Error> {
    let mut watcher = recommended_watcher(move |event: notify::Result<Event>| match event {
        Ok(event) if is_save_write(&event) => {
            let _ = notices.send(ChangeNotice::Changed(title.clone()));
        }
        Ok(_) => {}
        Err(err) => tracing::warn!(title = %title, error = %err, "watcher event error"),
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    tracing::debug!(path = %dir.display(), "watching save directory");
    Ok(watcher)
}

fn is_save_write(event: &Event) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event.paths.iter().any(|path| is_dat_file(path))
}

fn is_dat_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("dat"))
        .unwrap_or(false)
}

/// Per-item entry in the daemon status payload.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ItemStatus {
    pub title: String,
    pub generation: Generation,
    pub save_dir: String,
    pub executable: String,
    pub queued: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_action: Option<SyncAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub last_sync_at_unix: u64,
}
