//! Shared reconcile pipeline used by the CLI and the daemon.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use savesync_core::{config, Config, Generation, ItemTitle, Metadata, PayloadStat, SyncAction};
use savesync_detector::DetectedItem;

use crate::engine::{Conflict, Decision, Engine, RemoteState, ReplicaPair};
use crate::local::LocalReplica;
use crate::remote::RemoteReplica;
use crate::resolver::ConflictResolver;
use crate::store::{ensure_container, ContainerId, FsObjectStore, ObjectStore};
use crate::SyncError;

/// Scope for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncScope {
    /// Every detected item.
    All,
    /// A single item by title.
    Item(ItemTitle),
}

/// Outcome for one item of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileResult {
    Applied {
        title: ItemTitle,
        action: SyncAction,
        conflict: bool,
    },
    WouldApply {
        title: ItemTitle,
        action: SyncAction,
    },
    WouldConflict {
        title: ItemTitle,
        conflict: Conflict,
    },
    Failed {
        title: ItemTitle,
        error: String,
    },
}

impl ReconcileResult {
    pub fn title(&self) -> &ItemTitle {
        match self {
            ReconcileResult::Applied { title, .. }
            | ReconcileResult::WouldApply { title, .. }
            | ReconcileResult::WouldConflict { title, .. }
            | ReconcileResult::Failed { title, .. } => title,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ReconcileResult::Failed { .. })
    }
}

/// The configured object store and its container, created when missing.
pub fn open_store(config: &Config) -> Result<(Arc<dyn ObjectStore>, ContainerId), SyncError> {
    let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(&config.remote_root));
    let container = ensure_container(store.as_ref(), &config.remote_folder)?;
    Ok((store, container))
}

/// Build the replica pair for one detected item.
pub fn build_pair(
    home: &Path,
    item: &DetectedItem,
    store: Arc<dyn ObjectStore>,
    container: ContainerId,
) -> Result<ReplicaPair, SyncError> {
    let local = LocalReplica::new(
        item.title.clone(),
        item.generation,
        item.save_dir.clone(),
        config::scratch_archive_at(home, &item.title),
        item.executable.clone(),
    )?;
    let remote = RemoteReplica::new(&item.title, container, store);
    Ok(ReplicaPair { local, remote })
}

/// Detect items and build a replica pair for each, sorted by title.
pub fn build_pairs(home: &Path, config: &Config) -> Result<Vec<ReplicaPair>, SyncError> {
    let items = savesync_detector::detect_items(config)?;
    let (store, container) = open_store(config)?;
    items
        .iter()
        .map(|item| build_pair(home, item, store.clone(), container.clone()))
        .collect()
}

/// Reconcile every pair in `scope` once.
///
/// With `dry_run` nothing is transferred and conflicts are reported instead of
/// resolved. A failing item is reported and does not stop the others.
pub fn run(
    home: &Path,
    config: &Config,
    scope: SyncScope,
    resolver: &dyn ConflictResolver,
    dry_run: bool,
) -> Result<Vec<ReconcileResult>, SyncError> {
    let mut pairs = select(build_pairs(home, config)?, &scope)?;
    let engine = Engine::new(config.sync_threshold_secs);
    Ok(pairs
        .iter_mut()
        .map(|pair| reconcile_one(&engine, pair, resolver, dry_run))
        .collect())
}

/// Reconcile a single pair, folding errors into [`ReconcileResult::Failed`].
pub fn reconcile_one(
    engine: &Engine,
    pair: &mut ReplicaPair,
    resolver: &dyn ConflictResolver,
    dry_run: bool,
) -> ReconcileResult {
    let title = pair.title().clone();
    match try_reconcile(engine, pair, resolver, dry_run) {
        Ok(result) => result,
        Err(err) => {
            tracing::warn!("sync of {title} failed: {err}");
            ReconcileResult::Failed {
                title,
                error: err.to_string(),
            }
        }
    }
}

fn try_reconcile(
    engine: &Engine,
    pair: &mut ReplicaPair,
    resolver: &dyn ConflictResolver,
    dry_run: bool,
) -> Result<ReconcileResult, SyncError> {
    let title = pair.title().clone();
    let decision = engine.action(pair)?;

    if dry_run {
        return Ok(match decision {
            Decision::Conflict(conflict) => ReconcileResult::WouldConflict { title, conflict },
            other => ReconcileResult::WouldApply {
                title,
                action: other.settled().unwrap_or(SyncAction::None),
            },
        });
    }

    let conflict = decision.is_conflict();
    let action = decision.resolve(resolver)?;
    engine.execute(pair, action)?;
    tracing::info!("{title}: {action}");
    Ok(ReconcileResult::Applied {
        title,
        action,
        conflict,
    })
}

fn select(pairs: Vec<ReplicaPair>, scope: &SyncScope) -> Result<Vec<ReplicaPair>, SyncError> {
    match scope {
        SyncScope::All => Ok(pairs),
        SyncScope::Item(title) => {
            let selected: Vec<_> = pairs.into_iter().filter(|p| p.title() == title).collect();
            if selected.is_empty() {
                return Err(SyncError::UnknownItem {
                    title: title.to_string(),
                });
            }
            Ok(selected)
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// What `status` shows for one item. Produced without any transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    pub title: ItemTitle,
    pub generation: Generation,
    pub save_dir: std::path::PathBuf,
    pub local: PayloadStat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<Metadata>,
    /// `push`, `pull`, `none`, `conflict`, or `error`.
    pub decision: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Observe every detected item without transferring anything.
pub fn status(home: &Path, config: &Config) -> Result<Vec<ItemReport>, SyncError> {
    let engine = Engine::new(config.sync_threshold_secs);
    let mut reports = Vec::new();
    for mut pair in build_pairs(home, config)? {
        reports.push(report(&engine, &mut pair));
    }
    Ok(reports)
}

pub fn report(engine: &Engine, pair: &mut ReplicaPair) -> ItemReport {
    let title = pair.title().clone();
    let generation = pair.local.generation();
    let save_dir = pair.local.source_dir().to_path_buf();
    match engine.observe(pair) {
        Ok(observation) => {
            let note = match &observation.remote {
                RemoteState::Unavailable(reason) => Some(reason.clone()),
                RemoteState::Known(_) => None,
            };
            ItemReport {
                title,
                generation,
                save_dir,
                local: observation.local,
                remote: observation.remote.metadata().cloned(),
                decision: observation.decision.to_string(),
                note,
            }
        }
        Err(err) => ItemReport {
            title,
            generation,
            save_dir,
            local: pair.local.payload().unwrap_or_default(),
            remote: None,
            decision: "error".to_string(),
            note: Some(err.to_string()),
        },
    }
}
