use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use notify::RecommendedWatcher;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, RwLock};

use savesync_core::{config, ItemTitle, SyncAction};
use savesync_sync::{pipeline, ConflictResolver, Engine};

use crate::error::{io_err, DaemonError};
use crate::handle::{watch_item, ChangeNotice, ItemHandle, ItemStatus};
use crate::paths::{run_dir, scratch_dir, socket_path};
use crate::process::{ProcessProbe, SystemProcessProbe};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::queue::PendingQueue;

/// Snapshot of loop state published for the socket server.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusBoard {
    pub items: BTreeMap<String, ItemStatus>,
    pub queue: Vec<String>,
    pub last_sync_at_unix: u64,
}

pub type SharedStatus = Arc<RwLock<StatusBoard>>;

/// Result of one loop tick that reached an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub title: ItemTitle,
    pub result: Result<SyncAction, String>,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path, resolver: Arc<dyn ConflictResolver>) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), resolver))
}

/// Run the daemon runtime.
pub async fn run(home: PathBuf, resolver: Arc<dyn ConflictResolver>) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;
    let config = config::load_at(&home)?;

    let pairs = {
        let home = home.clone();
        let config = config.clone();
        tokio::task::spawn_blocking(move || pipeline::build_pairs(&home, &config))
            .await
            .map_err(|err| DaemonError::Protocol(format!("detection join error: {err}")))??
    };
    tracing::info!(items = pairs.len(), "detected items");

    let (notice_tx, notice_rx) = mpsc::unbounded_channel::<ChangeNotice>();
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    // Watchers live until `run` returns.
    let mut watchers: Vec<RecommendedWatcher> = Vec::new();
    let mut handles = Vec::new();
    for pair in pairs {
        let handle = ItemHandle::new(pair);
        match watch_item(handle.title().clone(), handle.save_dir(), notice_tx.clone()) {
            Ok(watcher) => watchers.push(watcher),
            Err(err) => tracing::warn!(
                title = %handle.title(),
                error = %err,
                "cannot watch save directory; item syncs on request only",
            ),
        }
        handles.push(handle);
    }

    let board: SharedStatus = Arc::new(RwLock::new(StatusBoard::default()));
    let started_at_unix = unix_seconds_now();
    let reconcile_loop = ReconcileLoop::new(
        handles,
        Engine::new(config.sync_threshold_secs),
        Arc::new(SystemProcessProbe),
        resolver,
        board.clone(),
    );

    let loop_handle = {
        let shutdown = shutdown_tx.clone();
        let interval = config.poll_interval();
        tokio::spawn(async move {
            let result = reconcile_loop
                .run(notice_rx, interval, shutdown.subscribe())
                .await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let board = board.clone();
        let notice_tx = notice_tx.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                home,
                board,
                notice_tx,
                shutdown.clone(),
                shutdown.subscribe(),
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (loop_result, socket_result, signal_result) =
        tokio::join!(loop_handle, socket_handle, signal_handle);
    drop(watchers);

    handle_join("reconcile_loop", loop_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Reconcile loop
// ---------------------------------------------------------------------------

/// Single owner of every item handle and of the pending-work queue.
pub struct ReconcileLoop {
    handles: BTreeMap<ItemTitle, ItemHandle>,
    queue: PendingQueue,
    engine: Engine,
    probe: Arc<dyn ProcessProbe>,
    resolver: Arc<dyn ConflictResolver>,
    board: SharedStatus,
    last: BTreeMap<ItemTitle, (Option<SyncAction>, Option<String>, u64)>,
}

impl ReconcileLoop {
    /// Build the loop with every handle queued once (initial sweep).
    pub fn new(
        handles: Vec<ItemHandle>,
        engine: Engine,
        probe: Arc<dyn ProcessProbe>,
        resolver: Arc<dyn ConflictResolver>,
        board: SharedStatus,
    ) -> Self {
        let mut queue = PendingQueue::new();
        let mut by_title = BTreeMap::new();
        for handle in handles {
            queue.push(handle.title().clone());
            by_title.insert(handle.title().clone(), handle);
        }
        Self {
            handles: by_title,
            queue,
            engine,
            probe,
            resolver,
            board,
            last: BTreeMap::new(),
        }
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    pub fn handle(&self, title: &ItemTitle) -> Option<&ItemHandle> {
        self.handles.get(title)
    }

    /// Tick on `interval` until shutdown; apply notices as they arrive.
    pub async fn run(
        mut self,
        mut notices: mpsc::UnboundedReceiver<ChangeNotice>,
        interval: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), DaemonError> {
        self.publish().await;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                notice = notices.recv() => {
                    let Some(notice) = notice else { break };
                    self.apply_notice(notice);
                    self.publish().await;
                }
                _ = ticker.tick() => {
                    while let Ok(notice) = notices.try_recv() {
                        self.apply_notice(notice);
                    }
                    self.tick().await?;
                }
            }
        }
        Ok(())
    }

    pub fn apply_notice(&mut self, notice: ChangeNotice) {
        match notice {
            ChangeNotice::Changed(title) => match self.handles.get_mut(&title) {
                Some(handle) => {
                    handle.invalidate();
                    if self.queue.push(title.clone()) {
                        tracing::info!(title = %title, "save changed; queued");
                    }
                }
                None => tracing::warn!(title = %title, "change notice for unknown item"),
            },
            ChangeNotice::Requested(title) => {
                if self.handles.contains_key(&title) {
                    self.queue.push(title);
                } else {
                    tracing::warn!(title = %title, "sync requested for unknown item");
                }
            }
            ChangeNotice::RequestAll => {
                for title in self.handles.keys() {
                    self.queue.push(title.clone());
                }
            }
        }
    }

    /// Reconcile at most one queued item whose executable is not running.
    ///
    /// Success (including "nothing to do") dequeues the item; failure is
    /// logged and leaves it queued for the next tick.
    pub async fn tick(&mut self) -> Result<Option<TickOutcome>, DaemonError> {
        let outcome = self.process_next().await?;
        self.publish().await;
        Ok(outcome)
    }

    async fn process_next(&mut self) -> Result<Option<TickOutcome>, DaemonError> {
        if self.queue.is_empty() {
            return Ok(None);
        }

        let candidates: Vec<(ItemTitle, String)> = self
            .queue
            .iter()
            .filter_map(|title| {
                self.handles
                    .get(title)
                    .map(|handle| (title.clone(), handle.executable().to_string()))
            })
            .collect();
        let probe = self.probe.clone();
        let selected = tokio::task::spawn_blocking(move || {
            candidates.into_iter().find_map(|(title, executable)| {
                if probe.is_running(&executable) {
                    tracing::debug!(title = %title, executable = %executable, "game running; skipped");
                    None
                } else {
                    Some(title)
                }
            })
        })
        .await
        .map_err(|err| DaemonError::Protocol(format!("process probe join error: {err}")))?;

        let Some(title) = selected else {
            return Ok(None);
        };
        let Some(mut handle) = self.handles.remove(&title) else {
            self.queue.remove(&title);
            return Ok(None);
        };

        let engine = self.engine;
        let resolver = self.resolver.clone();
        let (handle, result) = tokio::task::spawn_blocking(move || {
            let result = handle.reconcile(&engine, resolver.as_ref());
            (handle, result)
        })
        .await
        .map_err(|err| DaemonError::Protocol(format!("sync task join error: {err}")))?;
        self.handles.insert(title.clone(), handle);

        let now = unix_seconds_now();
        let result = match result {
            Ok(action) => {
                self.queue.remove(&title);
                tracing::info!(title = %title, action = %action, "reconciled");
                self.last.insert(title.clone(), (Some(action), None, now));
                Ok(action)
            }
            Err(err) => {
                tracing::warn!(title = %title, error = %err, "reconcile failed; retrying next tick");
                let previous = self.last.get(&title).map(|(a, _, t)| (*a, *t));
                let (action, at) = previous.unwrap_or((None, 0));
                self.last
                    .insert(title.clone(), (action, Some(err.to_string()), at));
                Err(err.to_string())
            }
        };
        Ok(Some(TickOutcome { title, result }))
    }

    async fn publish(&self) {
        let mut items = BTreeMap::new();
        for (title, handle) in &self.handles {
            let (last_action, last_error, last_sync_at_unix) =
                self.last.get(title).cloned().unwrap_or((None, None, 0));
            items.insert(
                title.0.clone(),
                ItemStatus {
                    title: title.0.clone(),
                    generation: handle.generation(),
                    save_dir: handle.save_dir().display().to_string(),
                    executable: handle.executable().to_string(),
                    queued: self.queue.contains(title),
                    archive_size: handle.cached_archive_size(),
                    last_action,
                    last_error,
                    last_sync_at_unix,
                },
            );
        }
        let last_sync_at_unix = items
            .values()
            .map(|item| item.last_sync_at_unix)
            .max()
            .unwrap_or(0);

        let mut board = self.board.write().await;
        *board = StatusBoard {
            items,
            queue: self.queue.snapshot(),
            last_sync_at_unix,
        };
    }
}

// ---------------------------------------------------------------------------
// Socket server
// ---------------------------------------------------------------------------

async fn socket_server_task(
    home: PathBuf,
    board: SharedStatus,
    notice_tx: mpsc::UnboundedSender<ChangeNotice>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "daemon listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let home = home.clone();
                let board = board.clone();
                let notice_tx = notice_tx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(
                        stream,
                        home,
                        board,
                        notice_tx,
                        shutdown_tx,
                        started_at_unix,
                    ).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    home: PathBuf,
    board: SharedStatus,
    notice_tx: mpsc::UnboundedSender<ChangeNotice>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = dispatch(&request, &home, &board, &notice_tx, &shutdown_tx, started_at_unix).await;
        write_response(&mut writer, &response).await?;
        if request.cmd == "stop" {
            break;
        }
    }

    Ok(())
}

async fn dispatch(
    request: &DaemonRequest,
    home: &Path,
    board: &SharedStatus,
    notice_tx: &mpsc::UnboundedSender<ChangeNotice>,
    shutdown_tx: &broadcast::Sender<()>,
    started_at_unix: u64,
) -> DaemonResponse {
    match request.cmd.as_str() {
        "status" => DaemonResponse::ok(build_status_payload(home, board, started_at_unix).await),
        "sync" => {
            let notice = match &request.title {
                Some(title) => {
                    if !board.read().await.items.contains_key(title) {
                        return DaemonResponse::error(format!("unknown item '{title}'"));
                    }
                    ChangeNotice::Requested(ItemTitle::from(title.as_str()))
                }
                None => ChangeNotice::RequestAll,
            };
            match notice_tx.send(notice) {
                Ok(()) => DaemonResponse::ok(json!({
                    "queued": request.title.clone().unwrap_or_else(|| "all".to_string()),
                })),
                Err(_) => DaemonResponse::error(DaemonError::ChannelClosed("notice queue").to_string()),
            }
        }
        "stop" => {
            let _ = shutdown_tx.send(());
            DaemonResponse::ok(json!({ "stopping": true }))
        }
        other => DaemonResponse::error(format!("unknown command '{other}'")),
    }
}

async fn build_status_payload(home: &Path, board: &SharedStatus, started_at_unix: u64) -> Value {
    let snapshot = board.read().await.clone();
    let items: Vec<&ItemStatus> = snapshot.items.values().collect();
    json!({
        "running": true,
        "started_at_unix": started_at_unix,
        "last_sync_at_unix": snapshot.last_sync_at_unix,
        "queue": snapshot.queue,
        "items": items,
        "socket": socket_path(home).display().to_string(),
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    for dir in [run_dir(home), scratch_dir(home)] {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
