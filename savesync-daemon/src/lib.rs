//! savesync daemon: save-directory watchers, the reconcile loop, and a
//! control socket.
//!
//! Watchers send [`ChangeNotice`]s into an unbounded channel whose only
//! consumer is the [`ReconcileLoop`]; the loop owns every [`ItemHandle`] and
//! the [`PendingQueue`], so no state is shared with watcher threads.

mod error;
pub mod handle;
pub mod paths;
pub mod process;
pub mod protocol;
pub mod queue;
mod runtime;

pub use error::DaemonError;
pub use handle::{ChangeNotice, ItemHandle, ItemStatus};
pub use process::{ProcessProbe, SystemProcessProbe};
pub use protocol::{
    request_status, request_stop, request_sync, send_request, DaemonRequest, DaemonResponse,
};
pub use queue::PendingQueue;
pub use runtime::{run, start_blocking, ReconcileLoop, SharedStatus, StatusBoard, TickOutcome};
