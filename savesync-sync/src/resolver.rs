//! Conflict arbitration seam.

use crate::engine::Conflict;
use crate::error::SyncError;
use savesync_core::SyncAction;

/// The user's answer to a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    KeepLocal,
    KeepRemote,
}

impl Resolution {
    pub fn action(self) -> SyncAction {
        match self {
            Resolution::KeepLocal => SyncAction::Push,
            Resolution::KeepRemote => SyncAction::Pull,
        }
    }
}

/// Supplies the final action for a [`Conflict`]. Implementations may block.
pub trait ConflictResolver: Send + Sync {
    fn resolve(&self, conflict: &Conflict) -> Result<Resolution, SyncError>;
}

impl<F> ConflictResolver for F
where
    F: Fn(&Conflict) -> Result<Resolution, SyncError> + Send + Sync,
{
    fn resolve(&self, conflict: &Conflict) -> Result<Resolution, SyncError> {
        self(conflict)
    }
}
