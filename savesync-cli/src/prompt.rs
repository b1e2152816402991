//! Terminal conflict prompt.

use dialoguer::Select;

use savesync_sync::{Conflict, ConflictResolver, Resolution, SyncError};

const CHOICES: &[&str] = &[
    "Keep local save (upload it)",
    "Keep remote save (download it)",
];

/// Asks on the terminal which side of a conflict to keep. Blocks until
/// answered; fails when no terminal is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct DialoguerResolver;

impl ConflictResolver for DialoguerResolver {
    fn resolve(&self, conflict: &Conflict) -> Result<Resolution, SyncError> {
        let choice = Select::new()
            .with_prompt(conflict.to_string())
            .items(CHOICES)
            .default(0)
            .interact()
            .map_err(|err| SyncError::Unresolved {
                title: conflict.title.to_string(),
                reason: err.to_string(),
            })?;
        Ok(resolution_for(choice))
    }
}

fn resolution_for(choice: usize) -> Resolution {
    match choice {
        0 => Resolution::KeepLocal,
        _ => Resolution::KeepRemote,
    }
}
