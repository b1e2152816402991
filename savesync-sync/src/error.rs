//! Error types for savesync-sync.

use std::path::PathBuf;

use thiserror::Error;

use savesync_core::ConfigError;

/// All errors that can arise from replica, store, and reconciliation work.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Filesystem access failed, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Packing or unpacking an archive failed.
    #[error("archive error at {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// An archive entry would be written outside the destination directory.
    #[error("archive {archive} contains unsafe entry '{name}'")]
    UnsafeEntry { archive: PathBuf, name: String },

    /// The remote description is missing or is not a serialized [`Metadata`].
    ///
    /// Callers treat this as "unknown remote state", never as "remote is empty".
    ///
    /// [`Metadata`]: savesync_core::Metadata
    #[error("remote metadata unavailable for '{name}': {reason}")]
    MetadataUnavailable { name: String, reason: String },

    /// The object store rejected or failed an operation.
    #[error("transfer failed during {operation} of '{target}': {reason}")]
    Transfer {
        operation: &'static str,
        target: String,
        reason: String,
    },

    /// Metadata JSON serialization error.
    #[error("metadata JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("detect error: {0}")]
    Detect(#[from] savesync_detector::DetectError),

    #[error("no detected item named '{title}'")]
    UnknownItem { title: String },

    /// The interactive collaborator could not supply a choice.
    #[error("conflict for '{title}' was not resolved: {reason}")]
    Unresolved { title: String, reason: String },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn archive_err(path: impl Into<PathBuf>, source: zip::result::ZipError) -> SyncError {
    SyncError::Archive {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`SyncError::Transfer`].
pub fn transfer_err(
    operation: &'static str,
    target: impl Into<String>,
    reason: impl std::fmt::Display,
) -> SyncError {
    SyncError::Transfer {
        operation,
        target: target.into(),
        reason: reason.to_string(),
    }
}
