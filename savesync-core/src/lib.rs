//! Savesync core library: domain types, configuration persistence, errors.
//!
//! - [`types`]: newtypes and the shared value types compared during reconciliation
//! - [`error`]: [`ConfigError`]
//! - [`config`]: load / save / init of `~/.savesync/config.yaml`

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::ConfigError;
pub use types::{Generation, ItemTitle, Metadata, PayloadStat, SyncAction};
