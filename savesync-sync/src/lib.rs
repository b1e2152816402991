//! # savesync-sync
//!
//! Replicas, the object-store seam, and the reconciliation engine.
//!
//! An item is a [`ReplicaPair`]: a [`LocalReplica`] (save directory plus a
//! scratch archive) and a [`RemoteReplica`] (one object in an
//! [`ObjectStore`] container). [`Engine::action`] compares the two and
//! [`Engine::execute`] applies the outcome. [`pipeline::run`] does both for
//! every detected item, once.

pub mod archive;
pub mod engine;
pub mod error;
pub mod hash;
pub mod local;
pub mod pipeline;
pub mod remote;
pub mod resolver;
pub mod store;

pub use engine::{decide, Conflict, Decision, Engine, ReplicaPair, Side, SYNC_THRESHOLD_SECONDS};
pub use error::SyncError;
pub use local::LocalReplica;
pub use remote::RemoteReplica;
pub use resolver::{ConflictResolver, Resolution};
pub use store::{ContainerId, FsObjectStore, ObjectId, ObjectStore};
