//! The object-store side of an item.
//!
//! Identity resolution is split in two: [`RemoteReplica::try_resolve`] only
//! reads, [`RemoteReplica::create_if_absent`] may upload. Operations that need
//! local data borrow the item's [`LocalReplica`].

use std::fs;
use std::sync::Arc;

use savesync_core::{ItemTitle, Metadata};

use crate::error::{io_err, transfer_err, SyncError};
use crate::local::LocalReplica;
use crate::store::{ContainerId, ObjectId, ObjectStore};

pub struct RemoteReplica {
    name: String,
    container: ContainerId,
    store: Arc<dyn ObjectStore>,
    id: Option<ObjectId>,
}

impl std::fmt::Debug for RemoteReplica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteReplica")
            .field("name", &self.name)
            .field("container", &self.container)
            .field("id", &self.id)
            .finish()
    }
}

impl RemoteReplica {
    pub fn new(title: &ItemTitle, container: ContainerId, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            name: title.0.clone(),
            container,
            store,
            id: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cached_id(&self) -> Option<&ObjectId> {
        self.id.as_ref()
    }

    /// Look the object up by name. A hit is cached for the replica's lifetime;
    /// a miss is not, so a later call sees objects created elsewhere.
    pub fn try_resolve(&mut self) -> Result<Option<ObjectId>, SyncError> {
        if let Some(id) = &self.id {
            return Ok(Some(id.clone()));
        }
        let found = self.store.find_by_name(&self.name, &self.container)?;
        self.id = found.map(|object| object.id);
        Ok(self.id.clone())
    }

    /// Resolve the object, uploading a fresh pack of `local` when it does not
    /// exist yet.
    pub fn create_if_absent(&mut self, local: &LocalReplica) -> Result<ObjectId, SyncError> {
        if let Some(id) = self.try_resolve()? {
            return Ok(id);
        }
        tracing::info!("creating remote object {}", self.name);
        let metadata = local.pack()?;
        let bytes = read_scratch(local)?;
        let id = self.store.upload(
            &self.name,
            &bytes,
            &self.container,
            &encode_metadata(&metadata)?,
        )?;
        local.discard_scratch()?;
        self.id = Some(id.clone());
        Ok(id)
    }

    /// Read and decode the object's description.
    ///
    /// Missing object, missing description, and malformed description all
    /// report [`SyncError::MetadataUnavailable`].
    pub fn fetch_metadata(&mut self) -> Result<Metadata, SyncError> {
        let Some(id) = self.try_resolve()? else {
            return Err(self.unavailable("no remote object"));
        };
        match self.store.description(&id)? {
            Some(blob) => decode_metadata(&self.name, &blob),
            None => Err(self.unavailable("object has no description")),
        }
    }

    /// Pack `local` and replace the remote content and description with it.
    /// Creates the object on first use.
    pub fn push(&mut self, local: &LocalReplica) -> Result<Metadata, SyncError> {
        let Some(id) = self.try_resolve()? else {
            self.create_if_absent(local)?;
            return self.fetch_metadata();
        };
        let metadata = local.pack()?;
        let bytes = read_scratch(local)?;
        self.store
            .replace(&id, &bytes, &encode_metadata(&metadata)?)?;
        local.discard_scratch()?;
        tracing::info!("pushed {} ({} bytes)", self.name, metadata.archive_size);
        Ok(metadata)
    }

    /// Download the remote content into the scratch path and unpack it over
    /// the save directory.
    ///
    /// When the description is readable the payload file's modification time
    /// is set to the recorded one, so both sides compare as equal afterwards,
    /// and the description is returned.
    pub fn pull(&mut self, local: &LocalReplica) -> Result<Option<Metadata>, SyncError> {
        let Some(id) = self.try_resolve()? else {
            return Err(transfer_err("download", &self.name, "no remote object"));
        };
        let metadata = match self.fetch_metadata() {
            Ok(metadata) => Some(metadata),
            Err(SyncError::MetadataUnavailable { reason, .. }) => {
                tracing::warn!("pulling {} without metadata: {reason}", self.name);
                None
            }
            Err(err) => return Err(err),
        };

        let bytes = self.store.download(&id)?;
        let scratch = local.scratch_path();
        if let Some(parent) = scratch.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        fs::write(scratch, &bytes).map_err(|e| io_err(scratch, e))?;
        local.unpack()?;
        if let Some(modified_at) = metadata.as_ref().and_then(|m| m.payload_modified_at) {
            local.stamp_payload(modified_at)?;
        }
        local.discard_scratch()?;
        tracing::info!("pulled {} ({} bytes)", self.name, bytes.len());
        Ok(metadata)
    }

    fn unavailable(&self, reason: &str) -> SyncError {
        SyncError::MetadataUnavailable {
            name: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

fn read_scratch(local: &LocalReplica) -> Result<Vec<u8>, SyncError> {
    let path = local.scratch_path();
    fs::read(path).map_err(|e| io_err(path, e))
}

/// Serialize metadata as the object description.
pub fn encode_metadata(metadata: &Metadata) -> Result<String, SyncError> {
    Ok(serde_json::to_string(metadata)?)
}

/// Parse an object description. Malformed input is
/// [`SyncError::MetadataUnavailable`], not [`SyncError::Json`].
pub fn decode_metadata(name: &str, blob: &str) -> Result<Metadata, SyncError> {
    serde_json::from_str(blob).map_err(|e| SyncError::MetadataUnavailable {
        name: name.to_string(),
        reason: format!("malformed description: {e}"),
    })
}
