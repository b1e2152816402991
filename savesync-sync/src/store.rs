//! Remote object store seam.
//!
//! [`ObjectStore`] is the narrow capability the remote replica needs: find or
//! create a container, find an object by name, upload/replace bytes together
//! with a metadata description, and read both back. [`FsObjectStore`] backs it
//! with a directory tree (a mounted or synced drive folder):
//!
//! ```text
//! <root>/<container>/<name>.zip    object bytes
//! <root>/<container>/<name>.meta   description (metadata JSON)
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{io_err, transfer_err, SyncError};

/// Opaque handle to a container (folder).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(pub String);

/// Opaque handle to a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectId(pub String);

/// An object found by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub id: ObjectId,
    pub name: String,
}

pub trait ObjectStore: Send + Sync {
    fn find_container(&self, name: &str) -> Result<Option<ContainerId>, SyncError>;

    fn create_container(&self, name: &str) -> Result<ContainerId, SyncError>;

    fn find_by_name(
        &self,
        name: &str,
        container: &ContainerId,
    ) -> Result<Option<ObjectRef>, SyncError>;

    /// Create a new object. Fails if `name` already exists in `container`.
    fn upload(
        &self,
        name: &str,
        bytes: &[u8],
        container: &ContainerId,
        description: &str,
    ) -> Result<ObjectId, SyncError>;

    /// Replace content and description of an existing object.
    fn replace(&self, id: &ObjectId, bytes: &[u8], description: &str) -> Result<(), SyncError>;

    fn download(&self, id: &ObjectId) -> Result<Vec<u8>, SyncError>;

    /// The object's description, `None` when it has none.
    fn description(&self, id: &ObjectId) -> Result<Option<String>, SyncError>;
}

/// Find the container called `name`, creating it when absent.
pub fn ensure_container(store: &dyn ObjectStore, name: &str) -> Result<ContainerId, SyncError> {
    match store.find_container(name)? {
        Some(id) => Ok(id),
        None => {
            tracing::info!("creating remote container {name}");
            store.create_container(name)
        }
    }
}

// ---------------------------------------------------------------------------
// Filesystem store
// ---------------------------------------------------------------------------

const OBJECT_EXT: &str = "zip";
const DESCRIPTION_EXT: &str = "meta";

/// Directory-backed [`ObjectStore`]. Object ids are `<container>/<name>`.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn container_dir(&self, container: &ContainerId) -> PathBuf {
        self.root.join(&container.0)
    }

    fn object_paths(&self, id: &ObjectId) -> Result<(PathBuf, PathBuf), SyncError> {
        let Some((container, name)) = id.0.split_once('/') else {
            return Err(transfer_err("resolve", &id.0, "malformed object id"));
        };
        check_name(container)?;
        check_name(name)?;
        let dir = self.root.join(container);
        Ok((
            dir.join(format!("{name}.{OBJECT_EXT}")),
            dir.join(format!("{name}.{DESCRIPTION_EXT}")),
        ))
    }
}

impl ObjectStore for FsObjectStore {
    fn find_container(&self, name: &str) -> Result<Option<ContainerId>, SyncError> {
        check_name(name)?;
        let dir = self.root.join(name);
        Ok(dir.is_dir().then(|| ContainerId(name.to_string())))
    }

    fn create_container(&self, name: &str) -> Result<ContainerId, SyncError> {
        check_name(name)?;
        let dir = self.root.join(name);
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        Ok(ContainerId(name.to_string()))
    }

    fn find_by_name(
        &self,
        name: &str,
        container: &ContainerId,
    ) -> Result<Option<ObjectRef>, SyncError> {
        check_name(name)?;
        let path = self
            .container_dir(container)
            .join(format!("{name}.{OBJECT_EXT}"));
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(ObjectRef {
            id: ObjectId(format!("{}/{name}", container.0)),
            name: name.to_string(),
        }))
    }

    fn upload(
        &self,
        name: &str,
        bytes: &[u8],
        container: &ContainerId,
        description: &str,
    ) -> Result<ObjectId, SyncError> {
        check_name(name)?;
        let id = ObjectId(format!("{}/{name}", container.0));
        let (object, meta) = self.object_paths(&id)?;
        if !self.container_dir(container).is_dir() {
            return Err(transfer_err("upload", name, "container does not exist"));
        }
        if object.exists() {
            return Err(transfer_err("upload", name, "object already exists"));
        }
        write_atomic(&meta, description.as_bytes())?;
        write_atomic(&object, bytes)?;
        Ok(id)
    }

    fn replace(&self, id: &ObjectId, bytes: &[u8], description: &str) -> Result<(), SyncError> {
        let (object, meta) = self.object_paths(id)?;
        if !object.is_file() {
            return Err(transfer_err("replace", &id.0, "object does not exist"));
        }
        write_atomic(&object, bytes)?;
        write_atomic(&meta, description.as_bytes())
    }

    fn download(&self, id: &ObjectId) -> Result<Vec<u8>, SyncError> {
        let (object, _) = self.object_paths(id)?;
        fs::read(&object).map_err(|e| match e.kind() {
            ErrorKind::NotFound => transfer_err("download", &id.0, "object does not exist"),
            _ => io_err(&object, e),
        })
    }

    fn description(&self, id: &ObjectId) -> Result<Option<String>, SyncError> {
        let (_, meta) = self.object_paths(id)?;
        match fs::read_to_string(&meta) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_err(&meta, err)),
        }
    }
}

fn check_name(name: &str) -> Result<(), SyncError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
    {
        return Err(transfer_err("resolve", name, "invalid object or container name"));
    }
    Ok(())
}

/// Write via a `.tmp` sibling and rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SyncError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).map_err(|e| io_err(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| io_err(path, e))
}
