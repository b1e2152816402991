//! The on-disk side of an item: its save directory plus a private scratch
//! archive path.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use savesync_core::{Generation, ItemTitle, Metadata, PayloadStat};

use crate::archive::{self, ArchiveEntry};
use crate::error::{io_err, SyncError};
use crate::hash;

#[derive(Debug, Clone)]
pub struct LocalReplica {
    title: ItemTitle,
    generation: Generation,
    source_dir: PathBuf,
    scratch_path: PathBuf,
    executable: String,
}

impl LocalReplica {
    /// Build a replica. New-generation save directories are created when
    /// missing because their location is predicted rather than observed.
    pub fn new(
        title: ItemTitle,
        generation: Generation,
        source_dir: PathBuf,
        scratch_path: PathBuf,
        executable: impl Into<String>,
    ) -> Result<Self, SyncError> {
        if generation == Generation::New && !source_dir.exists() {
            tracing::info!("creating save directory {}", source_dir.display());
            fs::create_dir_all(&source_dir).map_err(|e| io_err(&source_dir, e))?;
        }
        Ok(Self {
            title,
            generation,
            source_dir,
            scratch_path,
            executable: executable.into(),
        })
    }

    pub fn title(&self) -> &ItemTitle {
        &self.title
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn scratch_path(&self) -> &Path {
        &self.scratch_path
    }

    /// Executable base name used to check whether the game is running.
    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// Pack the synchronized files into the scratch archive and describe it.
    ///
    /// Any stale scratch archive is removed first.
    pub fn pack(&self) -> Result<Metadata, SyncError> {
        self.discard_scratch()?;
        let entries = self.archive_entries()?;
        let count = archive::pack_entries(&entries, &self.scratch_path)?;

        let stat = fs::metadata(&self.scratch_path).map_err(|e| io_err(&self.scratch_path, e))?;
        let archive_modified_at = stat
            .modified()
            .map(DateTime::<Utc>::from)
            .map_err(|e| io_err(&self.scratch_path, e))?;
        let payload = self.payload()?;
        let metadata = Metadata {
            checksum: hash::checksum_file(&self.scratch_path)?,
            archive_modified_at,
            archive_size: stat.len(),
            payload_modified_at: payload.modified_at,
            payload_size: payload.size,
        };
        tracing::debug!(
            "packed {} ({count} entries, {} bytes)",
            self.title,
            metadata.archive_size
        );
        Ok(metadata)
    }

    /// Extract the scratch archive over the save directory.
    pub fn unpack(&self) -> Result<(), SyncError> {
        let count = archive::unpack_into(&self.scratch_path, &self.source_dir)?;
        tracing::debug!("unpacked {} ({count} files)", self.title);
        Ok(())
    }

    /// The authoritative data file: the first `*.dat` in the save directory
    /// whose name starts with `score`, by sorted file name.
    pub fn payload_path(&self) -> Result<Option<PathBuf>, SyncError> {
        let entries = match fs::read_dir(&self.source_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_err(&self.source_dir, err)),
        };
        let mut candidates = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&self.source_dir, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let lower = name.to_ascii_lowercase();
            if lower.starts_with("score") && lower.ends_with(".dat") {
                candidates.push(path);
            }
        }
        candidates.sort();
        Ok(candidates.into_iter().next())
    }

    pub fn payload_modified_at(&self) -> Result<Option<DateTime<Utc>>, SyncError> {
        Ok(self.payload()?.modified_at)
    }

    pub fn payload_size(&self) -> Result<Option<u64>, SyncError> {
        Ok(self.payload()?.size)
    }

    /// Modification time and size of the payload file, absent when none.
    pub fn payload(&self) -> Result<PayloadStat, SyncError> {
        let Some(path) = self.payload_path()? else {
            return Ok(PayloadStat::absent());
        };
        let meta = fs::metadata(&path).map_err(|e| io_err(&path, e))?;
        let modified = meta.modified().map_err(|e| io_err(&path, e))?;
        Ok(PayloadStat {
            modified_at: Some(DateTime::<Utc>::from(modified)),
            size: Some(meta.len()),
        })
    }

    /// Set the payload file's modification time, used after a pull so the
    /// local copy reports the same freshness as the remote metadata.
    pub fn stamp_payload(&self, modified_at: DateTime<Utc>) -> Result<(), SyncError> {
        let Some(path) = self.payload_path()? else {
            return Ok(());
        };
        let file = fs::File::options()
            .write(true)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;
        file.set_modified(modified_at.into())
            .map_err(|e| io_err(&path, e))
    }

    /// Remove the scratch archive if it exists.
    pub fn discard_scratch(&self) -> Result<(), SyncError> {
        match fs::remove_file(&self.scratch_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_err(&self.scratch_path, err)),
        }
    }

    /// Files that make up the item for its generation.
    ///
    /// Old generation: `<exe>.cfg`, `score.dat` (falling back to
    /// `score<exe>.dat`), and the `replay/` tree. New generation: the whole
    /// save directory.
    fn archive_entries(&self) -> Result<Vec<ArchiveEntry>, SyncError> {
        if !self.source_dir.is_dir() {
            return Err(io_err(
                &self.source_dir,
                std::io::Error::new(ErrorKind::NotFound, "save directory does not exist"),
            ));
        }
        match self.generation {
            Generation::New => archive::directory_entries(&self.source_dir, ""),
            Generation::Old => {
                let mut entries = Vec::new();
                let cfg = format!("{}.cfg", self.executable);
                self.push_if_file(&mut entries, &cfg);

                let exe_score = format!("score{}.dat", self.executable);
                if !self.push_if_file(&mut entries, "score.dat") {
                    self.push_if_file(&mut entries, &exe_score);
                }

                let replay = self.source_dir.join("replay");
                if replay.is_dir() {
                    entries.extend(archive::directory_entries(&replay, "replay/")?);
                }
                Ok(entries)
            }
        }
    }

    fn push_if_file(&self, entries: &mut Vec<ArchiveEntry>, name: &str) -> bool {
        let path = self.source_dir.join(name);
        if !path.is_file() {
            return false;
        }
        entries.push(ArchiveEntry {
            source: path,
            name: name.to_string(),
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn old_replica(dir: &Path, scratch: &Path) -> LocalReplica {
        LocalReplica::new(
            ItemTitle::from("Touhou07"),
            Generation::Old,
            dir.to_path_buf(),
            scratch.join("Touhou07.zip"),
            "th07",
        )
        .unwrap()
    }

    #[test]
    fn new_generation_dir_is_created() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("ShanghaiAlice/th13");
        LocalReplica::new(
            ItemTitle::from("Touhou13"),
            Generation::New,
            dir.clone(),
            tmp.path().join("scratch/Touhou13.zip"),
            "th13",
        )
        .unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn payload_is_first_score_dat_by_name() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("scoreth07.dat"), b"b").unwrap();
        fs::write(tmp.path().join("score.dat"), b"a").unwrap();
        fs::write(tmp.path().join("other.dat"), b"c").unwrap();
        let local = old_replica(tmp.path(), tmp.path());
        assert_eq!(
            local.payload_path().unwrap(),
            Some(tmp.path().join("score.dat"))
        );
        assert_eq!(local.payload_size().unwrap(), Some(1));
    }

    #[test]
    fn missing_payload_is_absent() {
        let tmp = TempDir::new().unwrap();
        let local = old_replica(tmp.path(), tmp.path());
        assert!(local.payload().unwrap().is_absent());
        assert_eq!(local.payload_modified_at().unwrap(), None);
    }

    #[test]
    fn old_generation_packs_only_known_files() {
        let game = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        fs::write(game.path().join("th07.cfg"), b"cfg").unwrap();
        fs::write(game.path().join("scoreth07.dat"), b"score").unwrap();
        fs::write(game.path().join("th07.exe"), b"binary").unwrap();
        fs::create_dir_all(game.path().join("replay")).unwrap();
        fs::write(game.path().join("replay/th7_01.rpy"), b"r").unwrap();

        let local = old_replica(game.path(), scratch.path());
        let names: Vec<_> = local
            .archive_entries()
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["th07.cfg", "scoreth07.dat", "replay/th7_01.rpy"]);
    }

    #[test]
    fn pack_describes_archive_and_payload() {
        let game = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        fs::write(game.path().join("score.dat"), b"12345").unwrap();
        let local = old_replica(game.path(), scratch.path());

        let meta = local.pack().unwrap();
        assert_eq!(meta.payload_size, Some(5));
        assert_eq!(meta.archive_size, fs::metadata(local.scratch_path()).unwrap().len());
        assert_eq!(meta.checksum, hash::checksum_file(local.scratch_path()).unwrap());

        local.discard_scratch().unwrap();
        assert!(!local.scratch_path().exists());
        local.discard_scratch().unwrap();
    }

    #[test]
    fn pack_of_missing_old_directory_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let local = old_replica(&tmp.path().join("gone"), tmp.path());
        assert!(matches!(local.pack(), Err(SyncError::Io { .. })));
    }
}
