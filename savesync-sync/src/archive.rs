//! Zip packing and unpacking of save directories.
//!
//! Archives are flat lists of file entries named with `/` separators relative
//! to the save directory. Unpacking overwrites existing files and refuses
//! entries that would escape the destination.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{archive_err, io_err, SyncError};

/// A file to be stored in an archive under `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub source: PathBuf,
    pub name: String,
}

/// Every regular file under `root`, named relative to `root` and prefixed
/// with `prefix` (empty for none). Sorted by name.
pub fn directory_entries(root: &Path, prefix: &str) -> Result<Vec<ArchiveEntry>, SyncError> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            io_err(path, io::Error::from(e))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let mut name = prefix.to_string();
        for (i, part) in relative.components().enumerate() {
            if i > 0 {
                name.push('/');
            }
            name.push_str(&part.as_os_str().to_string_lossy());
        }
        entries.push(ArchiveEntry {
            source: entry.path().to_path_buf(),
            name,
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Write `entries` into a fresh deflate archive at `dest`, replacing any
/// existing file. Returns the number of entries written.
pub fn pack_entries(entries: &[ArchiveEntry], dest: &Path) -> Result<usize, SyncError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let file = File::create(dest).map_err(|e| io_err(dest, e))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in entries {
        writer
            .start_file(entry.name.as_str(), options)
            .map_err(|e| archive_err(dest, e))?;
        let mut source = File::open(&entry.source).map_err(|e| io_err(&entry.source, e))?;
        io::copy(&mut source, &mut writer).map_err(|e| io_err(&entry.source, e))?;
    }
    writer.finish().map_err(|e| archive_err(dest, e))?;
    Ok(entries.len())
}

/// Extract `archive` into `dest`, creating directories as needed and
/// overwriting same-named files. Files not in the archive are left alone.
pub fn unpack_into(archive: &Path, dest: &Path) -> Result<usize, SyncError> {
    let file = File::open(archive).map_err(|e| io_err(archive, e))?;
    let mut zip = ZipArchive::new(file).map_err(|e| archive_err(archive, e))?;
    fs::create_dir_all(dest).map_err(|e| io_err(dest, e))?;

    let mut written = 0;
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(|e| archive_err(archive, e))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(SyncError::UnsafeEntry {
                archive: archive.to_path_buf(),
                name: entry.name().to_string(),
            });
        };
        let target = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| io_err(&target, e))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        let mut out = File::create(&target).map_err(|e| io_err(&target, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| io_err(&target, e))?;
        written += 1;
    }
    Ok(written)
}
