//! Content checksums for packed archives.

use std::fs::File;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{io_err, SyncError};

/// Lowercase hex SHA-256 of `bytes`.
pub fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Lowercase hex SHA-256 of the file at `path`, streamed.
pub fn checksum_file(path: &Path) -> Result<String, SyncError> {
    let mut file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| io_err(path, e))?;
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn file_and_bytes_checksums_agree() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blob.zip");
        std::fs::write(&path, b"save data").unwrap();
        assert_eq!(checksum_file(&path).unwrap(), checksum(b"save data"));
    }

    #[test]
    fn checksum_is_lowercase_hex_sha256() {
        assert_eq!(
            checksum(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
