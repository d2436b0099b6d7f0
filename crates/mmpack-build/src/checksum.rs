//! SHA-256 helpers.

use mmpack_core::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Hex SHA-256 of a byte string.
pub fn sha256_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hex SHA-256 of a file's content.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).map_err(|e| Error::io("failed to open file for checksum", path, e))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| Error::io("failed to read file for checksum", path, e))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Checksum entry of an installed file: its content hash, or `sym:<target>`
/// for a symbolic link.
pub fn file_entry_checksum(path: &Path) -> Result<String> {
    let meta = std::fs::symlink_metadata(path)
        .map_err(|e| Error::io("failed to stat file", path, e))?;
    if meta.file_type().is_symlink() {
        let target = std::fs::read_link(path)
            .map_err(|e| Error::io("failed to read symlink", path, e))?;
        return Ok(format!("sym:{}", target.display()));
    }
    sha256_file(path)
}
