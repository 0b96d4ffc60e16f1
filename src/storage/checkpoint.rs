//! Small JSON state files
//!
//! Retention floors, stream metadata and consumer group positions are kept
//! as pretty-printed JSON. Writes go to a temp file that is synced and then
//! renamed over the target, followed by a sync of the parent directory.

use crate::error::StorageError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tracing::debug;

/// Atomically replace `path` with the JSON encoding of `value`
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let data = serde_json::to_vec_pretty(value).map_err(|e| {
        StorageError::io(
            "encode checkpoint",
            path,
            io::Error::new(io::ErrorKind::InvalidData, e),
        )
    })?;

    let temp_path = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&temp_path)
            .map_err(|e| StorageError::io("create checkpoint", &temp_path, e))?;
        file.write_all(&data)
            .map_err(|e| StorageError::io("write checkpoint", &temp_path, e))?;
        file.sync_all()
            .map_err(|e| StorageError::io("sync checkpoint", &temp_path, e))?;
    }

    fs::rename(&temp_path, path).map_err(|e| StorageError::io("rename checkpoint", path, e))?;

    if let Some(parent) = path.parent() {
        let dir = fs::File::open(parent)
            .map_err(|e| StorageError::io("open checkpoint directory", parent, e))?;
        dir.sync_all()
            .map_err(|e| StorageError::io("sync checkpoint directory", parent, e))?;
    }

    debug!(path = %path.display(), bytes = data.len(), "Checkpoint written");
    Ok(())
}

/// Read a JSON file written by [`write_json`]; `None` if it does not exist
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StorageError::io("read checkpoint", path, e)),
    };
    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|e| StorageError::corrupt(path, e.column() as u64, e.to_string()))
}

/// Remove a file, treating "already gone" as success
pub fn remove_file_if_exists(path: &Path) -> Result<(), StorageError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::io("remove file", path, e)),
    }
}

/// Remove a directory tree, treating "already gone" as success
pub fn remove_dir_if_exists(path: &Path) -> Result<(), StorageError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::io("remove directory", path, e)),
    }
}
