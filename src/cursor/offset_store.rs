//! Position storage for consumer groups
//!
//! Each group is one JSON file at `<data_dir>/groups/<stream_id>/<group>.json`.

use super::group::ConsumerGroup;
use crate::error::StorageError;
use crate::storage::checkpoint::{read_json, remove_dir_if_exists, remove_file_if_exists, write_json};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Group position store; a no-op when running in memory
#[derive(Debug, Clone)]
pub struct GroupStore {
    base_path: Option<PathBuf>,
}

impl GroupStore {
    pub fn new(data_dir: Option<&Path>) -> Self {
        Self {
            base_path: data_dir.map(|d| d.join("groups")),
        }
    }

    fn stream_dir(&self, stream_id: &str) -> Option<PathBuf> {
        self.base_path.as_ref().map(|base| base.join(stream_id))
    }

    fn group_path(&self, stream_id: &str, group: &str) -> Option<PathBuf> {
        self.stream_dir(stream_id)
            .map(|dir| dir.join(format!("{}.json", group)))
    }

    /// Save a group
    pub fn save(&self, group: &ConsumerGroup) -> Result<(), StorageError> {
        let (Some(dir), Some(path)) = (
            self.stream_dir(&group.stream_id),
            self.group_path(&group.stream_id, &group.name),
        ) else {
            return Ok(());
        };
        fs::create_dir_all(&dir).map_err(|e| StorageError::io("create directory", &dir, e))?;
        write_json(&path, group)?;
        debug!(stream = %group.stream_id, group = %group.name, cursors = group.cursors.len(), "Saved group");
        Ok(())
    }

    /// Delete a group
    pub fn delete(&self, stream_id: &str, group: &str) -> Result<(), StorageError> {
        if let Some(path) = self.group_path(stream_id, group) {
            remove_file_if_exists(&path)?;
            debug!(stream = %stream_id, group = %group, "Deleted group data");
        }
        Ok(())
    }

    /// Delete every group of a stream
    pub fn delete_stream(&self, stream_id: &str) -> Result<(), StorageError> {
        if let Some(dir) = self.stream_dir(stream_id) {
            remove_dir_if_exists(&dir)?;
        }
        Ok(())
    }

    /// Load all groups of all streams
    pub fn load_all(&self) -> Result<Vec<ConsumerGroup>, StorageError> {
        let Some(base) = self.base_path.as_deref() else {
            return Ok(Vec::new());
        };
        if !base.exists() {
            return Ok(Vec::new());
        }

        let mut groups = Vec::new();
        for stream_dir in read_dir_paths(base)? {
            if !stream_dir.is_dir() {
                continue;
            }
            for path in read_dir_paths(&stream_dir)? {
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                match read_json::<ConsumerGroup>(&path) {
                    Ok(Some(group)) => groups.push(group),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping unreadable group file");
                    }
                }
            }
        }

        debug!(groups = groups.len(), "Loaded groups");
        Ok(groups)
    }
}

fn read_dir_paths(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
    let entries = fs::read_dir(dir).map_err(|e| StorageError::io("list directory", dir, e))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StorageError::io("list directory", dir, e))?;
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = GroupStore::new(Some(dir.path()));

        let mut a = ConsumerGroup::new("s-1", "alpha", 0);
        a.reset("i", 0, 4, true, 0);
        let b = ConsumerGroup::new("s-2", "beta", 0);
        store.save(&a).unwrap();
        store.save(&b).unwrap();

        let mut loaded = store.load_all().unwrap();
        loaded.sort_by(|x, y| x.name.cmp(&y.name));
        assert_eq!(loaded, vec![a.clone(), b.clone()]);

        store.delete("s-1", "alpha").unwrap();
        store.delete_stream("s-2").unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_memory_store_is_noop() {
        let store = GroupStore::new(None);
        store.save(&ConsumerGroup::new("s", "g", 0)).unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }
}
