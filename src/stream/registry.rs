//! Stream registry
//!
//! Owns every live stream. Names are unique per compartment. With a data
//! directory each stream lives under `<data_dir>/streams/<id>/`:
//!
//! ```text
//! streams/<id>/
//! ├── stream.json         # name, compartment, partitions, retention, state
//! ├── partition-0/
//! │   ├── retention.json
//! │   └── 00000000000000000000.segment
//! └── partition-1/...
//! ```

use super::{validate_stream_name, Stream, StreamMetadata, StreamState};
use crate::clock::SharedClock;
use crate::config::{RetentionConfig, StorageConfig, DEFAULT_COMPARTMENT};
use crate::error::{BrookError, Result, StorageError};
use crate::storage::checkpoint::{read_json, remove_dir_if_exists, write_json};
use crate::storage::{PartitionLog, RetryPolicy};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const STREAM_METADATA_FILE: &str = "stream.json";

/// Parameters for a new stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateStreamDetails {
    pub name: String,
    pub partitions: u32,
    /// `None` uses the configured default
    #[serde(default)]
    pub retention_hours: Option<u32>,
    #[serde(default = "default_compartment")]
    pub compartment_id: String,
}

fn default_compartment() -> String {
    DEFAULT_COMPARTMENT.to_string()
}

impl CreateStreamDetails {
    pub fn new(name: impl Into<String>, partitions: u32) -> Self {
        Self {
            name: name.into(),
            partitions,
            retention_hours: None,
            compartment_id: default_compartment(),
        }
    }

    pub fn with_retention_hours(mut self, hours: u32) -> Self {
        self.retention_hours = Some(hours);
        self
    }

    pub fn in_compartment(mut self, compartment_id: impl Into<String>) -> Self {
        self.compartment_id = compartment_id.into();
        self
    }
}

/// Filter for [`StreamRegistry::list`]; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamFilter {
    pub compartment_id: Option<String>,
    pub name: Option<String>,
    pub state: Option<StreamState>,
}

impl StreamFilter {
    fn matches(&self, stream: &Stream) -> bool {
        self.compartment_id
            .as_deref()
            .map_or(true, |c| c == stream.compartment_id())
            && self.name.as_deref().map_or(true, |n| n == stream.name())
            && self.state.map_or(true, |s| s == stream.state())
    }
}

/// Outcome of loading streams from disk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Streams loaded as ACTIVE
    pub loaded: Vec<String>,
    /// Streams found mid-deletion whose removal was completed
    pub completed_deletions: Vec<String>,
    /// Streams found mid-creation that were discarded
    pub abandoned_creations: Vec<String>,
}

/// On-disk form of a stream's metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StreamRecord {
    id: String,
    name: String,
    compartment_id: String,
    partitions: u32,
    retention_hours: u32,
    created_at_ms: i64,
    state: StreamState,
}

impl StreamRecord {
    fn of(stream: &Stream) -> Self {
        Self {
            id: stream.id().to_string(),
            name: stream.name().to_string(),
            compartment_id: stream.compartment_id().to_string(),
            partitions: stream.partition_count(),
            retention_hours: stream.retention_hours(),
            created_at_ms: stream.created_at_ms(),
            state: stream.state(),
        }
    }
}

/// Registry of all streams
#[derive(Debug)]
pub struct StreamRegistry {
    streams: DashMap<String, Arc<Stream>>,
    /// (compartment, name) -> stream id
    names: DashMap<(String, String), String>,
    /// `<data_dir>/streams`, `None` in memory
    root: Option<PathBuf>,
    storage: StorageConfig,
    retention: RetentionConfig,
    retry: RetryPolicy,
    clock: SharedClock,
    endpoint_base: String,
}

impl StreamRegistry {
    pub fn new(
        data_dir: Option<&Path>,
        storage: StorageConfig,
        retention: RetentionConfig,
        retry: RetryPolicy,
        clock: SharedClock,
        endpoint_base: impl Into<String>,
    ) -> Self {
        Self {
            streams: DashMap::new(),
            names: DashMap::new(),
            root: data_dir.map(|d| d.join("streams")),
            storage,
            retention,
            retry,
            clock,
            endpoint_base: endpoint_base.into(),
        }
    }

    /// Load persisted streams. Deletions interrupted by a restart are
    /// finished; half-created streams are discarded.
    pub fn recover(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();
        let Some(root) = self.root.as_deref() else {
            return Ok(report);
        };

        self.retry.run("create streams directory", || {
            fs::create_dir_all(root).map_err(|e| StorageError::io("create directory", root, e))
        })?;

        let entries = fs::read_dir(root).map_err(|e| StorageError::io("list streams", root, e))?;
        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io("list streams", root, e))?;
            if entry.path().is_dir() {
                dirs.push(entry.path());
            }
        }
        dirs.sort();

        for dir in dirs {
            let metadata_path = dir.join(STREAM_METADATA_FILE);
            let record = match read_json::<StreamRecord>(&metadata_path) {
                Ok(Some(record)) => record,
                Ok(None) => {
                    warn!(path = %dir.display(), "Stream directory without metadata, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "Unreadable stream metadata, skipping");
                    continue;
                }
            };

            match record.state {
                StreamState::Active => {
                    let stream = self.open_stream(&record, &dir)?;
                    self.names.insert(
                        (record.compartment_id.clone(), record.name.clone()),
                        record.id.clone(),
                    );
                    self.streams.insert(record.id.clone(), Arc::new(stream));
                    report.loaded.push(record.id);
                }
                StreamState::Deleting | StreamState::Deleted => {
                    self.retry
                        .run("remove stream", || remove_dir_if_exists(&dir))?;
                    info!(stream = %record.id, "Completed interrupted stream deletion");
                    report.completed_deletions.push(record.id);
                }
                StreamState::Creating => {
                    self.retry
                        .run("remove stream", || remove_dir_if_exists(&dir))?;
                    warn!(stream = %record.id, name = %record.name, "Discarded half-created stream");
                    report.abandoned_creations.push(record.id);
                }
            }
        }

        info!(
            loaded = report.loaded.len(),
            completed_deletions = report.completed_deletions.len(),
            "Stream registry recovered"
        );
        Ok(report)
    }

    /// Create a stream and bring it to ACTIVE
    pub fn create(&self, details: CreateStreamDetails) -> Result<Arc<Stream>> {
        validate_stream_name(&details.name)?;
        if details.compartment_id.is_empty() {
            return Err(BrookError::invalid("compartment id cannot be empty"));
        }
        if details.partitions == 0 || details.partitions > self.storage.max_partitions {
            return Err(BrookError::invalid(format!(
                "partition count must be between 1 and {} (got {})",
                self.storage.max_partitions, details.partitions
            )));
        }
        let retention_hours = details
            .retention_hours
            .unwrap_or(self.retention.default_retention_hours);
        if !(self.retention.min_retention_hours..=self.retention.max_retention_hours)
            .contains(&retention_hours)
        {
            return Err(BrookError::invalid(format!(
                "retention must be between {} and {} hours (got {})",
                self.retention.min_retention_hours,
                self.retention.max_retention_hours,
                retention_hours
            )));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let name_key = (details.compartment_id.clone(), details.name.clone());
        match self.names.entry(name_key.clone()) {
            Entry::Occupied(_) => {
                return Err(BrookError::DuplicateName {
                    compartment: details.compartment_id,
                    name: details.name,
                });
            }
            Entry::Vacant(entry) => {
                entry.insert(id.clone());
            }
        }

        let record = StreamRecord {
            id: id.clone(),
            name: details.name,
            compartment_id: details.compartment_id,
            partitions: details.partitions,
            retention_hours,
            created_at_ms: self.clock.now_ms(),
            state: StreamState::Creating,
        };

        let stream = match self.build_stream(&record) {
            Ok(stream) => Arc::new(stream),
            Err(e) => {
                self.names.remove(&name_key);
                if let Some(dir) = self.stream_dir(&id) {
                    if let Err(cleanup) = remove_dir_if_exists(&dir) {
                        warn!(stream = %id, error = %cleanup, "Failed to clean up after failed create");
                    }
                }
                return Err(e);
            }
        };
        self.streams.insert(id.clone(), stream.clone());

        stream.set_state(StreamState::Active);
        if let Err(e) = self.persist(&stream) {
            stream.set_state(StreamState::Creating);
            self.streams.remove(&id);
            self.names.remove(&name_key);
            for partition in stream.partitions() {
                if let Err(cleanup) = partition.destroy() {
                    warn!(stream = %id, error = %cleanup, "Failed to clean up partition after failed create");
                }
            }
            return Err(e);
        }

        info!(
            stream = %id,
            name = %record.name,
            compartment = %record.compartment_id,
            partitions = record.partitions,
            retention_hours,
            "Stream created"
        );

        Ok(stream)
    }

    /// Look up a live stream
    pub fn get(&self, stream_id: &str) -> Result<Arc<Stream>> {
        self.streams
            .get(stream_id)
            .map(|s| s.value().clone())
            .ok_or_else(|| BrookError::StreamNotFound(stream_id.to_string()))
    }

    /// Look up a stream that must be ACTIVE
    pub fn get_active(&self, stream_id: &str) -> Result<Arc<Stream>> {
        let stream = self.get(stream_id)?;
        stream.ensure_active()?;
        Ok(stream)
    }

    /// Metadata of a stream
    pub fn metadata(&self, stream_id: &str) -> Result<StreamMetadata> {
        Ok(self.get(stream_id)?.metadata(&self.endpoint_base))
    }

    /// Metadata of matching streams, oldest first
    pub fn list(&self, filter: &StreamFilter) -> Vec<StreamMetadata> {
        let mut streams: Vec<Arc<Stream>> = self
            .streams
            .iter()
            .filter(|s| filter.matches(s.value()))
            .map(|s| s.value().clone())
            .collect();
        streams.sort_by(|a, b| {
            a.created_at_ms()
                .cmp(&b.created_at_ms())
                .then_with(|| a.id().cmp(b.id()))
        });
        streams
            .iter()
            .map(|s| s.metadata(&self.endpoint_base))
            .collect()
    }

    /// All live streams
    pub fn streams(&self) -> Vec<Arc<Stream>> {
        self.streams.iter().map(|s| s.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Move an ACTIVE stream to DELETING. New data-plane calls fail from
    /// here on and the name becomes free for reuse. A stream already
    /// DELETING is returned as is, so an interrupted deletion can be
    /// finished by deleting again.
    pub fn begin_delete(&self, stream_id: &str) -> Result<Arc<Stream>> {
        let stream = self.get(stream_id)?;
        if stream.state() == StreamState::Deleting {
            debug!(stream = %stream_id, "Resuming stream deletion");
            return Ok(stream);
        }
        stream.ensure_active()?;

        stream.set_state(StreamState::Deleting);
        if let Err(e) = self.persist(&stream) {
            stream.set_state(StreamState::Active);
            return Err(e);
        }
        self.names.remove(&(
            stream.compartment_id().to_string(),
            stream.name().to_string(),
        ));

        info!(stream = %stream_id, name = %stream.name(), "Stream deleting");
        Ok(stream)
    }

    /// Remove a DELETING stream's data and forget it
    pub fn finish_delete(&self, stream: &Stream) -> Result<()> {
        for partition in stream.partitions() {
            partition.destroy()?;
        }
        if let Some(dir) = self.stream_dir(stream.id()) {
            self.retry
                .run("remove stream", || remove_dir_if_exists(&dir))?;
        }
        stream.set_state(StreamState::Deleted);
        self.streams.remove(stream.id());

        info!(stream = %stream.id(), name = %stream.name(), "Stream deleted");
        Ok(())
    }

    fn stream_dir(&self, stream_id: &str) -> Option<PathBuf> {
        self.root.as_ref().map(|root| root.join(stream_id))
    }

    fn persist(&self, stream: &Stream) -> Result<()> {
        if let Some(dir) = self.stream_dir(stream.id()) {
            let path = dir.join(STREAM_METADATA_FILE);
            let record = StreamRecord::of(stream);
            self.retry
                .run("write stream metadata", || write_json(&path, &record))?;
        }
        Ok(())
    }

    /// Persist the CREATING record and open fresh partitions
    fn build_stream(&self, record: &StreamRecord) -> Result<Stream> {
        match self.stream_dir(&record.id) {
            Some(dir) => {
                self.retry.run("create stream directory", || {
                    fs::create_dir_all(&dir)
                        .map_err(|e| StorageError::io("create directory", &dir, e))
                })?;
                let path = dir.join(STREAM_METADATA_FILE);
                self.retry
                    .run("write stream metadata", || write_json(&path, record))?;
                self.open_stream(record, &dir)
            }
            None => Ok(self.memory_stream(record)),
        }
    }

    fn open_stream(&self, record: &StreamRecord, dir: &Path) -> Result<Stream> {
        let partitions = (0..record.partitions)
            .map(|i| {
                PartitionLog::open(
                    &record.id,
                    i,
                    &dir.join(format!("partition-{}", i)),
                    &self.storage,
                    self.retry.clone(),
                    self.clock.clone(),
                )
                .map(Arc::new)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(self.assemble(record, partitions))
    }

    fn memory_stream(&self, record: &StreamRecord) -> Stream {
        let partitions = (0..record.partitions)
            .map(|i| Arc::new(PartitionLog::open_in_memory(&record.id, i, self.clock.clone())))
            .collect();
        self.assemble(record, partitions)
    }

    fn assemble(&self, record: &StreamRecord, partitions: Vec<Arc<PartitionLog>>) -> Stream {
        Stream::new(
            record.id.clone(),
            record.name.clone(),
            record.compartment_id.clone(),
            record.retention_hours,
            record.created_at_ms,
            record.state,
            partitions,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn registry(data_dir: Option<&Path>) -> StreamRegistry {
        StreamRegistry::new(
            data_dir,
            StorageConfig::default(),
            RetentionConfig::default(),
            RetryPolicy::default(),
            Arc::new(ManualClock::new(1_000)),
            "brook://test",
        )
    }

    #[test]
    fn test_create_and_get() {
        let registry = registry(None);
        let stream = registry
            .create(CreateStreamDetails::new("orders", 3).with_retention_hours(48))
            .unwrap();

        assert_eq!(stream.state(), StreamState::Active);
        assert_eq!(stream.partition_count(), 3);

        let meta = registry.metadata(stream.id()).unwrap();
        assert_eq!(meta.name, "orders");
        assert_eq!(meta.compartment_id, "default");
        assert_eq!(meta.retention_hours, 48);
        assert!(meta.messages_endpoint.is_some());
    }

    #[test]
    fn test_duplicate_name_per_compartment() {
        let registry = registry(None);
        registry.create(CreateStreamDetails::new("orders", 1)).unwrap();

        let err = registry
            .create(CreateStreamDetails::new("orders", 2))
            .unwrap_err();
        assert!(matches!(err, BrookError::DuplicateName { .. }));

        registry
            .create(CreateStreamDetails::new("orders", 1).in_compartment("other"))
            .unwrap();
    }

    #[test]
    fn test_rejects_bad_arguments() {
        let registry = registry(None);
        for details in [
            CreateStreamDetails::new("orders", 0),
            CreateStreamDetails::new("orders", 51),
            CreateStreamDetails::new("orders", 1).with_retention_hours(23),
            CreateStreamDetails::new("orders", 1).with_retention_hours(169),
            CreateStreamDetails::new("bad name", 1),
            CreateStreamDetails::new("orders", 1).in_compartment(""),
        ] {
            assert!(matches!(
                registry.create(details),
                Err(BrookError::InvalidArgument(_))
            ));
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_delete_lifecycle_frees_name() {
        let registry = registry(None);
        let stream = registry.create(CreateStreamDetails::new("orders", 1)).unwrap();
        let id = stream.id().to_string();

        let deleting = registry.begin_delete(&id).unwrap();
        assert_eq!(deleting.state(), StreamState::Deleting);
        assert!(matches!(
            registry.get_active(&id),
            Err(BrookError::StreamNotActive { .. })
        ));

        registry.finish_delete(&deleting).unwrap();
        assert_eq!(deleting.state(), StreamState::Deleted);
        assert!(matches!(registry.get(&id), Err(BrookError::StreamNotFound(_))));

        registry.create(CreateStreamDetails::new("orders", 1)).unwrap();
    }

    #[test]
    fn test_interrupted_delete_can_be_retried() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(Some(dir.path()));
        let stream = registry.create(CreateStreamDetails::new("orders", 2)).unwrap();
        let id = stream.id().to_string();

        // First attempt stops after marking the stream DELETING
        registry.begin_delete(&id).unwrap();

        let again = registry.begin_delete(&id).unwrap();
        assert!(Arc::ptr_eq(&again, &stream));
        assert_eq!(again.state(), StreamState::Deleting);
        registry.finish_delete(&again).unwrap();

        assert!(matches!(registry.get(&id), Err(BrookError::StreamNotFound(_))));
        assert!(!dir.path().join("streams").join(&id).exists());
    }

    #[test]
    fn test_list_filters_and_orders() {
        let registry = registry(None);
        registry.create(CreateStreamDetails::new("a", 1)).unwrap();
        registry
            .create(CreateStreamDetails::new("b", 1).in_compartment("team"))
            .unwrap();
        registry.create(CreateStreamDetails::new("c", 1)).unwrap();

        assert_eq!(registry.list(&StreamFilter::default()).len(), 3);

        let team = registry.list(&StreamFilter {
            compartment_id: Some("team".to_string()),
            ..Default::default()
        });
        assert_eq!(team.len(), 1);
        assert_eq!(team[0].name, "b");

        let by_name = registry.list(&StreamFilter {
            name: Some("c".to_string()),
            state: Some(StreamState::Active),
            ..Default::default()
        });
        assert_eq!(by_name.len(), 1);
    }

    #[test]
    fn test_recover_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let (kept, dropped) = {
            let registry = registry(Some(dir.path()));
            let kept = registry.create(CreateStreamDetails::new("kept", 2)).unwrap();
            kept.partition(1)
                .unwrap()
                .append(None, bytes::Bytes::from_static(b"hello"))
                .unwrap();
            let dropped = registry.create(CreateStreamDetails::new("dropped", 1)).unwrap();
            registry.begin_delete(dropped.id()).unwrap();
            (kept.id().to_string(), dropped.id().to_string())
        };

        let registry = registry(Some(dir.path()));
        let report = registry.recover().unwrap();
        assert_eq!(report.loaded, vec![kept.clone()]);
        assert_eq!(report.completed_deletions, vec![dropped.clone()]);
        assert!(!dir.path().join("streams").join(&dropped).exists());

        let stream = registry.get_active(&kept).unwrap();
        assert_eq!(stream.partition(1).unwrap().next_offset(), 1);
        assert!(matches!(
            registry.create(CreateStreamDetails::new("kept", 1)),
            Err(BrookError::DuplicateName { .. })
        ));
    }
}
