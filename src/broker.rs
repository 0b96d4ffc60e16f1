//! Broker facade
//!
//! [`Broker`] wires the stream registry, cursor manager and retention reaper
//! together and hands out the two surfaces callers use:
//!
//! - [`StreamAdmin`]: control plane (create, delete, list streams; consumer
//!   group administration)
//! - [`StreamClient`]: data plane (put, get, cursors)
//!
//! Both are cheap clones over the same shared state. Control-plane calls only
//! touch the registry maps; data-plane calls only lock the partitions they
//! write to.
//!
//! # Example
//!
//! ```
//! use brook::broker::Broker;
//! use brook::cursor::{CreateCursorDetails, CursorPosition};
//! use brook::storage::PutEntry;
//! use brook::stream::CreateStreamDetails;
//!
//! fn main() -> brook::Result<()> {
//!     let broker = Broker::in_memory()?;
//!     let stream = broker.admin().create_stream(CreateStreamDetails::new("events", 2))?;
//!
//!     let client = broker.client();
//!     client.put_messages(&stream.id, vec![PutEntry::keyed("user-1", "hello")])?;
//!
//!     let partition = brook::stream::partition_for_key(b"user-1", 2);
//!     let cursor = client.create_cursor(
//!         &stream.id,
//!         CreateCursorDetails::simple(partition, CursorPosition::TrimHorizon),
//!     )?;
//!     let read = client.get_messages(&cursor, 10)?;
//!     assert_eq!(read.messages.len(), 1);
//!     Ok(())
//! }
//! ```

use crate::clock::{SharedClock, SystemClock};
use crate::config::BrokerConfig;
use crate::cursor::{
    ConsumerGroup, CreateCursorDetails, CursorManager, CursorToken, GetMessagesResult, GroupStore,
    ResolvedCursor,
};
use crate::error::{BrookError, Result};
use crate::storage::{PutEntry, PutMessagesResult, PutResultEntry, RetentionReaper, RetryPolicy};
use crate::stream::{CreateStreamDetails, StreamFilter, StreamMetadata, StreamRegistry};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

struct BrokerInner {
    config: BrokerConfig,
    registry: Arc<StreamRegistry>,
    cursors: CursorManager,
    clock: SharedClock,
}

/// A running broker
#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("in_memory", &self.inner.config.in_memory)
            .field("streams", &self.inner.registry.len())
            .finish()
    }
}

impl Broker {
    /// Open a broker with the system clock
    pub fn open(config: BrokerConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Open an in-memory broker with default settings
    pub fn in_memory() -> Result<Self> {
        Self::open(BrokerConfig::in_memory())
    }

    /// Open a broker reading time from `clock`. Persisted streams and
    /// consumer groups are recovered before this returns.
    pub fn with_clock(config: BrokerConfig, clock: SharedClock) -> Result<Self> {
        config.validate()?;

        let data_dir = config.storage_root().map(|p| p.to_path_buf());
        if let Some(dir) = data_dir.as_deref() {
            std::fs::create_dir_all(dir)?;
        }

        let retry = RetryPolicy::new(config.retry.clone());
        let registry = Arc::new(StreamRegistry::new(
            data_dir.as_deref(),
            config.storage.clone(),
            config.retention.clone(),
            retry.clone(),
            clock.clone(),
            config.endpoint_base.clone(),
        ));
        let recovery = registry.recover()?;

        let cursors = CursorManager::new(
            registry.clone(),
            GroupStore::new(data_dir.as_deref()),
            config.cursor.clone(),
            retry,
            clock.clone(),
        );
        for stream_id in &recovery.completed_deletions {
            cursors.remove_stream(stream_id)?;
        }
        let groups = cursors.recover()?;

        info!(
            data_dir = ?data_dir,
            streams = recovery.loaded.len(),
            completed_deletions = recovery.completed_deletions.len(),
            abandoned_creations = recovery.abandoned_creations.len(),
            groups,
            "Broker opened"
        );

        Ok(Self {
            inner: Arc::new(BrokerInner {
                config,
                registry,
                cursors,
                clock,
            }),
        })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }

    /// Control-plane surface
    pub fn admin(&self) -> StreamAdmin {
        StreamAdmin {
            inner: self.inner.clone(),
        }
    }

    /// Data-plane surface
    pub fn client(&self) -> StreamClient {
        StreamClient {
            inner: self.inner.clone(),
        }
    }

    /// Retention reaper over this broker's streams, using the configured
    /// sweep interval
    pub fn reaper(&self) -> RetentionReaper {
        RetentionReaper::new(
            self.inner.registry.clone(),
            self.inner.clock.clone(),
            Duration::from_secs(self.inner.config.retention.reaper_interval_secs),
        )
    }

    /// Flush every partition's active segment to disk
    pub fn sync(&self) -> Result<()> {
        for stream in self.inner.registry.streams() {
            for partition in stream.partitions() {
                partition.sync()?;
            }
        }
        Ok(())
    }

    /// Counts across all streams
    pub fn stats(&self) -> BrokerStats {
        let mut stats = BrokerStats {
            persistent: !self.inner.config.in_memory,
            ..Default::default()
        };
        for stream in self.inner.registry.streams() {
            stats.streams += 1;
            stats.partitions += stream.partitions().len();
            stats.retained_messages += stream
                .partitions()
                .iter()
                .map(|p| p.len() as u64)
                .sum::<u64>();
        }
        stats
    }
}

/// Broker-wide counts
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct BrokerStats {
    pub streams: usize,
    pub partitions: usize,
    pub retained_messages: u64,
    pub persistent: bool,
}

impl fmt::Display for BrokerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} streams, {} partitions, {} retained messages ({})",
            self.streams,
            self.partitions,
            self.retained_messages,
            if self.persistent { "persistent" } else { "in-memory" }
        )
    }
}

/// Control plane: stream lifecycle and consumer group administration
#[derive(Clone)]
pub struct StreamAdmin {
    inner: Arc<BrokerInner>,
}

impl fmt::Debug for StreamAdmin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamAdmin").finish_non_exhaustive()
    }
}

impl StreamAdmin {
    /// Create a stream. The returned snapshot is ACTIVE and carries the
    /// stream's messages endpoint.
    pub fn create_stream(&self, details: CreateStreamDetails) -> Result<StreamMetadata> {
        let stream = self.inner.registry.create(details)?;
        Ok(stream.metadata(&self.inner.config.endpoint_base))
    }

    pub fn get_stream(&self, stream_id: &str) -> Result<StreamMetadata> {
        self.inner.registry.metadata(stream_id)
    }

    /// Streams matching `filter`, oldest first
    pub fn list_streams(&self, filter: &StreamFilter) -> Vec<StreamMetadata> {
        self.inner.registry.list(filter)
    }

    /// Delete a stream with its partitions and consumer groups. Outstanding
    /// cursors stop resolving.
    pub fn delete_stream(&self, stream_id: &str) -> Result<()> {
        let stream = self.inner.registry.begin_delete(stream_id)?;
        self.inner.cursors.remove_stream(stream_id)?;
        self.inner.registry.finish_delete(&stream)
    }

    pub fn list_groups(&self, stream_id: &str) -> Result<Vec<String>> {
        self.inner.cursors.list_groups(stream_id)
    }

    /// Members and positions of a consumer group
    pub fn get_group(&self, stream_id: &str, group: &str) -> Result<ConsumerGroup> {
        self.inner.registry.get(stream_id)?;
        self.inner.cursors.get_group(stream_id, group)
    }

    pub fn delete_group(&self, stream_id: &str, group: &str) -> Result<()> {
        self.inner.registry.get(stream_id)?;
        self.inner.cursors.delete_group(stream_id, group)
    }
}

/// Data plane: writes, cursors and reads
#[derive(Clone)]
pub struct StreamClient {
    inner: Arc<BrokerInner>,
}

impl fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamClient").finish_non_exhaustive()
    }
}

impl StreamClient {
    /// Write a batch of messages.
    ///
    /// The whole batch is validated before anything is written. Entries are
    /// then grouped by partition and each partition's group is appended
    /// atomically. Results are in request order.
    pub fn put_messages(&self, stream_id: &str, entries: Vec<PutEntry>) -> Result<PutMessagesResult> {
        let stream = self.inner.registry.get_active(stream_id)?;
        self.validate_batch(&entries)?;

        let count = entries.len();
        let mut by_partition: BTreeMap<u32, Vec<(usize, Option<Bytes>, Bytes)>> = BTreeMap::new();
        for (index, entry) in entries.into_iter().enumerate() {
            let partition = stream.assign(entry.routing_key());
            by_partition
                .entry(partition)
                .or_default()
                .push((index, entry.key, entry.value));
        }

        let mut results: Vec<Option<PutResultEntry>> = vec![None; count];
        for (partition_id, batch) in by_partition {
            let log = stream.partition(partition_id)?;
            let (indexes, records): (Vec<usize>, Vec<(Option<Bytes>, Bytes)>) = batch
                .into_iter()
                .map(|(index, key, value)| (index, (key, value)))
                .unzip();
            let appended = log.append_batch(records)?;
            for (index, appended) in indexes.into_iter().zip(appended) {
                results[index] = Some(PutResultEntry {
                    partition: partition_id,
                    offset: appended.offset,
                    timestamp_ms: appended.timestamp_ms,
                });
            }
        }

        let entries = results
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| BrookError::invalid("batch entry was not assigned a partition"))?;

        debug!(stream = %stream_id, messages = count, "Put messages");
        Ok(PutMessagesResult { entries })
    }

    pub fn create_cursor(&self, stream_id: &str, details: CreateCursorDetails) -> Result<CursorToken> {
        self.inner.cursors.create_cursor(stream_id, details)
    }

    /// Token onto an existing group cursor, keeping its position
    pub fn attach_group_cursor(
        &self,
        stream_id: &str,
        group: &str,
        instance: &str,
        partition: u32,
    ) -> Result<CursorToken> {
        self.inner
            .cursors
            .attach_group_cursor(stream_id, group, instance, partition)
    }

    pub fn resolve_cursor(&self, token: &CursorToken) -> Result<ResolvedCursor> {
        self.inner.cursors.resolve(token)
    }

    /// Read up to `limit` messages. Reading past the tail returns an empty
    /// batch straight away; callers poll.
    pub fn get_messages(&self, token: &CursorToken, limit: usize) -> Result<GetMessagesResult> {
        self.inner.cursors.get_messages(token, limit)
    }

    /// Commit the position carried by `token` (group cursors without
    /// commit-on-get)
    pub fn commit_group_cursor(&self, token: &CursorToken) -> Result<i64> {
        self.inner.cursors.commit_group_cursor(token)
    }

    fn validate_batch(&self, entries: &[PutEntry]) -> Result<()> {
        let limits = &self.inner.config.storage;
        if entries.is_empty() {
            return Err(BrookError::invalid("batch must contain at least one message"));
        }
        if entries.len() > limits.max_batch_messages {
            return Err(BrookError::invalid(format!(
                "batch of {} messages exceeds the limit of {}",
                entries.len(),
                limits.max_batch_messages
            )));
        }
        for (index, entry) in entries.iter().enumerate() {
            if entry.value.len() > limits.max_message_bytes {
                return Err(BrookError::invalid(format!(
                    "message {} is {} bytes, limit is {}",
                    index,
                    entry.value.len(),
                    limits.max_message_bytes
                )));
            }
            for key in [entry.key.as_ref(), entry.partition_key.as_ref()]
                .into_iter()
                .flatten()
            {
                if key.is_empty() || key.len() > limits.max_key_bytes {
                    return Err(BrookError::invalid(format!(
                        "malformed key in message {}: length must be 1 to {} bytes",
                        index, limits.max_key_bytes
                    )));
                }
            }
        }
        Ok(())
    }
}
