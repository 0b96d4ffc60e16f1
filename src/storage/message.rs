//! Message types for brook storage

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A single message in a stream partition. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Partition the message lives in
    pub partition: u32,

    /// Offset of this message within the partition
    pub offset: i64,

    /// Ingestion timestamp (milliseconds since epoch)
    pub timestamp_ms: i64,

    /// Optional key
    pub key: Option<Bytes>,

    /// Payload
    pub value: Bytes,
}

impl Message {
    pub fn new(
        partition: u32,
        offset: i64,
        timestamp_ms: i64,
        key: Option<Bytes>,
        value: Bytes,
    ) -> Self {
        Self {
            partition,
            offset,
            timestamp_ms,
            key,
            value,
        }
    }
}

/// One entry of a put request
///
/// The message is routed by `partition_key` when present, otherwise by
/// `key`; with neither, partitions are chosen round-robin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutEntry {
    pub key: Option<Bytes>,
    pub value: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<Bytes>,
}

impl PutEntry {
    /// Entry with a key, which also routes it
    pub fn keyed(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: Some(key.into()),
            value: value.into(),
            partition_key: None,
        }
    }

    /// Entry without a key; placed round-robin
    pub fn unkeyed(value: impl Into<Bytes>) -> Self {
        Self {
            key: None,
            value: value.into(),
            partition_key: None,
        }
    }

    /// Route by an explicit partition key instead of the message key
    pub fn with_partition_key(mut self, partition_key: impl Into<Bytes>) -> Self {
        self.partition_key = Some(partition_key.into());
        self
    }

    /// The bytes used to pick a partition
    pub fn routing_key(&self) -> Option<&[u8]> {
        self.partition_key
            .as_deref()
            .or(self.key.as_deref())
    }
}

/// Where one put entry landed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutResultEntry {
    pub partition: u32,
    pub offset: i64,
    pub timestamp_ms: i64,
}

/// Result of a put request, in request order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutMessagesResult {
    pub entries: Vec<PutResultEntry>,
}

impl PutMessagesResult {
    pub fn offsets(&self) -> Vec<i64> {
        self.entries.iter().map(|e| e.offset).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
