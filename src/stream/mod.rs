//! Streams
//!
//! A stream is a named set of partitions with a fixed partition count and a
//! retention window. Lifecycle:
//!
//! ```text
//! CREATING ──► ACTIVE ──► DELETING ──► DELETED
//! ```
//!
//! Producer and consumer operations are only accepted while ACTIVE.

mod assigner;
mod registry;

pub use assigner::{partition_for_key, PartitionAssigner};
pub use registry::{CreateStreamDetails, RecoveryReport, StreamFilter, StreamRegistry};

use crate::error::{BrookError, Result};
use crate::storage::PartitionLog;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Maximum stream name length
pub const MAX_STREAM_NAME_LENGTH: usize = 255;

const MS_PER_HOUR: i64 = 60 * 60 * 1000;

/// Lifecycle state of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamState {
    Creating,
    Active,
    Deleting,
    Deleted,
}

impl StreamState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamState::Creating => "CREATING",
            StreamState::Active => "ACTIVE",
            StreamState::Deleting => "DELETING",
            StreamState::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check a stream name: 1-255 characters of `[A-Za-z0-9._-]`, and not
/// `.` or `..`.
///
/// ```rust
/// use brook::stream::validate_stream_name;
///
/// assert!(validate_stream_name("orders.v2").is_ok());
/// assert!(validate_stream_name("").is_err());
/// assert!(validate_stream_name("has space").is_err());
/// assert!(validate_stream_name("..").is_err());
/// ```
pub fn validate_stream_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(BrookError::invalid("stream name cannot be empty"));
    }
    if name.len() > MAX_STREAM_NAME_LENGTH {
        return Err(BrookError::invalid(format!(
            "stream name exceeds {} characters (got {})",
            MAX_STREAM_NAME_LENGTH,
            name.len()
        )));
    }
    if name == "." || name == ".." {
        return Err(BrookError::invalid(format!(
            "stream name '{}' is reserved",
            name
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
    {
        return Err(BrookError::invalid(format!(
            "stream name '{}' contains invalid characters; \
             only letters, digits, '.', '_' and '-' are allowed",
            name
        )));
    }
    Ok(())
}

/// Snapshot of a stream's metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetadata {
    pub id: String,
    pub name: String,
    pub compartment_id: String,
    pub partitions: u32,
    pub retention_hours: u32,
    pub state: StreamState,
    pub created_at: DateTime<Utc>,
    /// Data-plane endpoint; only set while the stream is ACTIVE
    pub messages_endpoint: Option<String>,
}

/// A live stream and its partitions
#[derive(Debug)]
pub struct Stream {
    id: String,
    name: String,
    compartment_id: String,
    retention_hours: u32,
    created_at_ms: i64,
    state: RwLock<StreamState>,
    partitions: Vec<Arc<PartitionLog>>,
    assigner: PartitionAssigner,
}

impl Stream {
    pub(crate) fn new(
        id: String,
        name: String,
        compartment_id: String,
        retention_hours: u32,
        created_at_ms: i64,
        state: StreamState,
        partitions: Vec<Arc<PartitionLog>>,
    ) -> Self {
        let assigner = PartitionAssigner::new(partitions.len() as u32);
        Self {
            id,
            name,
            compartment_id,
            retention_hours,
            created_at_ms,
            state: RwLock::new(state),
            partitions,
            assigner,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn compartment_id(&self) -> &str {
        &self.compartment_id
    }

    pub fn partition_count(&self) -> u32 {
        self.partitions.len() as u32
    }

    pub fn retention_hours(&self) -> u32 {
        self.retention_hours
    }

    pub fn created_at_ms(&self) -> i64 {
        self.created_at_ms
    }

    pub fn state(&self) -> StreamState {
        *self.state.read()
    }

    pub(crate) fn set_state(&self, state: StreamState) {
        *self.state.write() = state;
    }

    /// Fail with `StreamNotActive` unless the stream is ACTIVE
    pub fn ensure_active(&self) -> Result<()> {
        match self.state() {
            StreamState::Active => Ok(()),
            state => Err(BrookError::StreamNotActive {
                stream_id: self.id.clone(),
                state,
            }),
        }
    }

    /// Partition by index
    pub fn partition(&self, partition: u32) -> Result<&Arc<PartitionLog>> {
        self.partitions.get(partition as usize).ok_or_else(|| {
            BrookError::invalid(format!(
                "partition {} out of range for stream {} ({} partitions)",
                partition,
                self.id,
                self.partitions.len()
            ))
        })
    }

    pub fn partitions(&self) -> &[Arc<PartitionLog>] {
        &self.partitions
    }

    /// Partition for a message with the given routing key
    pub fn assign(&self, routing_key: Option<&[u8]>) -> u32 {
        self.assigner.assign(routing_key)
    }

    /// Messages stamped before this instant are past retention
    pub fn retention_boundary(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(i64::from(self.retention_hours) * MS_PER_HOUR)
    }

    /// Metadata snapshot; `endpoint_base` is used to build the messages endpoint
    pub fn metadata(&self, endpoint_base: &str) -> StreamMetadata {
        let state = self.state();
        StreamMetadata {
            id: self.id.clone(),
            name: self.name.clone(),
            compartment_id: self.compartment_id.clone(),
            partitions: self.partition_count(),
            retention_hours: self.retention_hours,
            state,
            created_at: DateTime::from_timestamp_millis(self.created_at_ms).unwrap_or_default(),
            messages_endpoint: (state == StreamState::Active).then(|| {
                format!("{}/streams/{}", endpoint_base.trim_end_matches('/'), self.id)
            }),
        }
    }
}
