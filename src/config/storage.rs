//! Storage configuration for brook
//!
//! Segment sizing, durability and request-size limits, plus the retry policy
//! applied to transient storage failures.

use serde::{Deserialize, Serialize};

use super::defaults::{
    DEFAULT_MAX_BATCH_MESSAGES, DEFAULT_MAX_KEY_BYTES, DEFAULT_MAX_MESSAGE_BYTES,
    DEFAULT_MAX_PARTITIONS, DEFAULT_RETRY_BACKOFF_MULTIPLIER, DEFAULT_RETRY_INITIAL_BACKOFF_MS,
    DEFAULT_RETRY_MAX_ATTEMPTS, DEFAULT_RETRY_MAX_BACKOFF_MS, DEFAULT_SEGMENT_MAX_BYTES,
    DEFAULT_SYNC_ON_APPEND,
};

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Active segment rolls once it reaches this many bytes
    pub segment_max_bytes: u64,

    /// fsync every appended batch before acknowledging it
    pub sync_on_append: bool,

    /// Maximum message value size in bytes
    pub max_message_bytes: usize,

    /// Maximum message key size in bytes
    pub max_key_bytes: usize,

    /// Maximum number of entries in one put request
    pub max_batch_messages: usize,

    /// Maximum partitions per stream
    pub max_partitions: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            segment_max_bytes: DEFAULT_SEGMENT_MAX_BYTES,
            sync_on_append: DEFAULT_SYNC_ON_APPEND,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            max_key_bytes: DEFAULT_MAX_KEY_BYTES,
            max_batch_messages: DEFAULT_MAX_BATCH_MESSAGES,
            max_partitions: DEFAULT_MAX_PARTITIONS,
        }
    }
}

/// Retry policy for transient storage failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub initial_backoff_ms: u64,

    /// Upper bound on any single delay
    pub max_backoff_ms: u64,

    /// Backoff multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            initial_backoff_ms: DEFAULT_RETRY_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_RETRY_MAX_BACKOFF_MS,
            backoff_multiplier: DEFAULT_RETRY_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryConfig {
    /// No delays between attempts; used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            ..Default::default()
        }
    }
}
