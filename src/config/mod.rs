//! Configuration module for brook
//!
//! This module is organized into submodules:
//! - `defaults` - Default constants and values
//! - `storage` - Segment, request-limit and retry configuration
//! - `stream` - Retention and cursor configuration
//! - `args` - CLI argument definitions
//! - `file` - TOML configuration file
//! - `merge` - File/CLI merging

mod args;
mod defaults;
pub mod file;
mod merge;
mod storage;
mod stream;

pub use args::BrokerArgs;
pub use defaults::*;
pub use file::ConfigFile;
pub use merge::merge_config_with_args;
pub use storage::{RetryConfig, StorageConfig};
pub use stream::{CursorConfig, RetentionConfig};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{BrookError, Result};

/// Complete broker configuration.
///
/// # Configuration Sources
///
/// Configuration is loaded from multiple sources with this precedence:
/// 1. **CLI arguments** (highest priority)
/// 2. **Environment variables** - `BROOK_*` prefix
/// 3. **Config file** - TOML configuration file
/// 4. **Built-in defaults** (lowest priority)
///
/// # Example
///
/// ```rust
/// use brook::config::BrokerConfig;
///
/// let config = BrokerConfig::in_memory();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Data directory for storage
    pub data_dir: PathBuf,

    /// Keep all data in memory
    pub in_memory: bool,

    /// Log level
    pub log_level: String,

    /// Base of each stream's messages endpoint
    pub endpoint_base: String,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Retention configuration
    pub retention: RetentionConfig,

    /// Cursor configuration
    pub cursor: CursorConfig,

    /// Retry policy for transient storage failures
    pub retry: RetryConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            in_memory: DEFAULT_IN_MEMORY,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            endpoint_base: DEFAULT_ENDPOINT_BASE.to_string(),
            storage: StorageConfig::default(),
            retention: RetentionConfig::default(),
            cursor: CursorConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl BrokerConfig {
    /// In-memory configuration with defaults for everything else
    pub fn in_memory() -> Self {
        Self {
            in_memory: true,
            ..Default::default()
        }
    }

    /// Persistent configuration rooted at `data_dir`
    pub fn persistent(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            in_memory: false,
            ..Default::default()
        }
    }

    /// Set the cursor signing secret
    pub fn with_cursor_secret(mut self, secret: impl Into<String>) -> Self {
        self.cursor.secret = Some(secret.into());
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the segment roll size
    pub fn with_segment_max_bytes(mut self, bytes: u64) -> Self {
        self.storage.segment_max_bytes = bytes;
        self
    }

    /// Create configuration from parsed CLI arguments
    pub fn from_args(args: BrokerArgs) -> Result<Self> {
        let in_memory = args.in_memory || args.playground;

        Ok(Self {
            data_dir: args.data_dir,
            in_memory,
            log_level: args.log_level,
            endpoint_base: args.endpoint_base,
            storage: StorageConfig {
                segment_max_bytes: args.segment_max_bytes,
                sync_on_append: args.sync_on_append,
                max_message_bytes: args.max_message_bytes,
                max_key_bytes: args.max_key_bytes,
                max_batch_messages: args.max_batch_messages,
                max_partitions: args.max_partitions,
            },
            retention: RetentionConfig {
                reaper_interval_secs: args.reaper_interval_secs,
                min_retention_hours: args.min_retention_hours,
                max_retention_hours: args.max_retention_hours,
                default_retention_hours: args.default_retention_hours,
            },
            cursor: CursorConfig {
                idle_timeout_ms: args.cursor_idle_timeout_ms,
                max_read_limit: args.max_read_limit,
                secret: args.cursor_secret,
            },
            retry: RetryConfig {
                max_attempts: args.retry_max_attempts,
                initial_backoff_ms: args.retry_initial_backoff_ms,
                max_backoff_ms: args.retry_max_backoff_ms,
                backoff_multiplier: args.retry_backoff_multiplier,
            },
        })
    }

    /// Directory holding stream data, `None` in memory mode
    pub fn storage_root(&self) -> Option<&std::path::Path> {
        if self.in_memory {
            None
        } else {
            Some(self.data_dir.as_path())
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(BrookError::config(
                "log_level",
                format!(
                    "'{}' is not one of {}",
                    self.log_level,
                    valid_levels.join(", ")
                ),
            ));
        }

        if self.endpoint_base.trim().is_empty() {
            return Err(BrookError::config("endpoint_base", "must not be empty"));
        }

        // === Storage Validation ===

        if self.storage.segment_max_bytes == 0 {
            return Err(BrookError::config("storage.segment_max_bytes", "must be > 0"));
        }
        if self.storage.max_message_bytes == 0 {
            return Err(BrookError::config("storage.max_message_bytes", "must be > 0"));
        }
        if self.storage.max_batch_messages == 0 {
            return Err(BrookError::config("storage.max_batch_messages", "must be > 0"));
        }
        if self.storage.max_partitions == 0 {
            return Err(BrookError::config("storage.max_partitions", "must be > 0"));
        }

        // === Retention Validation ===

        let retention = &self.retention;
        if retention.reaper_interval_secs == 0 {
            return Err(BrookError::config(
                "retention.reaper_interval_secs",
                "must be > 0",
            ));
        }
        if retention.min_retention_hours == 0
            || retention.min_retention_hours > retention.max_retention_hours
        {
            return Err(BrookError::config(
                "retention",
                format!(
                    "invalid range {}..={} hours",
                    retention.min_retention_hours, retention.max_retention_hours
                ),
            ));
        }
        if !(retention.min_retention_hours..=retention.max_retention_hours)
            .contains(&retention.default_retention_hours)
        {
            return Err(BrookError::config(
                "retention.default_retention_hours",
                format!(
                    "{} is outside {}..={}",
                    retention.default_retention_hours,
                    retention.min_retention_hours,
                    retention.max_retention_hours
                ),
            ));
        }

        // === Cursor Validation ===

        if self.cursor.idle_timeout_ms == 0 {
            return Err(BrookError::config("cursor.idle_timeout_ms", "must be > 0"));
        }
        if self.cursor.max_read_limit == 0 {
            return Err(BrookError::config("cursor.max_read_limit", "must be > 0"));
        }
        if let Some(ref secret) = self.cursor.secret {
            if secret.len() < MIN_CURSOR_SECRET_BYTES {
                return Err(BrookError::config(
                    "cursor.secret",
                    format!("must be at least {} bytes", MIN_CURSOR_SECRET_BYTES),
                ));
            }
        }

        // === Retry Validation ===

        if self.retry.max_attempts == 0 {
            return Err(BrookError::config("retry.max_attempts", "must be > 0"));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(BrookError::config(
                "retry.backoff_multiplier",
                "must be >= 1.0",
            ));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(BrookError::config(
                "retry.initial_backoff_ms",
                "must not exceed retry.max_backoff_ms",
            ));
        }

        Ok(())
    }
}
