//! Command-line arguments for the brook server
//!
//! This module defines the CLI arguments structure using clap.

use clap::Parser;
use std::path::PathBuf;

use super::defaults::*;

/// Command-line arguments for the brook server
#[derive(Parser, Debug, Clone)]
#[command(name = "brook")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "A durable, partitioned message-streaming broker")]
pub struct BrokerArgs {
    /// Path to configuration file (TOML format).
    /// If not specified, looks for brook.toml in the current directory
    /// and then /etc/brook/
    #[arg(short, long, env = "BROOK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Generate example configuration file and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for storage
    #[arg(long, env = "BROOK_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Keep everything in memory (nothing is written to the data directory)
    #[arg(long, env = "BROOK_IN_MEMORY", default_value_t = DEFAULT_IN_MEMORY)]
    pub in_memory: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "BROOK_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,

    /// Base used to build each stream's messages endpoint
    #[arg(long, env = "BROOK_ENDPOINT_BASE", default_value = DEFAULT_ENDPOINT_BASE)]
    pub endpoint_base: String,

    /// Maximum segment size in bytes
    #[arg(long, env = "BROOK_SEGMENT_MAX_BYTES", default_value_t = DEFAULT_SEGMENT_MAX_BYTES)]
    pub segment_max_bytes: u64,

    /// fsync every batch before acknowledging it
    #[arg(long, env = "BROOK_SYNC_ON_APPEND", default_value_t = DEFAULT_SYNC_ON_APPEND)]
    pub sync_on_append: bool,

    /// Maximum message value size in bytes
    #[arg(long, env = "BROOK_MAX_MESSAGE_BYTES", default_value_t = DEFAULT_MAX_MESSAGE_BYTES)]
    pub max_message_bytes: usize,

    /// Maximum message key size in bytes
    #[arg(long, env = "BROOK_MAX_KEY_BYTES", default_value_t = DEFAULT_MAX_KEY_BYTES)]
    pub max_key_bytes: usize,

    /// Maximum entries in one put request
    #[arg(long, env = "BROOK_MAX_BATCH_MESSAGES", default_value_t = DEFAULT_MAX_BATCH_MESSAGES)]
    pub max_batch_messages: usize,

    /// Maximum partitions per stream
    #[arg(long, env = "BROOK_MAX_PARTITIONS", default_value_t = DEFAULT_MAX_PARTITIONS)]
    pub max_partitions: u32,

    /// Seconds between retention sweeps
    #[arg(long, env = "BROOK_REAPER_INTERVAL_SECS", default_value_t = DEFAULT_REAPER_INTERVAL_SECS)]
    pub reaper_interval_secs: u64,

    /// Smallest retention a stream may use, in hours
    #[arg(long, env = "BROOK_MIN_RETENTION_HOURS", default_value_t = DEFAULT_MIN_RETENTION_HOURS)]
    pub min_retention_hours: u32,

    /// Largest retention a stream may use, in hours
    #[arg(long, env = "BROOK_MAX_RETENTION_HOURS", default_value_t = DEFAULT_MAX_RETENTION_HOURS)]
    pub max_retention_hours: u32,

    /// Retention applied when a stream is created without one, in hours
    #[arg(long, env = "BROOK_DEFAULT_RETENTION_HOURS", default_value_t = DEFAULT_RETENTION_HOURS)]
    pub default_retention_hours: u32,

    /// Idle timeout for simple cursors in milliseconds
    #[arg(long, env = "BROOK_CURSOR_IDLE_TIMEOUT_MS", default_value_t = DEFAULT_CURSOR_IDLE_TIMEOUT_MS)]
    pub cursor_idle_timeout_ms: u64,

    /// Largest limit a single read may request
    #[arg(long, env = "BROOK_MAX_READ_LIMIT", default_value_t = DEFAULT_MAX_READ_LIMIT)]
    pub max_read_limit: usize,

    /// Secret used to sign cursor tokens (at least 16 bytes).
    /// A random secret is generated when unset.
    #[arg(long, env = "BROOK_CURSOR_SECRET", hide_env_values = true)]
    pub cursor_secret: Option<String>,

    /// Attempts for transient storage failures
    #[arg(long, env = "BROOK_RETRY_MAX_ATTEMPTS", default_value_t = DEFAULT_RETRY_MAX_ATTEMPTS)]
    pub retry_max_attempts: u32,

    /// First retry delay in milliseconds
    #[arg(long, env = "BROOK_RETRY_INITIAL_BACKOFF_MS", default_value_t = DEFAULT_RETRY_INITIAL_BACKOFF_MS)]
    pub retry_initial_backoff_ms: u64,

    /// Retry delay ceiling in milliseconds
    #[arg(long, env = "BROOK_RETRY_MAX_BACKOFF_MS", default_value_t = DEFAULT_RETRY_MAX_BACKOFF_MS)]
    pub retry_max_backoff_ms: u64,

    /// Multiplier applied to the retry delay after each attempt
    #[arg(long, env = "BROOK_RETRY_BACKOFF_MULTIPLIER", default_value_t = DEFAULT_RETRY_BACKOFF_MULTIPLIER)]
    pub retry_backoff_multiplier: f64,

    /// Playground mode: in-memory storage plus a demo producer/consumer run
    #[arg(long, env = "BROOK_PLAYGROUND")]
    pub playground: bool,
}
