//! Default constants for brook configuration
//!
//! These constants define the default values used throughout the configuration
//! system when no explicit value is provided.

/// Default data directory
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default base for per-stream messages endpoints
pub const DEFAULT_ENDPOINT_BASE: &str = "brook://localhost:10000";

/// Compartment used when a stream is created without one
pub const DEFAULT_COMPARTMENT: &str = "default";

/// Default in-memory mode
pub const DEFAULT_IN_MEMORY: bool = false;

/// Default segment max size in bytes (64 MB)
pub const DEFAULT_SEGMENT_MAX_BYTES: u64 = 64 * 1024 * 1024;

/// Default fsync-per-append setting
pub const DEFAULT_SYNC_ON_APPEND: bool = false;

/// Default max message value size in bytes (1 MB)
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Default max message key size in bytes
pub const DEFAULT_MAX_KEY_BYTES: usize = 256;

/// Default max entries in one put request
pub const DEFAULT_MAX_BATCH_MESSAGES: usize = 1_000;

/// Default max partitions per stream
pub const DEFAULT_MAX_PARTITIONS: u32 = 50;

/// Default lower bound for stream retention (1 day)
pub const DEFAULT_MIN_RETENTION_HOURS: u32 = 24;

/// Default upper bound for stream retention (7 days)
pub const DEFAULT_MAX_RETENTION_HOURS: u32 = 168;

/// Retention applied when a stream is created without one
pub const DEFAULT_RETENTION_HOURS: u32 = 24;

/// Default retention reaper interval (5 minutes)
pub const DEFAULT_REAPER_INTERVAL_SECS: u64 = 300;

/// Default idle timeout for simple cursors (5 minutes)
pub const DEFAULT_CURSOR_IDLE_TIMEOUT_MS: u64 = 5 * 60 * 1000;

/// Default maximum `limit` accepted by a read
pub const DEFAULT_MAX_READ_LIMIT: usize = 10_000;

/// Minimum length of a configured cursor signing secret
pub const MIN_CURSOR_SECRET_BYTES: usize = 16;

/// Default attempts for transient storage failures
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 5;

/// Default first backoff delay in milliseconds
pub const DEFAULT_RETRY_INITIAL_BACKOFF_MS: u64 = 10;

/// Default backoff ceiling in milliseconds
pub const DEFAULT_RETRY_MAX_BACKOFF_MS: u64 = 1_000;

/// Default backoff multiplier
pub const DEFAULT_RETRY_BACKOFF_MULTIPLIER: f64 = 2.0;
