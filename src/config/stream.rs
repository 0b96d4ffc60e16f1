//! Retention and cursor configuration

use serde::{Deserialize, Serialize};

use super::defaults::{
    DEFAULT_CURSOR_IDLE_TIMEOUT_MS, DEFAULT_MAX_READ_LIMIT, DEFAULT_MAX_RETENTION_HOURS,
    DEFAULT_MIN_RETENTION_HOURS, DEFAULT_REAPER_INTERVAL_SECS, DEFAULT_RETENTION_HOURS,
};

/// Retention configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Seconds between reaper sweeps
    pub reaper_interval_secs: u64,

    /// Smallest retention a stream may be created with
    pub min_retention_hours: u32,

    /// Largest retention a stream may be created with
    pub max_retention_hours: u32,

    /// Retention used when the create call does not name one
    pub default_retention_hours: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            reaper_interval_secs: DEFAULT_REAPER_INTERVAL_SECS,
            min_retention_hours: DEFAULT_MIN_RETENTION_HOURS,
            max_retention_hours: DEFAULT_MAX_RETENTION_HOURS,
            default_retention_hours: DEFAULT_RETENTION_HOURS,
        }
    }
}

/// Cursor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorConfig {
    /// A simple cursor not used for this long is rejected as expired
    pub idle_timeout_ms: u64,

    /// Largest `limit` a read may ask for
    pub max_read_limit: usize,

    /// HMAC secret for cursor tokens. Generated at startup when unset, in
    /// which case tokens do not survive a restart.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: DEFAULT_CURSOR_IDLE_TIMEOUT_MS,
            max_read_limit: DEFAULT_MAX_READ_LIMIT,
            secret: None,
        }
    }
}
