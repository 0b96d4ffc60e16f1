//! Configuration file support for brook
//!
//! This module provides TOML configuration file parsing. Values are merged
//! with CLI arguments by [`super::merge_config_with_args`].
//!
//! ## Priority Order
//!
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values
//!
//! ## Example Configuration
//!
//! ```toml
//! [server]
//! data_dir = "/var/lib/brook"
//! log_level = "info"
//!
//! [storage]
//! segment_max_bytes = 67108864
//! sync_on_append = true
//!
//! [retention]
//! reaper_interval_secs = 300
//!
//! [cursor]
//! idle_timeout_ms = 300000
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{BrookError, Result};

/// Root configuration structure for TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub server: ServerSection,
    pub storage: StorageSection,
    pub retention: RetentionSection,
    pub cursor: CursorSection,
    pub retry: RetrySection,
}

/// `[server]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub data_dir: Option<PathBuf>,
    pub in_memory: Option<bool>,
    /// trace, debug, info, warn, error
    pub log_level: Option<String>,
    pub endpoint_base: Option<String>,
}

/// `[storage]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub segment_max_bytes: Option<u64>,
    pub sync_on_append: Option<bool>,
    pub max_message_bytes: Option<usize>,
    pub max_key_bytes: Option<usize>,
    pub max_batch_messages: Option<usize>,
    pub max_partitions: Option<u32>,
}

/// `[retention]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSection {
    pub reaper_interval_secs: Option<u64>,
    pub min_retention_hours: Option<u32>,
    pub max_retention_hours: Option<u32>,
    pub default_retention_hours: Option<u32>,
}

/// `[cursor]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CursorSection {
    pub idle_timeout_ms: Option<u64>,
    pub max_read_limit: Option<usize>,
    pub secret: Option<String>,
}

/// `[retry]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            BrookError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        Self::parse(&contents)
            .map_err(|e| BrookError::Config(format!("Failed to parse config file {:?}: {}", path, e)))
    }

    /// Parse configuration from a TOML string
    pub fn parse(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Try to load configuration from default locations
    ///
    /// Searches in order:
    /// 1. ./brook.toml
    /// 2. /etc/brook/brook.toml
    pub fn load_default() -> Option<Self> {
        let default_paths = [
            PathBuf::from("brook.toml"),
            PathBuf::from("/etc/brook/brook.toml"),
        ];

        for path in default_paths.iter() {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        tracing::info!("Loaded configuration from {:?}", path);
                        return Some(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        None
    }

    /// Generate an annotated example configuration file
    pub fn generate_example() -> String {
        r#"# brook configuration file
# Copy to brook.toml and customize as needed
#
# Configuration priority (highest to lowest):
# 1. Command-line arguments
# 2. Environment variables (BROOK_*)
# 3. This configuration file
# 4. Default values

[server]
# Data directory for storage
data_dir = "./data"

# Keep everything in memory (nothing written to data_dir)
in_memory = false

# Log level (trace, debug, info, warn, error)
log_level = "info"

# Base used to build each stream's messages endpoint
endpoint_base = "brook://localhost:10000"

[storage]
# Active segment rolls at this size (64 MB)
segment_max_bytes = 67108864

# fsync each batch before acknowledging it
sync_on_append = false

# Request limits
max_message_bytes = 1048576
max_key_bytes = 256
max_batch_messages = 1000
max_partitions = 50

[retention]
# Seconds between retention sweeps
reaper_interval_secs = 300

# Allowed retention range for new streams, in hours
min_retention_hours = 24
max_retention_hours = 168
default_retention_hours = 24

[cursor]
# Simple cursors unused for this long are rejected
idle_timeout_ms = 300000

# Largest limit a single read may request
max_read_limit = 10000

# Secret used to sign cursor tokens (at least 16 bytes).
# When unset a random secret is generated and tokens do not survive restarts.
# secret = "change-me-to-a-long-random-string"

[retry]
# Transient storage failures are retried with exponential backoff
max_attempts = 5
initial_backoff_ms = 10
max_backoff_ms = 1000
backoff_multiplier = 2.0
"#
        .to_string()
    }
}
