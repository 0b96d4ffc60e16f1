//! Configuration merging utilities
//!
//! This module merges configuration file values into command-line arguments,
//! where CLI arguments take precedence.

use super::args::BrokerArgs;
use super::defaults::*;
use super::file::ConfigFile;

/// Merge configuration file values with CLI arguments.
/// Only applies config file values where the CLI is still at its default.
pub fn merge_config_with_args(mut args: BrokerArgs, config: &ConfigFile) -> BrokerArgs {
    macro_rules! apply_if_default {
        ($field:ident, $config_val:expr, $default:expr) => {
            if let Some(val) = $config_val {
                if args.$field == $default {
                    args.$field = val;
                }
            }
        };
    }

    macro_rules! apply_if_default_string {
        ($field:ident, $config_val:expr, $default:expr) => {
            if let Some(ref val) = $config_val {
                if args.$field == $default {
                    args.$field = val.clone();
                }
            }
        };
    }

    // Server section
    if let Some(ref path) = config.server.data_dir {
        if args.data_dir == std::path::Path::new(DEFAULT_DATA_DIR) {
            args.data_dir = path.clone();
        }
    }
    apply_if_default!(in_memory, config.server.in_memory, DEFAULT_IN_MEMORY);
    apply_if_default_string!(log_level, config.server.log_level, DEFAULT_LOG_LEVEL);
    apply_if_default_string!(
        endpoint_base,
        config.server.endpoint_base,
        DEFAULT_ENDPOINT_BASE
    );

    // Storage section
    apply_if_default!(
        segment_max_bytes,
        config.storage.segment_max_bytes,
        DEFAULT_SEGMENT_MAX_BYTES
    );
    apply_if_default!(
        sync_on_append,
        config.storage.sync_on_append,
        DEFAULT_SYNC_ON_APPEND
    );
    apply_if_default!(
        max_message_bytes,
        config.storage.max_message_bytes,
        DEFAULT_MAX_MESSAGE_BYTES
    );
    apply_if_default!(
        max_key_bytes,
        config.storage.max_key_bytes,
        DEFAULT_MAX_KEY_BYTES
    );
    apply_if_default!(
        max_batch_messages,
        config.storage.max_batch_messages,
        DEFAULT_MAX_BATCH_MESSAGES
    );
    apply_if_default!(
        max_partitions,
        config.storage.max_partitions,
        DEFAULT_MAX_PARTITIONS
    );

    // Retention section
    apply_if_default!(
        reaper_interval_secs,
        config.retention.reaper_interval_secs,
        DEFAULT_REAPER_INTERVAL_SECS
    );
    apply_if_default!(
        min_retention_hours,
        config.retention.min_retention_hours,
        DEFAULT_MIN_RETENTION_HOURS
    );
    apply_if_default!(
        max_retention_hours,
        config.retention.max_retention_hours,
        DEFAULT_MAX_RETENTION_HOURS
    );
    apply_if_default!(
        default_retention_hours,
        config.retention.default_retention_hours,
        DEFAULT_RETENTION_HOURS
    );

    // Cursor section
    apply_if_default!(
        cursor_idle_timeout_ms,
        config.cursor.idle_timeout_ms,
        DEFAULT_CURSOR_IDLE_TIMEOUT_MS
    );
    apply_if_default!(
        max_read_limit,
        config.cursor.max_read_limit,
        DEFAULT_MAX_READ_LIMIT
    );
    if args.cursor_secret.is_none() {
        args.cursor_secret = config.cursor.secret.clone();
    }

    // Retry section
    apply_if_default!(
        retry_max_attempts,
        config.retry.max_attempts,
        DEFAULT_RETRY_MAX_ATTEMPTS
    );
    apply_if_default!(
        retry_initial_backoff_ms,
        config.retry.initial_backoff_ms,
        DEFAULT_RETRY_INITIAL_BACKOFF_MS
    );
    apply_if_default!(
        retry_max_backoff_ms,
        config.retry.max_backoff_ms,
        DEFAULT_RETRY_MAX_BACKOFF_MS
    );
    apply_if_default!(
        retry_backoff_multiplier,
        config.retry.backoff_multiplier,
        DEFAULT_RETRY_BACKOFF_MULTIPLIER
    );

    args
}
