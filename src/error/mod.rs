//! Error types for brook
//!
//! This module defines the main error type used throughout the broker and
//! classifies every failure into the small taxonomy clients program against
//! (see [`ErrorKind`]).

use thiserror::Error;

mod domain;

pub use domain::StorageError;

use crate::stream::StreamState;

/// Result type alias for broker operations
pub type Result<T> = std::result::Result<T, BrookError>;

/// Main error type for brook
#[derive(Error, Debug)]
pub enum BrookError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Stream not found: {0}")]
    StreamNotFound(String),

    #[error("Cursor not found: {0}")]
    CursorNotFound(String),

    #[error("Consumer group not found: stream={0}, group={1}")]
    GroupNotFound(String, String),

    #[error("Stream name already exists: compartment={compartment}, name={name}")]
    DuplicateName { compartment: String, name: String },

    #[error("Stream {stream_id} is not active (state: {state})")]
    StreamNotActive {
        stream_id: String,
        state: StreamState,
    },

    #[error("Cursor expired: idle for {idle_ms}ms, timeout is {timeout_ms}ms")]
    CursorExpired { idle_ms: i64, timeout_ms: i64 },

    #[error("Storage exhausted: {0}")]
    StorageExhausted(String),

    #[error("Storage unavailable after {attempts} attempts: {message}")]
    Unavailable { attempts: u32, message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Client-facing classification of a [`BrookError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad partition count, malformed key, oversize message, bad limit
    InvalidArgument,
    /// Unknown stream, cursor or consumer group
    NotFound,
    /// A stream with the same name already exists in the compartment
    Conflict,
    /// Operation attempted outside the ACTIVE state
    StreamNotActive,
    /// Idle simple cursor past its timeout
    CursorExpired,
    /// Storage is full; fatal, never retried
    StorageExhausted,
    /// Transient storage failure that outlived the internal retries
    Unavailable,
    /// Anything else (corruption, configuration, serialization)
    Internal,
}

impl ErrorKind {
    /// Stable string code for the error kind
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Conflict => "DuplicateName",
            ErrorKind::StreamNotActive => "StreamNotActive",
            ErrorKind::CursorExpired => "CursorExpired",
            ErrorKind::StorageExhausted => "StorageExhausted",
            ErrorKind::Unavailable => "Unavailable",
            ErrorKind::Internal => "InternalError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl BrookError {
    /// Classify this error for clients
    pub fn kind(&self) -> ErrorKind {
        match self {
            BrookError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            BrookError::StreamNotFound(_)
            | BrookError::CursorNotFound(_)
            | BrookError::GroupNotFound(..) => ErrorKind::NotFound,
            BrookError::DuplicateName { .. } => ErrorKind::Conflict,
            BrookError::StreamNotActive { .. } => ErrorKind::StreamNotActive,
            BrookError::CursorExpired { .. } => ErrorKind::CursorExpired,
            BrookError::StorageExhausted(_) => ErrorKind::StorageExhausted,
            BrookError::Unavailable { .. } => ErrorKind::Unavailable,
            BrookError::Storage(_)
            | BrookError::Io(_)
            | BrookError::Serialization(_)
            | BrookError::Config(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if a client may retry the same call later
    pub fn is_retriable(&self) -> bool {
        match self {
            BrookError::Unavailable { .. } => true,
            // A stream still being created becomes usable shortly.
            BrookError::StreamNotActive { state, .. } => *state == StreamState::Creating,
            _ => false,
        }
    }

    /// Create an invalid-argument error
    pub fn invalid(detail: impl Into<String>) -> Self {
        BrookError::InvalidArgument(detail.into())
    }

    /// Create a configuration error for a named setting
    pub fn config(setting: &str, reason: impl Into<String>) -> Self {
        BrookError::Config(format!("{}: {}", setting, reason.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_io_error_display() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: BrookError = io_err.into();
        assert!(err.to_string().contains("IO error"));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_stream_not_found_display() {
        let err = BrookError::StreamNotFound("abc".to_string());
        assert_eq!(err.to_string(), "Stream not found: abc");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_duplicate_name_is_conflict() {
        let err = BrookError::DuplicateName {
            compartment: "default".to_string(),
            name: "orders".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.kind().code(), "DuplicateName");
        assert!(err.to_string().contains("orders"));
    }

    #[test]
    fn test_not_active_retriable_only_while_creating() {
        let creating = BrookError::StreamNotActive {
            stream_id: "s".to_string(),
            state: StreamState::Creating,
        };
        let deleting = BrookError::StreamNotActive {
            stream_id: "s".to_string(),
            state: StreamState::Deleting,
        };
        assert!(creating.is_retriable());
        assert!(!deleting.is_retriable());
        assert_eq!(deleting.kind(), ErrorKind::StreamNotActive);
    }

    #[test]
    fn test_unavailable_is_retriable() {
        let err = BrookError::Unavailable {
            attempts: 5,
            message: "disk busy".to_string(),
        };
        assert!(err.is_retriable());
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }

    #[test]
    fn test_exhausted_is_not_retriable() {
        let err = BrookError::StorageExhausted("no space left".to_string());
        assert!(!err.is_retriable());
        assert_eq!(err.kind(), ErrorKind::StorageExhausted);
    }

    #[test]
    fn test_config_builder() {
        let err = BrookError::config("retry.max_attempts", "must be > 0");
        assert_eq!(
            err.to_string(),
            "Configuration error: retry.max_attempts: must be > 0"
        );
    }
}
