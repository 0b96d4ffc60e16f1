//! Cursors
//!
//! Two kinds of cursor:
//!
//! - **simple**: the position lives in the token. Each read hands back a new
//!   token; tokens idle for longer than the configured timeout expire.
//! - **group**: the position lives on the server, keyed by
//!   (stream, group, instance, partition). With commit-on-get the position
//!   advances as part of each read; otherwise the consumer commits
//!   explicitly. Positions only move forward, except when a cursor is
//!   created again.
//!
//! A position below a partition's retention floor is moved up to the floor
//! when resolved.

mod group;
mod manager;
mod offset_store;
mod token;

pub use group::{ConsumerGroup, GroupCursorState};
pub use manager::CursorManager;
pub use offset_store::GroupStore;
pub use token::CursorToken;

use crate::error::{BrookError, Result};
use crate::storage::Message;
use serde::{Deserialize, Serialize};

/// Longest group or instance name
pub const MAX_GROUP_NAME_LENGTH: usize = 255;

/// Where a new cursor starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CursorPosition {
    /// Oldest retained message
    TrimHorizon,
    /// Tail; only messages appended after creation are read
    Latest,
    /// First message stamped at or after this time (ms since epoch)
    AtTime(i64),
    /// This exact offset (simple cursors only)
    AtOffset(i64),
    /// The offset after this one (simple cursors only)
    AfterOffset(i64),
}

impl CursorPosition {
    fn allowed_for_groups(&self) -> bool {
        matches!(
            self,
            CursorPosition::TrimHorizon | CursorPosition::Latest | CursorPosition::AtTime(_)
        )
    }
}

/// Group scope of a cursor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupBinding {
    pub group: String,
    pub instance: String,
    #[serde(default = "default_commit_on_get")]
    pub commit_on_get: bool,
}

fn default_commit_on_get() -> bool {
    true
}

impl GroupBinding {
    pub fn new(group: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            instance: instance.into(),
            commit_on_get: true,
        }
    }

    /// Require explicit commits instead of advancing on every read
    pub fn manual_commit(mut self) -> Self {
        self.commit_on_get = false;
        self
    }
}

/// Parameters for a new cursor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCursorDetails {
    pub partition: u32,
    pub position: CursorPosition,
    #[serde(default)]
    pub group: Option<GroupBinding>,
}

impl CreateCursorDetails {
    pub fn simple(partition: u32, position: CursorPosition) -> Self {
        Self {
            partition,
            position,
            group: None,
        }
    }

    pub fn group(partition: u32, position: CursorPosition, binding: GroupBinding) -> Self {
        Self {
            partition,
            position,
            group: Some(binding),
        }
    }
}

/// A cursor resolved to a concrete read position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCursor {
    pub stream_id: String,
    pub partition: u32,
    pub offset: i64,
    /// (group, instance) for group cursors
    pub group: Option<(String, String)>,
}

/// Result of a read
#[derive(Debug, Clone)]
pub struct GetMessagesResult {
    pub messages: Vec<Message>,
    /// Token to use for the next read
    pub next_cursor: CursorToken,
}

/// Check a group or instance name: 1-255 characters of `[A-Za-z0-9._-]`
pub fn validate_group_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_GROUP_NAME_LENGTH {
        return Err(BrookError::invalid(format!(
            "{} name must be 1 to {} characters",
            kind, MAX_GROUP_NAME_LENGTH
        )));
    }
    if name == "." || name == ".." {
        return Err(BrookError::invalid(format!("{} name '{}' is reserved", kind, name)));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
    {
        return Err(BrookError::invalid(format!(
            "{} name '{}' contains invalid characters",
            kind, name
        )));
    }
    Ok(())
}
