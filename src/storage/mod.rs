//! Storage engine for brook
//!
//! Each partition is a [`PartitionLog`]: an append-only run of messages with
//! gap-free offsets. Durable partitions write length-prefixed, CRC-checked
//! frames to segment files (see [`segment`]) and checkpoint their retention
//! floor; in-memory partitions keep the same semantics without files.
//!
//! Transient I/O failures are retried by [`RetryPolicy`]; expired messages
//! are trimmed by the [`RetentionReaper`].

pub mod checkpoint;
pub mod message;
pub mod partition_log;
pub mod retention;
pub mod retry;
pub mod segment;

pub use message::{Message, PutEntry, PutMessagesResult, PutResultEntry};
pub use partition_log::{Appended, LogSlice, PartitionLog};
pub use retention::{ReapReport, RetentionReaper};
pub use retry::RetryPolicy;
