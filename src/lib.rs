#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

//! # Brook
//!
//! Brook is a durable, partitioned message-streaming broker with
//! cursor-based consumption.
//!
//! ## Features
//!
//! - **Partitioned streams**: a fixed number of append-only partition logs
//!   per stream, with per-key ordering through stable key hashing
//! - **Cursors**: opaque signed tokens, either client-held (simple) or
//!   server-held per consumer group member (group), with commit-on-get
//! - **Time-based retention**: a background reaper trims messages older than
//!   each stream's retention window
//! - **Durable storage**: CRC-checked segment files with crash recovery, or a
//!   pure in-memory mode with the same semantics
//!
//! ## Library Usage
//!
//! ```
//! use brook::broker::Broker;
//! use brook::cursor::{CreateCursorDetails, CursorPosition, GroupBinding};
//! use brook::storage::PutEntry;
//! use brook::stream::CreateStreamDetails;
//!
//! fn main() -> brook::Result<()> {
//!     let broker = Broker::in_memory()?;
//!     let stream = broker
//!         .admin()
//!         .create_stream(CreateStreamDetails::new("events", 1).with_retention_hours(48))?;
//!
//!     let client = broker.client();
//!     client.put_messages(&stream.id, vec![PutEntry::unkeyed("a"), PutEntry::unkeyed("b")])?;
//!
//!     let cursor = client.create_cursor(
//!         &stream.id,
//!         CreateCursorDetails::group(0, CursorPosition::TrimHorizon, GroupBinding::new("workers", "w-1")),
//!     )?;
//!     let read = client.get_messages(&cursor, 10)?;
//!     assert_eq!(read.messages.len(), 2);
//!
//!     // The group position advanced with the read
//!     assert!(client.get_messages(&cursor, 10)?.messages.is_empty());
//!     Ok(())
//! }
//! ```
//!
//! ## Running the Server
//!
//! ```bash
//! # Persistent broker under ./data
//! $ ./brook
//!
//! # In-memory demo
//! $ ./brook --playground
//! ```
//!
//! ## Architecture
//!
//! - [`broker`]: the [`Broker`] with its control-plane and data-plane surfaces
//! - [`stream`]: stream registry, lifecycle and partition assignment
//! - [`storage`]: partition logs, segment files and the retention reaper
//! - [`cursor`]: cursor tokens, consumer groups and group positions
//! - [`config`]: broker configuration and CLI arguments
//! - [`error`]: error types and Result alias

pub mod broker;
pub mod clock;
pub mod config;
pub mod cursor;
pub mod error;
pub mod storage;
pub mod stream;

pub use broker::{Broker, BrokerStats, StreamAdmin, StreamClient};
pub use config::{BrokerArgs, BrokerConfig};
pub use error::{BrookError, ErrorKind, Result};
