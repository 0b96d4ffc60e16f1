//! Shared test fixtures for brook integration tests
//!
//! # Usage
//!
//! In your test file, add:
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use brook::clock::ManualClock;
use brook::config::{BrokerConfig, RetryConfig};
use brook::cursor::{CreateCursorDetails, CursorPosition, CursorToken};
use brook::storage::{Message, PutEntry};
use brook::stream::CreateStreamDetails;
use brook::{Broker, StreamClient};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Mid-November 2023, in milliseconds
pub const START_MS: i64 = 1_700_000_000_000;

pub const HOUR: Duration = Duration::from_secs(60 * 60);

pub const TEST_SECRET: &str = "integration-test-cursor-secret";

/// A broker driven by a manual clock
pub struct TestBroker {
    pub clock: Arc<ManualClock>,
    pub broker: Broker,
}

impl TestBroker {
    pub fn in_memory() -> Self {
        Self::with_config(BrokerConfig::in_memory())
    }

    pub fn persistent(dir: &Path) -> Self {
        Self::with_config(persistent_config(dir))
    }

    pub fn with_config(config: BrokerConfig) -> Self {
        let clock = Arc::new(ManualClock::new(START_MS));
        Self::with_clock(config, clock)
    }

    pub fn with_clock(config: BrokerConfig, clock: Arc<ManualClock>) -> Self {
        let broker = Broker::with_clock(config.with_cursor_secret(TEST_SECRET), clock.clone())
            .expect("broker should open");
        Self { clock, broker }
    }

    pub fn client(&self) -> StreamClient {
        self.broker.client()
    }

    /// Create a stream and return its id
    pub fn create_stream(&self, name: &str, partitions: u32) -> String {
        self.broker
            .admin()
            .create_stream(CreateStreamDetails::new(name, partitions))
            .expect("stream should be created")
            .id
    }
}

/// Persistent configuration with small segments and no retry delays
pub fn persistent_config(dir: &Path) -> BrokerConfig {
    BrokerConfig::persistent(dir)
        .with_segment_max_bytes(512)
        .with_retry(RetryConfig::immediate(3))
}

pub fn keyed(key: &str, value: &str) -> PutEntry {
    PutEntry::keyed(key.to_string(), value.to_string())
}

/// Simple TRIM_HORIZON cursor on one partition
pub fn trim_horizon(client: &StreamClient, stream_id: &str, partition: u32) -> CursorToken {
    client
        .create_cursor(
            stream_id,
            CreateCursorDetails::simple(partition, CursorPosition::TrimHorizon),
        )
        .expect("cursor should be created")
}

/// Follow a cursor until a read comes back empty
pub fn drain(client: &StreamClient, token: CursorToken, limit: usize) -> Vec<Message> {
    let mut messages = Vec::new();
    let mut next = token;
    loop {
        let read = client
            .get_messages(&next, limit)
            .expect("read should succeed");
        if read.messages.is_empty() {
            return messages;
        }
        messages.extend(read.messages);
        next = read.next_cursor;
    }
}

pub fn values(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .map(|m| String::from_utf8_lossy(&m.value).into_owned())
        .collect()
}
