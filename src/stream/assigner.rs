//! Partition assignment
//!
//! Keyed messages go to `crc32(key) % partitions`, so every message with
//! the same key lands in the same partition for the lifetime of the stream
//! (the partition count never changes). Unkeyed messages rotate across
//! partitions.

use std::sync::atomic::{AtomicU32, Ordering};

/// Stable partition for `key` among `partition_count` partitions
pub fn partition_for_key(key: &[u8], partition_count: u32) -> u32 {
    crc32fast::hash(key) % partition_count.max(1)
}

/// Picks the partition for each message of one stream
#[derive(Debug)]
pub struct PartitionAssigner {
    partition_count: u32,
    next: AtomicU32,
}

impl PartitionAssigner {
    pub fn new(partition_count: u32) -> Self {
        Self {
            partition_count: partition_count.max(1),
            next: AtomicU32::new(0),
        }
    }

    pub fn partition_count(&self) -> u32 {
        self.partition_count
    }

    /// Partition for a message with the given routing key; `None` rotates
    pub fn assign(&self, routing_key: Option<&[u8]>) -> u32 {
        match routing_key {
            Some(key) => partition_for_key(key, self.partition_count),
            None => self.next.fetch_add(1, Ordering::Relaxed) % self.partition_count,
        }
    }
}
