//! Property-based tests for brook
//!
//! Uses proptest to check the log, assignment and cursor invariants across
//! randomly generated batches.

mod common;

use brook::storage::PutEntry;
use brook::stream::{partition_for_key, PartitionAssigner};
use bytes::Bytes;
use common::*;
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Strategy for message values
fn arbitrary_value() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512)
}

/// Strategy for non-empty keys within the default key limit
fn arbitrary_key() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..64)
}

fn arbitrary_entry() -> impl Strategy<Value = PutEntry> {
    (prop::option::of(arbitrary_key()), arbitrary_value()).prop_map(|(key, value)| match key {
        Some(key) => PutEntry::keyed(key, value),
        None => PutEntry::unkeyed(value),
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: per partition, offsets handed out are 0, 1, 2, ... with no gaps
    #[test]
    fn offsets_are_gap_free_per_partition(
        partitions in 1..6u32,
        batches in prop::collection::vec(prop::collection::vec(arbitrary_entry(), 1..20), 1..8)
    ) {
        let t = TestBroker::in_memory();
        let stream_id = t.create_stream("prop", partitions);
        let client = t.client();

        let mut offsets: BTreeMap<u32, Vec<i64>> = BTreeMap::new();
        for batch in batches {
            let result = client.put_messages(&stream_id, batch).unwrap();
            for entry in result.entries {
                prop_assert!(entry.partition < partitions);
                offsets.entry(entry.partition).or_default().push(entry.offset);
            }
        }

        for (partition, offsets) in offsets {
            let expected: Vec<i64> = (0..offsets.len() as i64).collect();
            prop_assert_eq!(offsets, expected, "partition {}", partition);
        }
    }

    /// Property: equal keys always map to the same partition
    #[test]
    fn key_assignment_is_stable(
        key in arbitrary_key(),
        partitions in 1..64u32,
        unkeyed_before in 0..10usize
    ) {
        let expected = partition_for_key(&key, partitions);
        prop_assert!(expected < partitions);

        let assigner = PartitionAssigner::new(partitions);
        for _ in 0..unkeyed_before {
            assigner.assign(None);
        }
        prop_assert_eq!(assigner.assign(Some(key.as_slice())), expected);
        prop_assert_eq!(assigner.assign(Some(key.clone().as_slice())), expected);
    }

    /// Property: a TRIM_HORIZON cursor read to exhaustion returns every
    /// message exactly once, in offset order, whatever the read size
    #[test]
    fn trim_horizon_read_returns_everything_once(
        values in prop::collection::vec(arbitrary_value(), 1..60),
        limit in 1..16usize
    ) {
        let t = TestBroker::in_memory();
        let stream_id = t.create_stream("prop", 1);
        let client = t.client();

        for chunk in values.chunks(7) {
            let entries = chunk.iter().cloned().map(PutEntry::unkeyed).collect();
            client.put_messages(&stream_id, entries).unwrap();
        }

        let messages = drain(&client, trim_horizon(&client, &stream_id, 0), limit);
        prop_assert_eq!(messages.len(), values.len());
        for (i, (message, value)) in messages.iter().zip(&values).enumerate() {
            prop_assert_eq!(message.offset, i as i64);
            prop_assert_eq!(&message.value, &Bytes::from(value.clone()));
        }
    }

    /// Property: after a retention sweep only messages inside the window are
    /// readable, and their offsets are unchanged
    #[test]
    fn retention_keeps_exactly_the_recent_suffix(
        old in 0..20usize,
        recent in 0..20usize
    ) {
        let t = TestBroker::in_memory();
        let stream_id = t.create_stream("prop", 1);
        let client = t.client();

        for i in 0..old {
            client.put_messages(&stream_id, vec![PutEntry::unkeyed(format!("old-{}", i))]).unwrap();
        }
        t.clock.advance(HOUR * 30);
        for i in 0..recent {
            client.put_messages(&stream_id, vec![PutEntry::unkeyed(format!("new-{}", i))]).unwrap();
        }

        let report = t.broker.reaper().run_once();
        prop_assert_eq!(report.messages_deleted, old);

        let messages = drain(&client, trim_horizon(&client, &stream_id, 0), 8);
        prop_assert_eq!(messages.len(), recent);
        for (i, message) in messages.iter().enumerate() {
            prop_assert_eq!(message.offset, (old + i) as i64);
        }
    }
}
