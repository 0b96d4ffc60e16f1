//! Partition log
//!
//! An append-only, offset-addressed sequence of messages. Each partition has
//! exactly one append path, guarded by its own writer mutex; offsets are
//! assigned under that mutex so they are gap-free and never reused.
//!
//! # Locking
//!
//! ```text
//! writer: Mutex<LogWriter>    append / trim / destroy (serialized)
//! index:  RwLock<LogIndex>    retained messages, floor, next offset
//! ```
//!
//! Readers only take the index read lock, which writers hold just long
//! enough to publish a finished batch or advance the floor. Segment I/O
//! happens outside the index lock, so reads never wait on disk.
//!
//! Retained messages are served from memory. Segment files exist so that a
//! restart can rebuild the index.

use crate::clock::SharedClock;
use crate::config::StorageConfig;
use crate::error::{Result, StorageError};
use crate::storage::checkpoint::{read_json, remove_dir_if_exists, remove_file_if_exists, write_json};
use crate::storage::message::Message;
use crate::storage::retry::RetryPolicy;
use crate::storage::segment::{encode_frame, list_segments, SegmentFile};
use bytes::{Bytes, BytesMut};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const RETENTION_CHECKPOINT: &str = "retention.json";

/// Messages returned by [`PartitionLog::read`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSlice {
    pub messages: Vec<Message>,
    /// Offset to read from next
    pub next_offset: i64,
}

/// Offset and timestamp assigned to one appended message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appended {
    pub offset: i64,
    pub timestamp_ms: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FloorCheckpoint {
    floor: i64,
}

#[derive(Debug, Default)]
struct LogIndex {
    /// Retained messages; the first one (if any) has offset `floor`
    messages: VecDeque<Message>,
    /// Oldest retained offset
    floor: i64,
    /// Offset the next append receives
    next_offset: i64,
}

#[derive(Debug)]
struct LogWriter {
    /// Timestamps are clamped so they never go backwards within the log
    last_timestamp_ms: i64,
    disk: Option<DiskLog>,
}

#[derive(Debug)]
struct DiskLog {
    dir: PathBuf,
    /// (base offset, path) of sealed segments, oldest first
    sealed: VecDeque<(i64, PathBuf)>,
    active: SegmentFile,
    segment_max_bytes: u64,
    sync_on_append: bool,
}

/// A single partition of a stream
#[derive(Debug)]
pub struct PartitionLog {
    stream_id: String,
    id: u32,
    index: RwLock<LogIndex>,
    writer: Mutex<LogWriter>,
    retry: RetryPolicy,
    clock: SharedClock,
}

impl PartitionLog {
    /// Create a partition that lives only in memory
    pub fn open_in_memory(stream_id: &str, id: u32, clock: SharedClock) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            id,
            index: RwLock::new(LogIndex::default()),
            writer: Mutex::new(LogWriter {
                last_timestamp_ms: i64::MIN,
                disk: None,
            }),
            retry: RetryPolicy::default(),
            clock,
        }
    }

    /// Open (or create) a durable partition in `dir`, recovering any
    /// existing segments and the retention floor.
    pub fn open(
        stream_id: &str,
        id: u32,
        dir: &Path,
        config: &StorageConfig,
        retry: RetryPolicy,
        clock: SharedClock,
    ) -> Result<Self> {
        retry.run("create partition directory", || {
            fs::create_dir_all(dir).map_err(|e| StorageError::io("create directory", dir, e))
        })?;

        let checkpoint_path = dir.join(RETENTION_CHECKPOINT);
        let floor = retry
            .run("read retention checkpoint", || {
                read_json::<FloorCheckpoint>(&checkpoint_path)
            })?
            .unwrap_or_default()
            .floor;

        let segments = retry.run("list segments", || list_segments(dir))?;

        let mut messages = VecDeque::new();
        let mut sealed = VecDeque::new();
        let mut active = None;
        let segment_count = segments.len();

        for (i, (base, path)) in segments.into_iter().enumerate() {
            let (segment, recovered) =
                retry.run("open segment", || SegmentFile::open(&path, base, id))?;
            for msg in recovered {
                if msg.offset < floor {
                    continue;
                }
                let expected = messages
                    .back()
                    .map_or(floor.max(base), |m: &Message| m.offset + 1);
                if msg.offset != expected {
                    return Err(StorageError::corrupt(
                        &path,
                        0,
                        format!("offset {} where {} was expected", msg.offset, expected),
                    )
                    .into());
                }
                messages.push_back(msg);
            }
            if i + 1 == segment_count {
                active = Some(segment);
            } else {
                sealed.push_back((base, path));
            }
        }

        let next_offset = messages
            .back()
            .map(|m| m.offset + 1)
            .unwrap_or(0)
            .max(floor)
            .max(active.as_ref().map_or(0, SegmentFile::base_offset));

        let active = match active {
            Some(segment) => segment,
            None => retry.run("create segment", || SegmentFile::create(dir, next_offset))?,
        };

        let last_timestamp_ms = messages.back().map_or(i64::MIN, |m| m.timestamp_ms);

        info!(
            stream = %stream_id,
            partition = id,
            floor,
            next_offset,
            retained = messages.len(),
            segments = sealed.len() + 1,
            "Partition opened"
        );

        Ok(Self {
            stream_id: stream_id.to_string(),
            id,
            index: RwLock::new(LogIndex {
                messages,
                floor,
                next_offset,
            }),
            writer: Mutex::new(LogWriter {
                last_timestamp_ms,
                disk: Some(DiskLog {
                    dir: dir.to_path_buf(),
                    sealed,
                    active,
                    segment_max_bytes: config.segment_max_bytes,
                    sync_on_append: config.sync_on_append,
                }),
            }),
            retry,
            clock,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Append a single message and return its offset
    pub fn append(&self, key: Option<Bytes>, value: Bytes) -> Result<i64> {
        let appended = self.append_batch(vec![(key, value)])?;
        Ok(appended.first().map_or(0, |a| a.offset))
    }

    /// Append messages as one unit: either all of them become visible with
    /// consecutive offsets, or none do.
    pub fn append_batch(&self, entries: Vec<(Option<Bytes>, Bytes)>) -> Result<Vec<Appended>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut writer = self.writer.lock();
        let first_offset = self.index.read().next_offset;
        let timestamp_ms = self.clock.now_ms().max(writer.last_timestamp_ms);

        let messages: Vec<Message> = entries
            .into_iter()
            .enumerate()
            .map(|(i, (key, value))| {
                Message::new(self.id, first_offset + i as i64, timestamp_ms, key, value)
            })
            .collect();

        if let Some(disk) = writer.disk.as_mut() {
            let mut frames = BytesMut::new();
            for msg in &messages {
                encode_frame(&mut frames, msg);
            }
            disk.maybe_roll(first_offset, frames.len() as u64, &self.retry)?;
            let sync = disk.sync_on_append;
            let active = &mut disk.active;
            self.retry
                .run("append", || active.append_frames(&frames, sync))?;
        }

        writer.last_timestamp_ms = timestamp_ms;

        let count = messages.len();
        let appended = messages
            .iter()
            .map(|m| Appended {
                offset: m.offset,
                timestamp_ms: m.timestamp_ms,
            })
            .collect();

        {
            let mut index = self.index.write();
            index.next_offset += count as i64;
            index.messages.extend(messages);
        }

        debug!(
            stream = %self.stream_id,
            partition = self.id,
            first_offset,
            count,
            "Appended batch"
        );

        Ok(appended)
    }

    /// Read up to `limit` messages starting at the first retained offset
    /// at or after `from_offset`.
    ///
    /// Reading below the floor starts at the floor. Reading at or past the
    /// tail returns nothing with `next_offset` left where the read began.
    pub fn read(&self, from_offset: i64, limit: usize) -> LogSlice {
        let index = self.index.read();
        let start = from_offset.max(index.floor);
        if start >= index.next_offset || limit == 0 {
            return LogSlice {
                messages: Vec::new(),
                next_offset: start,
            };
        }

        let position = (start - index.floor) as usize;
        let messages: Vec<Message> = index
            .messages
            .range(position..)
            .take(limit)
            .cloned()
            .collect();
        let next_offset = messages.last().map_or(start, |m| m.offset + 1);

        LogSlice {
            messages,
            next_offset,
        }
    }

    /// Oldest retained offset (the trim horizon)
    pub fn floor(&self) -> i64 {
        self.index.read().floor
    }

    /// Offset the next appended message will receive
    pub fn next_offset(&self) -> i64 {
        self.index.read().next_offset
    }

    /// Number of retained messages
    pub fn len(&self) -> usize {
        self.index.read().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().messages.is_empty()
    }

    /// Offset of the first retained message with timestamp `>= timestamp_ms`,
    /// or the tail if every retained message is older.
    pub fn offset_for_timestamp(&self, timestamp_ms: i64) -> i64 {
        let index = self.index.read();
        let position = index
            .messages
            .partition_point(|m| m.timestamp_ms < timestamp_ms);
        index.floor + position as i64
    }

    /// Drop the contiguous run of oldest messages stamped before
    /// `boundary_ms` and advance the floor past them. Returns how many
    /// messages were removed.
    pub fn trim_before(&self, boundary_ms: i64) -> Result<usize> {
        let mut writer = self.writer.lock();

        let (count, new_floor) = {
            let index = self.index.read();
            let count = index
                .messages
                .partition_point(|m| m.timestamp_ms < boundary_ms);
            (count, index.floor + count as i64)
        };
        if count == 0 {
            return Ok(0);
        }

        if let Some(disk) = writer.disk.as_ref() {
            let path = disk.dir.join(RETENTION_CHECKPOINT);
            let checkpoint = FloorCheckpoint { floor: new_floor };
            self.retry
                .run("write retention checkpoint", || write_json(&path, &checkpoint))?;
        }

        {
            let mut index = self.index.write();
            index.messages.drain(..count);
            index.floor = new_floor;
        }

        if let Some(disk) = writer.disk.as_mut() {
            disk.delete_segments_below(new_floor);
        }

        info!(
            stream = %self.stream_id,
            partition = self.id,
            removed = count,
            floor = new_floor,
            "Trimmed expired messages"
        );

        Ok(count)
    }

    /// Remove all data of this partition, including its directory
    pub fn destroy(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        if let Some(disk) = writer.disk.take() {
            let dir = disk.dir.clone();
            drop(disk);
            self.retry
                .run("remove partition", || remove_dir_if_exists(&dir))?;
        }

        let mut index = self.index.write();
        index.messages.clear();
        index.floor = index.next_offset;
        Ok(())
    }

    /// Flush the active segment to stable storage
    pub fn sync(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        if let Some(disk) = writer.disk.as_mut() {
            let active = &mut disk.active;
            self.retry.run("sync", || active.sync())?;
        }
        Ok(())
    }
}

impl DiskLog {
    /// Start a new segment at `next_offset` if writing `incoming` bytes
    /// would push a non-empty active segment past its size limit.
    fn maybe_roll(&mut self, next_offset: i64, incoming: u64, retry: &RetryPolicy) -> Result<()> {
        if self.active.size() == 0 || self.active.size() + incoming <= self.segment_max_bytes {
            return Ok(());
        }

        let active = &mut self.active;
        retry.run("seal segment", || active.sync())?;

        let dir = &self.dir;
        let fresh = retry.run("create segment", || SegmentFile::create(dir, next_offset))?;
        let sealed = std::mem::replace(&mut self.active, fresh);

        debug!(
            path = %sealed.path().display(),
            base_offset = sealed.base_offset(),
            size = sealed.size(),
            "Sealed segment"
        );
        self.sealed
            .push_back((sealed.base_offset(), sealed.path().to_path_buf()));
        Ok(())
    }

    /// Delete sealed segments whose every offset is below `floor`.
    /// Failures are left for the next sweep.
    fn delete_segments_below(&mut self, floor: i64) {
        while let Some((_, path)) = self.sealed.front() {
            let next_base = self
                .sealed
                .get(1)
                .map_or(self.active.base_offset(), |(base, _)| *base);
            if next_base > floor {
                break;
            }
            if let Err(e) = remove_file_if_exists(path) {
                warn!(path = %path.display(), error = %e, "Failed to delete expired segment");
                break;
            }
            debug!(path = %path.display(), "Deleted expired segment");
            self.sealed.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use std::sync::Arc;
    use std::time::Duration;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(1_000_000))
    }

    fn value(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    fn small_segments() -> StorageConfig {
        StorageConfig {
            segment_max_bytes: 128,
            ..Default::default()
        }
    }

    #[test]
    fn test_offsets_start_at_zero_and_are_contiguous() {
        let log = PartitionLog::open_in_memory("s", 0, clock());
        assert_eq!(log.append(None, value("a")).unwrap(), 0);
        assert_eq!(log.append(None, value("b")).unwrap(), 1);
        let batch = log
            .append_batch(vec![(None, value("c")), (Some(value("k")), value("d"))])
            .unwrap();
        assert_eq!(batch.iter().map(|a| a.offset).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(log.next_offset(), 4);
    }

    #[test]
    fn test_read_past_tail_is_empty() {
        let log = PartitionLog::open_in_memory("s", 0, clock());
        log.append(None, value("a")).unwrap();

        let slice = log.read(1, 10);
        assert!(slice.messages.is_empty());
        assert_eq!(slice.next_offset, 1);

        let slice = log.read(7, 10);
        assert!(slice.messages.is_empty());
        assert_eq!(slice.next_offset, 7);
    }

    #[test]
    fn test_read_respects_limit() {
        let log = PartitionLog::open_in_memory("s", 0, clock());
        for i in 0..5 {
            log.append(None, value(&i.to_string())).unwrap();
        }
        let slice = log.read(1, 2);
        assert_eq!(slice.messages.len(), 2);
        assert_eq!(slice.messages[0].offset, 1);
        assert_eq!(slice.next_offset, 3);
    }

    #[test]
    fn test_timestamps_never_go_backwards() {
        let clock = clock();
        let log = PartitionLog::open_in_memory("s", 0, clock.clone());
        log.append(None, value("a")).unwrap();
        clock.set(10);
        log.append(None, value("b")).unwrap();

        let slice = log.read(0, 10);
        assert_eq!(slice.messages[1].timestamp_ms, slice.messages[0].timestamp_ms);
    }

    #[test]
    fn test_offset_for_timestamp() {
        let clock = clock();
        let log = PartitionLog::open_in_memory("s", 0, clock.clone());
        log.append(None, value("a")).unwrap();
        clock.advance(Duration::from_secs(10));
        let t = clock.now_ms();
        log.append(None, value("b")).unwrap();
        log.append(None, value("c")).unwrap();

        assert_eq!(log.offset_for_timestamp(0), 0);
        assert_eq!(log.offset_for_timestamp(t), 1);
        assert_eq!(log.offset_for_timestamp(t + 1), 3);
    }

    #[test]
    fn test_trim_advances_floor_and_read_skips_forward() {
        let clock = clock();
        let log = PartitionLog::open_in_memory("s", 0, clock.clone());
        log.append(None, value("old-1")).unwrap();
        log.append(None, value("old-2")).unwrap();
        clock.advance(Duration::from_secs(60));
        let boundary = clock.now_ms();
        log.append(None, value("new")).unwrap();

        assert_eq!(log.trim_before(boundary).unwrap(), 2);
        assert_eq!(log.floor(), 2);
        assert_eq!(log.trim_before(boundary).unwrap(), 0);

        let slice = log.read(0, 10);
        assert_eq!(slice.messages.len(), 1);
        assert_eq!(slice.messages[0].offset, 2);
        assert_eq!(log.append(None, value("next")).unwrap(), 3);
    }

    #[test]
    fn test_trim_everything_keeps_offsets() {
        let clock = clock();
        let log = PartitionLog::open_in_memory("s", 0, clock.clone());
        log.append(None, value("a")).unwrap();
        clock.advance(Duration::from_secs(1));
        assert_eq!(log.trim_before(clock.now_ms()).unwrap(), 1);

        let slice = log.read(0, 10);
        assert!(slice.messages.is_empty());
        assert_eq!(slice.next_offset, 1);
        assert_eq!(log.append(None, value("b")).unwrap(), 1);
    }

    #[test]
    fn test_disk_log_recovers_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let clock = clock();
        {
            let log = PartitionLog::open(
                "s",
                1,
                dir.path(),
                &small_segments(),
                RetryPolicy::default(),
                clock.clone(),
            )
            .unwrap();
            for i in 0..20 {
                log.append(Some(value("k")), value(&format!("value-{}", i)))
                    .unwrap();
            }
            log.sync().unwrap();
        }

        let segments = list_segments(dir.path()).unwrap();
        assert!(segments.len() > 1);

        let log = PartitionLog::open(
            "s",
            1,
            dir.path(),
            &small_segments(),
            RetryPolicy::default(),
            clock,
        )
        .unwrap();
        assert_eq!(log.next_offset(), 20);
        let slice = log.read(0, 100);
        assert_eq!(slice.messages.len(), 20);
        assert_eq!(slice.messages[19].value, value("value-19"));
        assert_eq!(slice.messages[3].partition, 1);
        assert_eq!(log.append(None, value("more")).unwrap(), 20);
    }

    #[test]
    fn test_disk_trim_persists_floor_and_deletes_segments() {
        let dir = tempfile::tempdir().unwrap();
        let clock = clock();
        let log = PartitionLog::open(
            "s",
            0,
            dir.path(),
            &small_segments(),
            RetryPolicy::default(),
            clock.clone(),
        )
        .unwrap();
        for i in 0..10 {
            log.append(None, value(&format!("expired-{}", i))).unwrap();
        }
        clock.advance(Duration::from_secs(3600));
        let boundary = clock.now_ms();
        log.append(None, value("kept")).unwrap();
        let before = list_segments(dir.path()).unwrap().len();

        assert_eq!(log.trim_before(boundary).unwrap(), 10);
        let after = list_segments(dir.path()).unwrap().len();
        assert!(after < before);
        drop(log);

        let log = PartitionLog::open(
            "s",
            0,
            dir.path(),
            &small_segments(),
            RetryPolicy::default(),
            clock,
        )
        .unwrap();
        assert_eq!(log.floor(), 10);
        let slice = log.read(0, 100);
        assert_eq!(slice.messages.len(), 1);
        assert_eq!(slice.messages[0].value, value("kept"));
    }

    #[test]
    fn test_destroy_removes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let part_dir = dir.path().join("partition-0");
        let log = PartitionLog::open(
            "s",
            0,
            &part_dir,
            &StorageConfig::default(),
            RetryPolicy::default(),
            clock(),
        )
        .unwrap();
        log.append(None, value("a")).unwrap();
        log.destroy().unwrap();
        assert!(!part_dir.exists());
        assert!(log.read(0, 10).messages.is_empty());
    }
}
