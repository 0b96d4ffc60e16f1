//! Segment files for durable partition logs
//!
//! A partition directory holds a run of segment files named by the offset of
//! their first message. Only the newest segment is written to; it rolls once
//! it reaches the configured size.
//!
//! # Frame Format
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ body_len: u32                            │
//! │ crc32(body): u32                         │
//! ├──────────────────────────────────────────┤
//! │ offset: i64                              │
//! │ timestamp_ms: i64                        │
//! │ key_len: i32   (-1 = no key)             │
//! │ key: [u8; key_len]                       │
//! │ value: [u8; body_len - 20 - key_len]     │
//! └──────────────────────────────────────────┘
//! ```
//!
//! All integers are big-endian. On open the file is scanned frame by frame;
//! anything after the last complete frame with a valid CRC is truncated.

use crate::error::StorageError;
use crate::storage::message::Message;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Length and CRC prefix
pub const FRAME_HEADER_SIZE: usize = 8;

/// offset + timestamp + key length
const BODY_FIXED_SIZE: usize = 20;

/// Frames larger than this are treated as corruption during recovery
const MAX_FRAME_BODY: usize = 256 * 1024 * 1024;

const SEGMENT_EXTENSION: &str = "segment";

/// File name for a segment starting at `base_offset`
pub fn segment_filename(base_offset: i64) -> String {
    format!("{:020}.{}", base_offset, SEGMENT_EXTENSION)
}

/// Base offset encoded in a segment file name
pub fn parse_segment_filename(path: &Path) -> Option<i64> {
    if path.extension()?.to_str()? != SEGMENT_EXTENSION {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

/// Segment files in `dir`, sorted by base offset
pub fn list_segments(dir: &Path) -> Result<Vec<(i64, PathBuf)>, StorageError> {
    let entries = fs::read_dir(dir).map_err(|e| StorageError::io("list segments", dir, e))?;
    let mut segments = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StorageError::io("list segments", dir, e))?;
        let path = entry.path();
        if let Some(base) = parse_segment_filename(&path) {
            segments.push((base, path));
        }
    }
    segments.sort_by_key(|(base, _)| *base);
    Ok(segments)
}

/// Append the encoded frame for `msg` to `buf`
pub fn encode_frame(buf: &mut BytesMut, msg: &Message) {
    let key_len = msg.key.as_ref().map_or(0, Bytes::len);
    let body_len = BODY_FIXED_SIZE + key_len + msg.value.len();

    let mut body = BytesMut::with_capacity(body_len);
    body.put_i64(msg.offset);
    body.put_i64(msg.timestamp_ms);
    match &msg.key {
        Some(key) => {
            body.put_i32(key.len() as i32);
            body.put_slice(key);
        }
        None => body.put_i32(-1),
    }
    body.put_slice(&msg.value);

    buf.reserve(FRAME_HEADER_SIZE + body_len);
    buf.put_u32(body_len as u32);
    buf.put_u32(crc32fast::hash(&body));
    buf.put_slice(&body);
}

/// Result of scanning raw segment bytes
#[derive(Debug)]
pub struct DecodedFrames {
    pub messages: Vec<Message>,
    /// Bytes covered by complete, valid frames
    pub valid_len: u64,
    /// Why the scan stopped early, if it did
    pub stopped: Option<String>,
}

/// Decode frames from `data` until the end or the first bad frame
pub fn decode_frames(data: Bytes, partition: u32) -> DecodedFrames {
    let mut messages = Vec::new();
    let mut buf = data;
    let mut position = 0usize;

    let stopped = loop {
        if buf.is_empty() {
            break None;
        }
        if buf.remaining() < FRAME_HEADER_SIZE {
            break Some(format!("incomplete frame header ({} bytes)", buf.remaining()));
        }
        let body_len = buf.get_u32() as usize;
        let stored_crc = buf.get_u32();
        if !(BODY_FIXED_SIZE..=MAX_FRAME_BODY).contains(&body_len) {
            break Some(format!("invalid frame length {}", body_len));
        }
        if buf.remaining() < body_len {
            break Some(format!(
                "incomplete frame body ({} of {} bytes)",
                buf.remaining(),
                body_len
            ));
        }
        let mut body = buf.split_to(body_len);
        let computed_crc = crc32fast::hash(&body);
        if computed_crc != stored_crc {
            break Some(format!(
                "crc mismatch (stored {:08x}, computed {:08x})",
                stored_crc, computed_crc
            ));
        }

        let offset = body.get_i64();
        let timestamp_ms = body.get_i64();
        let key_len = body.get_i32();
        let key = if key_len < 0 {
            None
        } else if key_len as usize > body.remaining() {
            break Some(format!("key length {} exceeds frame", key_len));
        } else {
            Some(body.split_to(key_len as usize))
        };

        messages.push(Message::new(partition, offset, timestamp_ms, key, body));
        position += FRAME_HEADER_SIZE + body_len;
    };

    DecodedFrames {
        messages,
        valid_len: position as u64,
        stopped,
    }
}

/// An open segment file
#[derive(Debug)]
pub struct SegmentFile {
    path: PathBuf,
    base_offset: i64,
    file: File,
    write_position: u64,
}

impl SegmentFile {
    /// Create a new empty segment in `dir`
    pub fn create(dir: &Path, base_offset: i64) -> Result<Self, StorageError> {
        let path = dir.join(segment_filename(base_offset));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| StorageError::io("create segment", &path, e))?;

        debug!(path = %path.display(), base_offset, "Created segment");

        Ok(Self {
            path,
            base_offset,
            file,
            write_position: 0,
        })
    }

    /// Open an existing segment, truncating any torn or corrupt tail.
    /// Returns the segment with the messages it holds.
    pub fn open(
        path: &Path,
        base_offset: i64,
        partition: u32,
    ) -> Result<(Self, Vec<Message>), StorageError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| StorageError::io("open segment", path, e))?;

        let mut raw = Vec::new();
        file.read_to_end(&mut raw)
            .map_err(|e| StorageError::io("read segment", path, e))?;
        let file_size = raw.len() as u64;

        let decoded = decode_frames(Bytes::from(raw), partition);
        if let Some(reason) = &decoded.stopped {
            warn!(
                path = %path.display(),
                file_size,
                truncating_to = decoded.valid_len,
                reason = %reason,
                "Detected torn or corrupt tail during recovery, truncating segment"
            );
            file.set_len(decoded.valid_len)
                .map_err(|e| StorageError::io("truncate segment", path, e))?;
            file.sync_all()
                .map_err(|e| StorageError::io("sync segment", path, e))?;
        }

        if let Some(first) = decoded.messages.first() {
            if first.offset != base_offset {
                return Err(StorageError::corrupt(
                    path,
                    0,
                    format!(
                        "first offset {} does not match segment base {}",
                        first.offset, base_offset
                    ),
                ));
            }
        }

        Ok((
            Self {
                path: path.to_path_buf(),
                base_offset,
                file,
                write_position: decoded.valid_len,
            },
            decoded.messages,
        ))
    }

    /// Write already-encoded frames at the end of the valid data.
    ///
    /// On failure the file is cut back to its previous length so the batch
    /// is either fully present or absent. Safe to call again after an error.
    pub fn append_frames(&mut self, frames: &[u8], sync: bool) -> Result<(), StorageError> {
        match self.write_at_tail(frames, sync) {
            Ok(()) => {
                self.write_position += frames.len() as u64;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = self.file.set_len(self.write_position) {
                    warn!(
                        path = %self.path.display(),
                        position = self.write_position,
                        error = %rollback,
                        "Failed to roll back partial segment write"
                    );
                }
                Err(e)
            }
        }
    }

    fn write_at_tail(&mut self, frames: &[u8], sync: bool) -> Result<(), StorageError> {
        let path = &self.path;
        self.file
            .seek(SeekFrom::Start(self.write_position))
            .map_err(|e| StorageError::io("seek segment", path, e))?;
        self.file
            .write_all(frames)
            .map_err(|e| StorageError::io("write segment", path, e))?;
        self.file
            .flush()
            .map_err(|e| StorageError::io("flush segment", path, e))?;
        if sync {
            self.file
                .sync_data()
                .map_err(|e| StorageError::io("sync segment", path, e))?;
        }
        Ok(())
    }

    /// Flush and fsync everything written so far
    pub fn sync(&mut self) -> Result<(), StorageError> {
        self.file
            .sync_all()
            .map_err(|e| StorageError::io("sync segment", &self.path, e))
    }

    pub fn base_offset(&self) -> i64 {
        self.base_offset
    }

    /// Bytes of valid data
    pub fn size(&self) -> u64 {
        self.write_position
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
