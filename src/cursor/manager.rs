//! Cursor manager
//!
//! Issues and resolves cursor tokens and serves reads through them.
//!
//! # Group locking
//!
//! Every (instance, partition) cursor of a group has its own read lock,
//! held across resolve, log read and position update, so two readers of
//! the same cursor never receive overlapping batches from one committed
//! position. Members reading different partitions only share the group's
//! state lock, and only for in-memory updates.
//!
//! Group files are written outside the state lock. Each change bumps a
//! version and a save is skipped unless it is newer than the last one
//! written. Deleting a group marks it deleted while holding the write
//! lock, so no reader can write its file again afterwards.

use super::group::ConsumerGroup;
use super::offset_store::GroupStore;
use super::token::{CursorClaims, CursorCodec, CursorToken};
use super::{
    validate_group_name, CreateCursorDetails, CursorPosition, GetMessagesResult, ResolvedCursor,
};
use crate::clock::SharedClock;
use crate::config::CursorConfig;
use crate::error::{BrookError, Result};
use crate::storage::{PartitionLog, RetryPolicy};
use crate::stream::{Stream, StreamRegistry};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

type GroupKey = (String, String);

/// A group's positions and a counter bumped on every change
#[derive(Debug)]
struct GroupState {
    group: ConsumerGroup,
    version: u64,
}

impl GroupState {
    fn changed(&mut self) -> PendingSave {
        self.version += 1;
        PendingSave {
            version: self.version,
            group: self.group.clone(),
        }
    }
}

/// Group contents to write once the state lock is released
#[derive(Debug)]
struct PendingSave {
    version: u64,
    group: ConsumerGroup,
}

#[derive(Debug)]
struct GroupHandle {
    state: Mutex<GroupState>,
    /// Read locks by (instance, partition)
    readers: DashMap<(String, u32), Arc<Mutex<()>>>,
    /// Serializes writes of the group file; holds the last version written
    written: Mutex<u64>,
    deleted: AtomicBool,
}

impl GroupHandle {
    fn new(group: ConsumerGroup) -> Self {
        Self {
            state: Mutex::new(GroupState { group, version: 0 }),
            readers: DashMap::new(),
            written: Mutex::new(0),
            deleted: AtomicBool::new(false),
        }
    }

    fn reader(&self, instance: &str, partition: u32) -> Arc<Mutex<()>> {
        self.readers
            .entry((instance.to_string(), partition))
            .or_default()
            .value()
            .clone()
    }

    fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    /// The state, unless the group has been deleted
    fn live(&self) -> Option<MutexGuard<'_, GroupState>> {
        let state = self.state.lock();
        if self.is_deleted() {
            return None;
        }
        Some(state)
    }

    /// Waits for an in-flight save. Returns false if already deleted.
    fn mark_deleted(&self) -> bool {
        let _written = self.written.lock();
        let _state = self.state.lock();
        !self.deleted.swap(true, Ordering::AcqRel)
    }
}

/// Issues cursors and tracks consumer group positions
#[derive(Debug)]
pub struct CursorManager {
    registry: Arc<StreamRegistry>,
    groups: DashMap<GroupKey, Arc<GroupHandle>>,
    store: GroupStore,
    codec: CursorCodec,
    config: CursorConfig,
    retry: RetryPolicy,
    clock: SharedClock,
}

impl CursorManager {
    pub fn new(
        registry: Arc<StreamRegistry>,
        store: GroupStore,
        config: CursorConfig,
        retry: RetryPolicy,
        clock: SharedClock,
    ) -> Self {
        let codec = match config.secret.as_deref() {
            Some(secret) => CursorCodec::new(secret.as_bytes()),
            None => {
                info!("No cursor secret configured, cursor tokens will not survive a restart");
                CursorCodec::random()
            }
        };
        Self {
            registry,
            groups: DashMap::new(),
            store,
            codec,
            config,
            retry,
            clock,
        }
    }

    /// Load persisted groups. Groups of streams that no longer exist are
    /// removed.
    pub fn recover(&self) -> Result<usize> {
        let groups = self.retry.run("load groups", || self.store.load_all())?;
        let mut loaded = 0;
        for group in groups {
            if self.registry.get(&group.stream_id).is_err() {
                warn!(stream = %group.stream_id, group = %group.name, "Removing group of missing stream");
                self.retry
                    .run("delete group", || self.store.delete_stream(&group.stream_id))?;
                continue;
            }
            self.groups.insert(
                (group.stream_id.clone(), group.name.clone()),
                Arc::new(GroupHandle::new(group)),
            );
            loaded += 1;
        }
        info!(groups = loaded, "Consumer groups recovered");
        Ok(loaded)
    }

    /// Create a cursor. Creating a group cursor again resets its position.
    pub fn create_cursor(&self, stream_id: &str, details: CreateCursorDetails) -> Result<CursorToken> {
        let stream = self.registry.get_active(stream_id)?;
        let partition = stream.partition(details.partition)?;
        let now = self.clock.now_ms();

        let Some(binding) = details.group else {
            let offset = resolve_position(partition, details.position)?;
            debug!(stream = %stream_id, partition = details.partition, offset, "Simple cursor created");
            return self.codec.encode(&CursorClaims::Simple {
                stream_id: stream_id.to_string(),
                partition: details.partition,
                offset,
                issued_at_ms: now,
            });
        };

        validate_group_name("group", &binding.group)?;
        validate_group_name("instance", &binding.instance)?;
        if !details.position.allowed_for_groups() {
            return Err(BrookError::invalid(format!(
                "group cursors cannot start at {:?}",
                details.position
            )));
        }

        let offset = resolve_position(partition, details.position)?;
        loop {
            let handle = self.group_or_create(stream_id, &binding.group, now);
            let reader = handle.reader(&binding.instance, details.partition);
            let _reading = reader.lock();
            // Deleted while we were looking it up: the next lookup
            // replaces it with a fresh group
            let Some(mut state) = handle.live() else {
                continue;
            };
            state.group.reset(
                &binding.instance,
                details.partition,
                offset,
                binding.commit_on_get,
                now,
            );
            let save = state.changed();
            drop(state);
            self.persist(&handle, save)?;
            break;
        }

        info!(
            stream = %stream_id,
            group = %binding.group,
            instance = %binding.instance,
            partition = details.partition,
            offset,
            commit_on_get = binding.commit_on_get,
            "Group cursor reset"
        );

        self.codec.encode(&CursorClaims::Group {
            stream_id: stream_id.to_string(),
            group: binding.group,
            instance: binding.instance,
            partition: details.partition,
            offset: None,
            issued_at_ms: now,
        })
    }

    /// Token for an existing group cursor, without touching its position
    pub fn attach_group_cursor(
        &self,
        stream_id: &str,
        group: &str,
        instance: &str,
        partition: u32,
    ) -> Result<CursorToken> {
        let stream = self.registry.get_active(stream_id)?;
        stream.partition(partition)?;

        let handle = self.group(stream_id, group).map_err(|_| cursor_not_found(group, instance, partition))?;
        let exists = handle
            .live()
            .is_some_and(|state| state.group.cursor(instance, partition).is_some());
        if !exists {
            return Err(cursor_not_found(group, instance, partition));
        }

        self.codec.encode(&CursorClaims::Group {
            stream_id: stream_id.to_string(),
            group: group.to_string(),
            instance: instance.to_string(),
            partition,
            offset: None,
            issued_at_ms: self.clock.now_ms(),
        })
    }

    /// Resolve a token to its read position.
    ///
    /// Resolving twice with no read in between gives the same answer. A
    /// group position below the retention floor is moved up to the floor.
    pub fn resolve(&self, token: &CursorToken) -> Result<ResolvedCursor> {
        let claims = self.codec.decode(token)?;
        let (stream, partition) = self.cursor_target(&claims, token)?;

        match claims {
            CursorClaims::Simple {
                stream_id,
                partition: partition_id,
                offset,
                issued_at_ms,
            } => {
                self.check_idle(issued_at_ms)?;
                Ok(ResolvedCursor {
                    stream_id,
                    partition: partition_id,
                    offset: offset.max(partition.floor()),
                    group: None,
                })
            }
            CursorClaims::Group {
                group,
                instance,
                partition: partition_id,
                offset,
                ..
            } => {
                let handle = self
                    .group(stream.id(), &group)
                    .map_err(|_| cursor_not_found(&group, &instance, partition_id))?;
                let (start, save) = {
                    let mut state = handle
                        .live()
                        .ok_or_else(|| cursor_not_found(&group, &instance, partition_id))?;
                    self.group_start(&mut state, &instance, partition_id, offset, &partition)?
                };
                if let Some(save) = save {
                    self.persist(&handle, save)?;
                }
                Ok(ResolvedCursor {
                    stream_id: stream.id().to_string(),
                    partition: partition_id,
                    offset: start,
                    group: Some((group, instance)),
                })
            }
        }
    }

    /// Read up to `limit` messages through a cursor
    pub fn get_messages(&self, token: &CursorToken, limit: usize) -> Result<GetMessagesResult> {
        if limit == 0 || limit > self.config.max_read_limit {
            return Err(BrookError::invalid(format!(
                "limit must be between 1 and {} (got {})",
                self.config.max_read_limit, limit
            )));
        }

        let claims = self.codec.decode(token)?;
        let (stream, partition) = self.cursor_target(&claims, token)?;
        let now = self.clock.now_ms();

        match claims {
            CursorClaims::Simple {
                stream_id,
                partition: partition_id,
                offset,
                issued_at_ms,
            } => {
                self.check_idle(issued_at_ms)?;
                let slice = partition.read(offset, limit);
                debug!(
                    stream = %stream_id,
                    partition = partition_id,
                    from = offset,
                    count = slice.messages.len(),
                    next_offset = slice.next_offset,
                    "Simple cursor read"
                );
                let next_cursor = self.codec.encode(&CursorClaims::Simple {
                    stream_id,
                    partition: partition_id,
                    offset: slice.next_offset,
                    issued_at_ms: now,
                })?;
                Ok(GetMessagesResult {
                    messages: slice.messages,
                    next_cursor,
                })
            }
            CursorClaims::Group {
                stream_id,
                group,
                instance,
                partition: partition_id,
                offset,
                ..
            } => {
                let handle = self
                    .group(stream.id(), &group)
                    .map_err(|_| cursor_not_found(&group, &instance, partition_id))?;
                let reader = handle.reader(&instance, partition_id);
                let _reading = reader.lock();

                let (start, commit_on_get, mut save) = {
                    let mut state = handle
                        .live()
                        .ok_or_else(|| cursor_not_found(&group, &instance, partition_id))?;
                    let (start, save) =
                        self.group_start(&mut state, &instance, partition_id, offset, &partition)?;
                    let commit_on_get = state
                        .group
                        .cursor(&instance, partition_id)
                        .map_or(true, |c| c.commit_on_get);
                    (start, commit_on_get, save)
                };

                let slice = partition.read(start, limit);
                let pending = if commit_on_get {
                    if slice.next_offset > start {
                        let mut state = handle
                            .live()
                            .ok_or_else(|| cursor_not_found(&group, &instance, partition_id))?;
                        state
                            .group
                            .advance(&instance, partition_id, slice.next_offset, now);
                        save = Some(state.changed());
                    }
                    None
                } else {
                    Some(slice.next_offset)
                };
                if let Some(save) = save {
                    self.persist(&handle, save)?;
                }

                debug!(
                    stream = %stream_id,
                    group = %group,
                    instance = %instance,
                    partition = partition_id,
                    from = start,
                    count = slice.messages.len(),
                    next_offset = slice.next_offset,
                    committed = commit_on_get,
                    "Group cursor read"
                );

                let next_cursor = self.codec.encode(&CursorClaims::Group {
                    stream_id,
                    group,
                    instance,
                    partition: partition_id,
                    offset: pending,
                    issued_at_ms: now,
                })?;
                Ok(GetMessagesResult {
                    messages: slice.messages,
                    next_cursor,
                })
            }
        }
    }

    /// Commit the position carried by a token returned from a read of a
    /// group cursor without commit-on-get. Commits only move forward.
    /// Returns the committed offset.
    pub fn commit_group_cursor(&self, token: &CursorToken) -> Result<i64> {
        let claims = self.codec.decode(token)?;
        let (stream, partition) = self.cursor_target(&claims, token)?;

        let CursorClaims::Group {
            group,
            instance,
            partition: partition_id,
            offset,
            ..
        } = claims
        else {
            return Err(BrookError::invalid("only group cursors can be committed"));
        };

        let handle = self
            .group(stream.id(), &group)
            .map_err(|_| cursor_not_found(&group, &instance, partition_id))?;
        let (committed, save) = {
            let mut state = handle
                .live()
                .ok_or_else(|| cursor_not_found(&group, &instance, partition_id))?;
            let current = state
                .group
                .cursor(&instance, partition_id)
                .map(|c| c.offset)
                .ok_or_else(|| cursor_not_found(&group, &instance, partition_id))?;

            let Some(offset) = offset else {
                return Ok(current);
            };
            let target = offset.min(partition.next_offset());
            let committed = state
                .group
                .advance(&instance, partition_id, target, self.clock.now_ms())
                .unwrap_or(current);
            let save = (committed != current).then(|| state.changed());
            (committed, save)
        };
        if let Some(save) = save {
            self.persist(&handle, save)?;
        }

        debug!(
            stream = %stream.id(),
            group = %group,
            instance = %instance,
            partition = partition_id,
            committed,
            "Group cursor committed"
        );
        Ok(committed)
    }

    /// Names of a stream's consumer groups
    pub fn list_groups(&self, stream_id: &str) -> Result<Vec<String>> {
        self.registry.get(stream_id)?;
        let mut names: Vec<String> = self
            .groups
            .iter()
            .filter(|entry| entry.key().0 == stream_id && !entry.value().is_deleted())
            .map(|entry| entry.key().1.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Snapshot of a consumer group
    pub fn get_group(&self, stream_id: &str, group: &str) -> Result<ConsumerGroup> {
        let handle = self.group(stream_id, group)?;
        let snapshot = handle.live().map(|state| state.group.clone());
        snapshot.ok_or_else(|| BrookError::GroupNotFound(stream_id.to_string(), group.to_string()))
    }

    /// Delete a consumer group and all of its positions
    pub fn delete_group(&self, stream_id: &str, group: &str) -> Result<()> {
        let handle = self.group(stream_id, group)?;
        if !handle.mark_deleted() {
            return Err(BrookError::GroupNotFound(
                stream_id.to_string(),
                group.to_string(),
            ));
        }
        let key = (stream_id.to_string(), group.to_string());
        self.groups
            .remove_if(&key, |_, current| Arc::ptr_eq(current, &handle));
        self.retry
            .run("delete group", || self.store.delete(stream_id, group))?;
        info!(stream = %stream_id, group = %group, "Consumer group deleted");
        Ok(())
    }

    /// Forget every group of a deleted stream
    pub fn remove_stream(&self, stream_id: &str) -> Result<()> {
        let handles: Vec<(GroupKey, Arc<GroupHandle>)> = self
            .groups
            .iter()
            .filter(|entry| entry.key().0 == stream_id)
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        for (key, handle) in &handles {
            handle.mark_deleted();
            self.groups
                .remove_if(key, |_, current| Arc::ptr_eq(current, handle));
        }
        self.retry
            .run("delete stream groups", || self.store.delete_stream(stream_id))?;
        if !handles.is_empty() {
            info!(stream = %stream_id, groups = handles.len(), "Removed consumer groups of deleted stream");
        }
        Ok(())
    }

    fn group(&self, stream_id: &str, group: &str) -> Result<Arc<GroupHandle>> {
        self.groups
            .get(&(stream_id.to_string(), group.to_string()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BrookError::GroupNotFound(stream_id.to_string(), group.to_string()))
    }

    /// The live group, creating it or replacing a deleted one
    fn group_or_create(&self, stream_id: &str, group: &str, now_ms: i64) -> Arc<GroupHandle> {
        let fresh = || Arc::new(GroupHandle::new(ConsumerGroup::new(stream_id, group, now_ms)));
        match self.groups.entry((stream_id.to_string(), group.to_string())) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_deleted() {
                    entry.insert(fresh());
                }
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                debug!(stream = %stream_id, group = %group, "Consumer group created");
                entry.insert(fresh()).value().clone()
            }
        }
    }

    /// Write a group file unless a newer version is already on disk or
    /// the group has been deleted
    fn persist(&self, handle: &GroupHandle, save: PendingSave) -> Result<()> {
        let mut written = handle.written.lock();
        if handle.is_deleted() {
            return Err(BrookError::CursorNotFound(format!(
                "group {} of stream {} was deleted",
                save.group.name, save.group.stream_id
            )));
        }
        if save.version <= *written {
            return Ok(());
        }
        self.retry.run("save group", || self.store.save(&save.group))?;
        *written = save.version;
        Ok(())
    }

    /// The active stream and partition a token points at. Tokens of
    /// deleted streams no longer resolve.
    fn cursor_target(
        &self,
        claims: &CursorClaims,
        token: &CursorToken,
    ) -> Result<(Arc<Stream>, Arc<PartitionLog>)> {
        let stream = match self.registry.get(claims.stream_id()) {
            Ok(stream) => stream,
            Err(BrookError::StreamNotFound(_)) => {
                return Err(BrookError::CursorNotFound(format!(
                    "stream {} no longer exists ({:?})",
                    claims.stream_id(),
                    token
                )))
            }
            Err(e) => return Err(e),
        };
        stream.ensure_active()?;
        let partition = stream.partition(claims.partition())?.clone();
        Ok((stream, partition))
    }

    fn check_idle(&self, issued_at_ms: i64) -> Result<()> {
        let idle_ms = self.clock.now_ms().saturating_sub(issued_at_ms);
        let timeout_ms = i64::try_from(self.config.idle_timeout_ms).unwrap_or(i64::MAX);
        if idle_ms > timeout_ms {
            return Err(BrookError::CursorExpired {
                idle_ms,
                timeout_ms,
            });
        }
        Ok(())
    }

    /// Where a group member's next read starts. A stored position below
    /// the floor is moved up to it; the returned save must be persisted.
    fn group_start(
        &self,
        state: &mut GroupState,
        instance: &str,
        partition_id: u32,
        token_offset: Option<i64>,
        partition: &PartitionLog,
    ) -> Result<(i64, Option<PendingSave>)> {
        let stored = state
            .group
            .cursor(instance, partition_id)
            .map(|c| c.offset)
            .ok_or_else(|| cursor_not_found(&state.group.name, instance, partition_id))?;

        let floor = partition.floor();
        let mut save = None;
        if stored < floor {
            state
                .group
                .advance(instance, partition_id, floor, self.clock.now_ms());
            save = Some(state.changed());
            debug!(
                stream = %state.group.stream_id,
                group = %state.group.name,
                instance = %instance,
                partition = partition_id,
                from = stored,
                to = floor,
                "Group cursor moved up to retention floor"
            );
        }

        Ok((token_offset.unwrap_or(stored).max(floor), save))
    }
}

fn cursor_not_found(group: &str, instance: &str, partition: u32) -> BrookError {
    BrookError::CursorNotFound(format!(
        "group={} instance={} partition={}",
        group, instance, partition
    ))
}

/// Offset a new cursor starts at
fn resolve_position(partition: &PartitionLog, position: CursorPosition) -> Result<i64> {
    let floor = partition.floor();
    let tail = partition.next_offset();
    let offset = match position {
        CursorPosition::TrimHorizon => floor,
        CursorPosition::Latest => tail,
        CursorPosition::AtTime(ts) => partition.offset_for_timestamp(ts),
        CursorPosition::AtOffset(offset) => offset,
        CursorPosition::AfterOffset(offset) => offset.saturating_add(1),
    };
    if offset < 0 || offset > tail {
        return Err(BrookError::invalid(format!(
            "offset {} is outside 0..={} for partition {}",
            offset,
            tail,
            partition.id()
        )));
    }
    Ok(offset.max(floor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::config::{RetentionConfig, StorageConfig};
    use crate::cursor::GroupBinding;
    use crate::stream::CreateStreamDetails;
    use bytes::Bytes;
    use std::time::Duration;

    struct Fixture {
        clock: Arc<ManualClock>,
        registry: Arc<StreamRegistry>,
        cursors: CursorManager,
        stream: Arc<Stream>,
    }

    fn fixture() -> Fixture {
        fixture_with_store(GroupStore::new(None))
    }

    fn fixture_with_store(store: GroupStore) -> Fixture {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let registry = Arc::new(StreamRegistry::new(
            None,
            StorageConfig::default(),
            RetentionConfig::default(),
            RetryPolicy::default(),
            clock.clone(),
            "brook://test",
        ));
        let cursors = CursorManager::new(
            registry.clone(),
            store,
            CursorConfig {
                idle_timeout_ms: 60_000,
                max_read_limit: 100,
                secret: Some("test-secret-0123456789".to_string()),
            },
            RetryPolicy::default(),
            clock.clone(),
        );
        let stream = registry.create(CreateStreamDetails::new("s", 2)).unwrap();
        Fixture {
            clock,
            registry,
            cursors,
            stream,
        }
    }

    fn fill(stream: &Stream, partition: u32, count: usize) {
        let log = stream.partition(partition).unwrap();
        for i in 0..count {
            log.append(None, Bytes::from(format!("m{}", i))).unwrap();
        }
    }

    #[test]
    fn test_simple_cursor_reads_and_advances() {
        let f = fixture();
        fill(&f.stream, 0, 5);
        let token = f
            .cursors
            .create_cursor(f.stream.id(), CreateCursorDetails::simple(0, CursorPosition::TrimHorizon))
            .unwrap();

        let first = f.cursors.get_messages(&token, 3).unwrap();
        assert_eq!(first.messages.len(), 3);
        let second = f.cursors.get_messages(&first.next_cursor, 10).unwrap();
        assert_eq!(second.messages.len(), 2);
        assert_eq!(second.messages[0].offset, 3);

        // The original token still points at the start
        assert_eq!(f.cursors.resolve(&token).unwrap().offset, 0);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let f = fixture();
        fill(&f.stream, 1, 2);
        let token = f
            .cursors
            .create_cursor(f.stream.id(), CreateCursorDetails::simple(1, CursorPosition::AtOffset(1)))
            .unwrap();
        let a = f.cursors.resolve(&token).unwrap();
        let b = f.cursors.resolve(&token).unwrap();
        assert_eq!(a, b);
        assert_eq!((a.partition, a.offset), (1, 1));
    }

    #[test]
    fn test_latest_only_sees_new_messages() {
        let f = fixture();
        fill(&f.stream, 0, 3);
        let token = f
            .cursors
            .create_cursor(f.stream.id(), CreateCursorDetails::simple(0, CursorPosition::Latest))
            .unwrap();
        assert!(f.cursors.get_messages(&token, 10).unwrap().messages.is_empty());

        fill(&f.stream, 0, 1);
        let read = f.cursors.get_messages(&token, 10).unwrap();
        assert_eq!(read.messages.len(), 1);
        assert_eq!(read.messages[0].offset, 3);
    }

    #[test]
    fn test_at_time() {
        let f = fixture();
        fill(&f.stream, 0, 2);
        f.clock.advance(Duration::from_secs(5));
        let t = f.clock.now_ms();
        fill(&f.stream, 0, 2);

        let token = f
            .cursors
            .create_cursor(f.stream.id(), CreateCursorDetails::simple(0, CursorPosition::AtTime(t)))
            .unwrap();
        assert_eq!(f.cursors.resolve(&token).unwrap().offset, 2);
    }

    #[test]
    fn test_simple_cursor_expires_when_idle() {
        let f = fixture();
        let token = f
            .cursors
            .create_cursor(f.stream.id(), CreateCursorDetails::simple(0, CursorPosition::TrimHorizon))
            .unwrap();
        f.clock.advance(Duration::from_secs(61));
        assert!(matches!(
            f.cursors.get_messages(&token, 1),
            Err(BrookError::CursorExpired { .. })
        ));
    }

    #[test]
    fn test_bad_arguments() {
        let f = fixture();
        fill(&f.stream, 0, 2);
        let id = f.stream.id();
        assert!(matches!(
            f.cursors
                .create_cursor(id, CreateCursorDetails::simple(5, CursorPosition::TrimHorizon)),
            Err(BrookError::InvalidArgument(_))
        ));
        assert!(matches!(
            f.cursors
                .create_cursor(id, CreateCursorDetails::simple(0, CursorPosition::AtOffset(3))),
            Err(BrookError::InvalidArgument(_))
        ));
        assert!(matches!(
            f.cursors.create_cursor(
                id,
                CreateCursorDetails::group(0, CursorPosition::AtOffset(0), GroupBinding::new("g", "i"))
            ),
            Err(BrookError::InvalidArgument(_))
        ));

        let token = f
            .cursors
            .create_cursor(id, CreateCursorDetails::simple(0, CursorPosition::TrimHorizon))
            .unwrap();
        assert!(matches!(
            f.cursors.get_messages(&token, 0),
            Err(BrookError::InvalidArgument(_))
        ));
        assert!(matches!(
            f.cursors.get_messages(&token, 101),
            Err(BrookError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_group_commit_on_get_persists_position() {
        let f = fixture();
        fill(&f.stream, 0, 4);
        let token = f
            .cursors
            .create_cursor(
                f.stream.id(),
                CreateCursorDetails::group(0, CursorPosition::TrimHorizon, GroupBinding::new("g", "i-1")),
            )
            .unwrap();

        let read = f.cursors.get_messages(&token, 3).unwrap();
        assert_eq!(read.messages.len(), 3);

        // Reusing the original token continues from the committed position
        let read = f.cursors.get_messages(&token, 3).unwrap();
        assert_eq!(read.messages.len(), 1);
        assert_eq!(read.messages[0].offset, 3);

        let group = f.cursors.get_group(f.stream.id(), "g").unwrap();
        assert_eq!(group.cursor("i-1", 0).unwrap().offset, 4);
    }

    #[test]
    fn test_group_manual_commit() {
        let f = fixture();
        fill(&f.stream, 0, 4);
        let binding = GroupBinding::new("g", "i-1").manual_commit();
        let token = f
            .cursors
            .create_cursor(f.stream.id(), CreateCursorDetails::group(0, CursorPosition::TrimHorizon, binding))
            .unwrap();

        let read = f.cursors.get_messages(&token, 2).unwrap();
        assert_eq!(read.messages.len(), 2);
        // Not committed yet: attaching again redelivers
        let again = f
            .cursors
            .attach_group_cursor(f.stream.id(), "g", "i-1", 0)
            .unwrap();
        assert_eq!(f.cursors.resolve(&again).unwrap().offset, 0);

        // Following the returned token continues without committing
        let next = f.cursors.get_messages(&read.next_cursor, 10).unwrap();
        assert_eq!(next.messages[0].offset, 2);

        assert_eq!(f.cursors.commit_group_cursor(&read.next_cursor).unwrap(), 2);
        assert_eq!(f.cursors.resolve(&again).unwrap().offset, 2);

        // Commits never go backwards
        assert_eq!(f.cursors.commit_group_cursor(&next.next_cursor).unwrap(), 4);
        assert_eq!(f.cursors.commit_group_cursor(&read.next_cursor).unwrap(), 4);
    }

    #[test]
    fn test_recreate_resets_and_attach_resumes() {
        let f = fixture();
        fill(&f.stream, 0, 5);
        let details =
            CreateCursorDetails::group(0, CursorPosition::TrimHorizon, GroupBinding::new("g", "i"));
        let token = f.cursors.create_cursor(f.stream.id(), details.clone()).unwrap();
        f.cursors.get_messages(&token, 5).unwrap();

        let attached = f.cursors.attach_group_cursor(f.stream.id(), "g", "i", 0).unwrap();
        assert_eq!(f.cursors.resolve(&attached).unwrap().offset, 5);

        f.cursors.create_cursor(f.stream.id(), details).unwrap();
        assert_eq!(f.cursors.resolve(&attached).unwrap().offset, 0);

        assert!(matches!(
            f.cursors.attach_group_cursor(f.stream.id(), "g", "other", 0),
            Err(BrookError::CursorNotFound(_))
        ));
    }

    #[test]
    fn test_group_cursor_below_floor_moves_up() {
        let f = fixture();
        fill(&f.stream, 0, 3);
        let token = f
            .cursors
            .create_cursor(
                f.stream.id(),
                CreateCursorDetails::group(0, CursorPosition::TrimHorizon, GroupBinding::new("g", "i")),
            )
            .unwrap();

        f.clock.advance(Duration::from_secs(1));
        let log = f.stream.partition(0).unwrap();
        log.trim_before(f.clock.now_ms()).unwrap();
        fill(&f.stream, 0, 1);

        assert_eq!(f.cursors.resolve(&token).unwrap().offset, 3);
        let group = f.cursors.get_group(f.stream.id(), "g").unwrap();
        assert_eq!(group.cursor("i", 0).unwrap().offset, 3);

        let read = f.cursors.get_messages(&token, 10).unwrap();
        assert_eq!(read.messages.len(), 1);
        assert_eq!(read.messages[0].offset, 3);
    }

    #[test]
    fn test_group_admin_and_stream_removal() {
        let f = fixture();
        let id = f.stream.id().to_string();
        for group in ["b", "a"] {
            f.cursors
                .create_cursor(
                    &id,
                    CreateCursorDetails::group(1, CursorPosition::Latest, GroupBinding::new(group, "i")),
                )
                .unwrap();
        }
        assert_eq!(f.cursors.list_groups(&id).unwrap(), vec!["a", "b"]);

        f.cursors.delete_group(&id, "a").unwrap();
        assert!(matches!(
            f.cursors.delete_group(&id, "a"),
            Err(BrookError::GroupNotFound(_, _))
        ));

        let token = f.cursors.attach_group_cursor(&id, "b", "i", 1).unwrap();
        let deleting = f.registry.begin_delete(&id).unwrap();
        f.cursors.remove_stream(&id).unwrap();
        f.registry.finish_delete(&deleting).unwrap();

        assert!(matches!(
            f.cursors.resolve(&token),
            Err(BrookError::CursorNotFound(_))
        ));
    }

    #[test]
    fn test_deleted_group_file_is_never_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture_with_store(GroupStore::new(Some(dir.path())));
        let id = f.stream.id().to_string();
        let group_file = dir.path().join("groups").join(&id).join("g.json");
        fill(&f.stream, 0, 3);
        let token = f
            .cursors
            .create_cursor(
                &id,
                CreateCursorDetails::group(0, CursorPosition::TrimHorizon, GroupBinding::new("g", "i")),
            )
            .unwrap();
        assert!(group_file.exists());

        // A read that advanced the position just before the delete and
        // has yet to write it
        let handle = f.cursors.group(&id, "g").unwrap();
        let save = handle.state.lock().changed();

        f.cursors.delete_group(&id, "g").unwrap();
        assert!(matches!(
            f.cursors.persist(&handle, save),
            Err(BrookError::CursorNotFound(_))
        ));
        assert!(!group_file.exists());

        assert!(matches!(
            f.cursors.get_messages(&token, 1),
            Err(BrookError::CursorNotFound(_))
        ));
        assert!(matches!(
            f.cursors.commit_group_cursor(&token),
            Err(BrookError::CursorNotFound(_))
        ));
        assert!(f.cursors.list_groups(&id).unwrap().is_empty());
        assert!(!group_file.exists());

        // The name can be used again for a fresh group
        let token = f
            .cursors
            .create_cursor(
                &id,
                CreateCursorDetails::group(0, CursorPosition::Latest, GroupBinding::new("g", "i")),
            )
            .unwrap();
        assert_eq!(f.cursors.resolve(&token).unwrap().offset, 3);
        assert!(group_file.exists());
    }

    #[test]
    fn test_stale_save_does_not_overwrite_newer() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture_with_store(GroupStore::new(Some(dir.path())));
        let id = f.stream.id().to_string();
        fill(&f.stream, 0, 4);
        let token = f
            .cursors
            .create_cursor(
                &id,
                CreateCursorDetails::group(0, CursorPosition::TrimHorizon, GroupBinding::new("g", "i")),
            )
            .unwrap();

        let handle = f.cursors.group(&id, "g").unwrap();
        let stale = handle.state.lock().changed();
        f.cursors.get_messages(&token, 4).unwrap();
        f.cursors.persist(&handle, stale).unwrap();

        let stored = GroupStore::new(Some(dir.path())).load_all().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].cursor("i", 0).unwrap().offset, 4);
    }

    #[test]
    fn test_members_on_other_partitions_read_independently() {
        let f = fixture();
        let id = f.stream.id().to_string();
        fill(&f.stream, 0, 2);
        fill(&f.stream, 1, 2);
        for (instance, partition) in [("a", 0), ("b", 1)] {
            f.cursors
                .create_cursor(
                    &id,
                    CreateCursorDetails::group(
                        partition,
                        CursorPosition::TrimHorizon,
                        GroupBinding::new("g", instance),
                    ),
                )
                .unwrap();
        }

        // A read of ("a", 0) in progress does not hold up ("b", 1)
        let handle = f.cursors.group(&id, "g").unwrap();
        let reader = handle.reader("a", 0);
        let _reading = reader.lock();

        let token = f.cursors.attach_group_cursor(&id, "g", "b", 1).unwrap();
        let read = f.cursors.get_messages(&token, 10).unwrap();
        assert_eq!(read.messages.len(), 2);
        assert_eq!(
            f.cursors.get_group(&id, "g").unwrap().cursor("b", 1).unwrap().offset,
            2
        );
    }

    #[test]
    fn test_forged_token_not_found() {
        let f = fixture();
        assert!(matches!(
            f.cursors.resolve(&CursorToken::from("definitely.not-a-token")),
            Err(BrookError::CursorNotFound(_))
        ));
    }
}
