//! Retention enforcement
//!
//! The reaper periodically walks every active stream and trims, per
//! partition, the contiguous run of oldest messages stamped before
//! `now - retention_hours`. Retention is purely time based: messages are
//! removed whether or not any cursor has read them.

use crate::clock::SharedClock;
use crate::stream::{StreamRegistry, StreamState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Outcome of one retention sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub streams_scanned: usize,
    pub partitions_trimmed: usize,
    pub messages_deleted: usize,
    /// Partitions whose trim failed; retried on the next sweep
    pub failures: usize,
}

/// Background retention sweeper
#[derive(Debug, Clone)]
pub struct RetentionReaper {
    registry: Arc<StreamRegistry>,
    clock: SharedClock,
    interval: Duration,
}

impl RetentionReaper {
    pub fn new(registry: Arc<StreamRegistry>, clock: SharedClock, interval: Duration) -> Self {
        Self {
            registry,
            clock,
            interval,
        }
    }

    /// Time between sweeps
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run a single sweep over all active streams
    pub fn run_once(&self) -> ReapReport {
        let now = self.clock.now_ms();
        let mut report = ReapReport::default();

        for stream in self.registry.streams() {
            if stream.state() != StreamState::Active {
                continue;
            }
            report.streams_scanned += 1;
            let boundary = stream.retention_boundary(now);

            for partition in stream.partitions() {
                match partition.trim_before(boundary) {
                    Ok(0) => {}
                    Ok(removed) => {
                        report.partitions_trimmed += 1;
                        report.messages_deleted += removed;
                    }
                    Err(e) => {
                        report.failures += 1;
                        warn!(
                            stream = %stream.id(),
                            partition = partition.id(),
                            error = %e,
                            "Failed to enforce retention for partition"
                        );
                    }
                }
            }
        }

        if report.messages_deleted > 0 || report.failures > 0 {
            info!(
                streams = report.streams_scanned,
                partitions_trimmed = report.partitions_trimmed,
                messages_deleted = report.messages_deleted,
                failures = report.failures,
                "Retention sweep completed"
            );
        } else {
            debug!(streams = report.streams_scanned, "Retention sweep found nothing to delete");
        }

        report
    }

    /// Run sweeps on a timer until `shutdown` becomes true or its sender
    /// is dropped
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            info!(interval_secs = self.interval.as_secs(), "Retention reaper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // Trimming fsyncs checkpoints and deletes segment files
                        let reaper = self.clone();
                        if let Err(e) = tokio::task::spawn_blocking(move || reaper.run_once()).await {
                            error!(error = %e, "Retention sweep task failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Retention reaper stopped");
        })
    }
}
