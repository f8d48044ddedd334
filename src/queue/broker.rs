//! In-process priority queue broker.
//!
//! Holds two independent FIFO lanes ("high" and "default"), each with its
//! own dequeue rate limiter and configured consumer concurrency. Lanes hold
//! lightweight references to job records, never authoritative state; an
//! entry lost or duplicated here is recovered through the job store and the
//! reconciliation sweep.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{LaneSettings, QueueSettings};
use crate::job_store::{JobPriority, JobRecord};

use super::rate_limit::FixedWindowLimiter;

/// A lightweight reference to a job record, sufficient to execute it.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub job_id: String,
    pub job_type: String,
    pub payload: JsonValue,
}

impl QueueEntry {
    /// Project a queue entry out of a job record.
    pub fn for_job(record: &JobRecord) -> Self {
        Self {
            job_id: record.id.clone(),
            job_type: record.job_type.clone(),
            payload: record.payload.clone(),
        }
    }
}

/// One FIFO lane with its own rate limiter.
struct Lane {
    entries: Mutex<VecDeque<QueueEntry>>,
    notify: Notify,
    limiter: FixedWindowLimiter,
    settings: LaneSettings,
}

impl Lane {
    fn new(settings: LaneSettings) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            limiter: FixedWindowLimiter::new(
                settings.max_dequeues_per_window,
                Duration::from_millis(settings.window_ms),
            ),
            settings,
        }
    }

    fn push(&self, entry: QueueEntry) {
        self.entries.lock().unwrap().push_back(entry);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<QueueEntry> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.pop_front();
        // Notify stores at most one pending wakeup, so burst enqueues can
        // collapse into a single permit; pass the wakeup along while
        // entries remain
        if !entries.is_empty() {
            self.notify.notify_one();
        }
        entry
    }

    fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

/// Priority queue broker with one lane per priority class.
pub struct QueueBroker {
    high: Lane,
    default_lane: Lane,
}

impl QueueBroker {
    /// Create a broker with lanes configured per `settings`.
    pub fn new(settings: &QueueSettings) -> Self {
        Self {
            high: Lane::new(settings.high.clone()),
            default_lane: Lane::new(settings.default_lane.clone()),
        }
    }

    fn lane(&self, priority: JobPriority) -> &Lane {
        match priority {
            JobPriority::High => &self.high,
            JobPriority::Default => &self.default_lane,
        }
    }

    /// Configured executor concurrency for a lane.
    pub fn concurrency(&self, priority: JobPriority) -> usize {
        self.lane(priority).settings.concurrency
    }

    /// Append an entry to the back of the lane matching `priority`.
    pub fn enqueue(&self, priority: JobPriority, entry: QueueEntry) {
        debug!(
            "Enqueued job {} into {} lane",
            entry.job_id,
            priority.as_str()
        );
        self.lane(priority).push(entry);
    }

    /// Append an entry to the back of its lane once `delay` has elapsed.
    /// Used for retry backoff; retried entries are appended, not reinserted
    /// at their original position.
    pub fn enqueue_after(
        self: &Arc<Self>,
        priority: JobPriority,
        entry: QueueEntry,
        delay: Duration,
        shutdown: CancellationToken,
    ) {
        let broker = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    broker.enqueue(priority, entry);
                }
                _ = shutdown.cancelled() => {
                    // Dropped on shutdown; the record stays `processing` and
                    // the reconciliation sweep recovers it on next startup.
                    debug!("Dropping delayed re-enqueue of job {} (shutdown)", entry.job_id);
                }
            }
        });
    }

    /// Pull the next entry from the lane matching `priority`, waiting for
    /// one to arrive. Dequeues are subject to the lane's rate limiter.
    /// Returns None once `shutdown` is cancelled.
    pub async fn dequeue(
        &self,
        priority: JobPriority,
        shutdown: &CancellationToken,
    ) -> Option<QueueEntry> {
        let lane = self.lane(priority);
        loop {
            if shutdown.is_cancelled() {
                return None;
            }
            if let Some(entry) = lane.pop() {
                lane.limiter.acquire().await;
                return Some(entry);
            }
            tokio::select! {
                _ = lane.notify.notified() => {}
                _ = shutdown.cancelled() => return None,
            }
        }
    }

    /// Number of entries currently waiting in a lane.
    pub fn depth(&self, priority: JobPriority) -> usize {
        self.lane(priority).len()
    }
}
