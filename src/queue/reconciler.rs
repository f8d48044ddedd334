//! Reconciliation sweep between the job store and the broker.
//!
//! The broker is in-process, so its lanes are empty after a restart and a
//! crash between insert and enqueue leaves a `pending` record with no queue
//! entry. The reconciler closes both gaps: at startup it rebuilds the lanes
//! from every pending record, and periodically it re-enqueues non-terminal
//! records that have not been touched within a staleness threshold.
//! Redelivery duplicates are harmless; the worker's idempotency guard and
//! the at-least-once delivery contract absorb them.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::ReconcilerSettings;
use crate::job_store::JobStore;

use super::broker::{QueueBroker, QueueEntry};

pub struct QueueReconciler {
    store: Arc<dyn JobStore>,
    broker: Arc<QueueBroker>,
    interval: Duration,
    stale_threshold_secs: i64,
}

impl QueueReconciler {
    pub fn new(
        store: Arc<dyn JobStore>,
        broker: Arc<QueueBroker>,
        settings: &ReconcilerSettings,
    ) -> Self {
        Self {
            store,
            broker,
            interval: Duration::from_secs(settings.interval_secs),
            stale_threshold_secs: settings.stale_threshold_secs,
        }
    }

    /// Re-enqueue every pending record. Called once at startup, before the
    /// worker pool starts, to rebuild the lanes.
    pub fn recover_pending(&self) -> Result<usize> {
        let pending = self.store.list_pending()?;
        let count = pending.len();
        for record in pending {
            self.broker
                .enqueue(record.priority, QueueEntry::for_job(&record));
        }
        Ok(count)
    }

    /// Re-enqueue non-terminal records whose last update is older than the
    /// staleness threshold.
    pub fn sweep(&self) -> Result<usize> {
        let stuck = self.store.list_stuck(self.stale_threshold_secs)?;
        let count = stuck.len();
        for record in stuck {
            self.broker
                .enqueue(record.priority, QueueEntry::for_job(&record));
        }
        Ok(count)
    }

    /// Periodic sweep loop - call from a spawned task.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            "Reconciler starting (interval={}s, stale_threshold={}s)",
            self.interval.as_secs(),
            self.stale_threshold_secs
        );

        let mut ticker = tokio::time::interval(self.interval);
        // Skip the first immediate tick, wait for the first interval
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep() {
                        Ok(count) if count > 0 => {
                            info!("Re-enqueued {} stuck jobs", count);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!("Reconciliation sweep failed: {:#}", e);
                        }
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("Reconciler shutting down");
                    break;
                }
            }
        }
    }
}
