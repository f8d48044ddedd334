//! Worker pool consuming the queue lanes.
//!
//! Spawns a fixed number of executors per lane. Each executor pulls one
//! queue entry at a time, drives it through the attempt state machine, and
//! synchronizes the outcome back into the job store. Handler errors never
//! escape an executor; they are converted into retry or terminal-failure
//! transitions.

use std::sync::Arc;

use anyhow::anyhow;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::handlers::HandlerRegistry;
use crate::job_store::{JobPriority, JobStore};

use super::broker::{QueueBroker, QueueEntry};
use super::observer::JobObserver;
use super::retry_policy::RetryPolicy;

/// Per-lane pool of concurrent job executors.
pub struct WorkerPool {
    store: Arc<dyn JobStore>,
    broker: Arc<QueueBroker>,
    registry: Arc<HandlerRegistry>,
    retry_policy: RetryPolicy,
    observers: Vec<Arc<dyn JobObserver>>,
}

impl WorkerPool {
    pub fn new(
        store: Arc<dyn JobStore>,
        broker: Arc<QueueBroker>,
        registry: Arc<HandlerRegistry>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            broker,
            registry,
            retry_policy,
            observers: Vec::new(),
        }
    }

    /// Register an observer for terminal job transitions.
    pub fn add_observer(&mut self, observer: Arc<dyn JobObserver>) {
        self.observers.push(observer);
    }

    /// Spawn all lane executors. The high lane's executors are started
    /// first; this is a startup-ordering nicety, both lanes run
    /// concurrently.
    ///
    /// Executors stop dequeuing once `shutdown` is cancelled; an in-flight
    /// execution runs to completion first.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for priority in [JobPriority::High, JobPriority::Default] {
            let concurrency = self.broker.concurrency(priority);
            info!(
                "Starting {} executors for the {} lane",
                concurrency,
                priority.as_str()
            );
            for index in 0..concurrency {
                let pool = self.clone();
                let shutdown = shutdown.clone();
                handles.push(tokio::spawn(async move {
                    pool.run_executor(priority, index, shutdown).await;
                }));
            }
        }
        handles
    }

    async fn run_executor(&self, priority: JobPriority, index: usize, shutdown: CancellationToken) {
        debug!("{} lane executor {} started", priority.as_str(), index);
        while let Some(entry) = self.broker.dequeue(priority, &shutdown).await {
            self.process_entry(priority, entry, &shutdown).await;
        }
        debug!("{} lane executor {} stopped", priority.as_str(), index);
    }

    /// Drive one queue entry through a single execution attempt.
    pub async fn process_entry(
        &self,
        priority: JobPriority,
        entry: QueueEntry,
        shutdown: &CancellationToken,
    ) {
        let record = match self.store.fetch(&entry.job_id) {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!("Dequeued entry for unknown job {}, dropping", entry.job_id);
                return;
            }
            Err(e) => {
                error!("Failed to fetch job {}: {:#}", entry.job_id, e);
                return;
            }
        };

        // Idempotency guard: the broker delivers at-least-once, so a
        // redelivered terminal job must be a no-op.
        if record.status.is_terminal() {
            debug!(
                "Job {} already {}, ignoring redelivery",
                entry.job_id,
                record.status.as_db_str()
            );
            return;
        }

        // Write-before-execute: the attempt count is persisted before the
        // handler runs, so a crash mid-execution still counts the attempt.
        let attempts = record.attempts + 1;
        info!(
            "Processing job {} (type: {}, attempt: {}/{})",
            entry.job_id, entry.job_type, attempts, self.retry_policy.max_attempts
        );
        if let Err(e) = self.store.mark_processing(&entry.job_id, attempts) {
            error!("Failed to mark job {} processing: {:#}", entry.job_id, e);
            return;
        }

        let outcome = match self.registry.get(&entry.job_type) {
            Some(handler) => handler.execute(&entry.job_id, &entry.payload).await,
            // Unknown types go through the same retry budget as any other
            // failure, no special casing
            None => Err(anyhow!("Unknown job type: {}", entry.job_type)),
        };

        match outcome {
            Ok(result) => {
                if let Err(e) = self.store.mark_completed(&entry.job_id, &result) {
                    error!("Failed to mark job {} completed: {:#}", entry.job_id, e);
                    return;
                }
                debug!("Job {} completed successfully", entry.job_id);
                for observer in &self.observers {
                    observer.on_completed(&entry.job_id, &result);
                }
            }
            Err(err) => {
                let message = format!("{:#}", err);
                warn!("Job {} attempt {} failed: {}", entry.job_id, attempts, message);

                if self.retry_policy.has_budget(attempts) {
                    // The status stays `processing` during the backoff
                    // window; a lookup mid-wait must not show `pending`.
                    let delay = self.retry_policy.backoff_delay(attempts);
                    info!(
                        "Job {} will be retried in {}ms (attempt {}/{})",
                        entry.job_id,
                        delay.as_millis(),
                        attempts,
                        self.retry_policy.max_attempts
                    );
                    self.broker
                        .enqueue_after(priority, entry, delay, shutdown.clone());
                } else {
                    if let Err(e) = self.store.mark_failed(&entry.job_id, &message) {
                        error!("Failed to mark job {} failed: {:#}", entry.job_id, e);
                        return;
                    }
                    info!(
                        "Job {} permanently failed after {} attempts",
                        entry.job_id, attempts
                    );
                    for observer in &self.observers {
                        observer.on_failed(&entry.job_id, &message);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueSettings;
    use crate::handlers::JobHandler;
    use crate::job_store::{JobRecord, JobStatus, SqliteJobStore};
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use serde_json::{json, Value as JsonValue};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct SucceedingHandler;

    #[async_trait]
    impl JobHandler for SucceedingHandler {
        async fn execute(&self, _job_id: &str, _payload: &JsonValue) -> Result<JsonValue> {
            Ok(json!({"done": true}))
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl JobHandler for FailingHandler {
        async fn execute(&self, _job_id: &str, _payload: &JsonValue) -> Result<JsonValue> {
            bail!("handler exploded")
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        completed: Mutex<Vec<String>>,
        failed: Mutex<Vec<(String, String)>>,
    }

    impl JobObserver for RecordingObserver {
        fn on_completed(&self, job_id: &str, _result: &JsonValue) {
            self.completed.lock().unwrap().push(job_id.to_string());
        }

        fn on_failed(&self, job_id: &str, error: &str) {
            self.failed
                .lock()
                .unwrap()
                .push((job_id.to_string(), error.to_string()));
        }
    }

    struct TestHarness {
        store: Arc<SqliteJobStore>,
        broker: Arc<QueueBroker>,
        pool: Arc<WorkerPool>,
        observer: Arc<RecordingObserver>,
    }

    fn make_harness() -> TestHarness {
        let store = Arc::new(SqliteJobStore::in_memory().unwrap());
        let broker = Arc::new(QueueBroker::new(&QueueSettings::default()));

        let mut registry = HandlerRegistry::new();
        registry.register("OK", Arc::new(SucceedingHandler));
        registry.register("BOOM", Arc::new(FailingHandler));

        let observer = Arc::new(RecordingObserver::default());
        let mut pool = WorkerPool::new(
            store.clone(),
            broker.clone(),
            Arc::new(registry),
            RetryPolicy::default(),
        );
        pool.add_observer(observer.clone());

        TestHarness {
            store,
            broker,
            pool: Arc::new(pool),
            observer,
        }
    }

    fn submit(harness: &TestHarness, job_type: &str) -> JobRecord {
        let record = JobRecord::new(job_type.to_string(), JobPriority::Default, json!({}));
        harness.store.insert(&record).unwrap();
        record
    }

    #[tokio::test]
    async fn test_successful_execution_completes_job() {
        let harness = make_harness();
        let record = submit(&harness, "OK");
        let shutdown = CancellationToken::new();

        harness
            .pool
            .process_entry(JobPriority::Default, QueueEntry::for_job(&record), &shutdown)
            .await;

        let fetched = harness.store.fetch(&record.id).unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Completed);
        assert_eq!(fetched.attempts, 1);
        assert_eq!(fetched.result, Some(json!({"done": true})));
        assert!(fetched.error.is_none());

        assert_eq!(*harness.observer.completed.lock().unwrap(), vec![record.id]);
    }

    #[tokio::test]
    async fn test_failure_keeps_processing_and_schedules_retry() {
        let harness = make_harness();
        let record = submit(&harness, "BOOM");
        let shutdown = CancellationToken::new();

        harness
            .pool
            .process_entry(JobPriority::Default, QueueEntry::for_job(&record), &shutdown)
            .await;

        let fetched = harness.store.fetch(&record.id).unwrap().unwrap();
        // Intentionally NOT reverted to pending during the backoff window
        assert_eq!(fetched.status, JobStatus::Processing);
        assert_eq!(fetched.attempts, 1);
        assert!(fetched.error.is_none());
        assert!(harness.observer.failed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retries_are_bounded_and_terminal_failure_recorded() {
        let harness = make_harness();
        let record = submit(&harness, "BOOM");
        let shutdown = CancellationToken::new();

        for _ in 0..3 {
            harness
                .pool
                .process_entry(JobPriority::Default, QueueEntry::for_job(&record), &shutdown)
                .await;
        }

        let fetched = harness.store.fetch(&record.id).unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Failed);
        assert_eq!(fetched.attempts, 3);
        assert!(fetched.error.as_deref().unwrap().contains("handler exploded"));

        let failed = harness.observer.failed.lock().unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, record.id);
    }

    #[tokio::test]
    async fn test_redelivery_of_completed_job_is_noop() {
        let harness = make_harness();
        let record = submit(&harness, "OK");
        let shutdown = CancellationToken::new();
        let entry = QueueEntry::for_job(&record);

        harness
            .pool
            .process_entry(JobPriority::Default, entry.clone(), &shutdown)
            .await;
        let after_first = harness.store.fetch(&record.id).unwrap().unwrap();

        // Redeliver the same entry
        harness
            .pool
            .process_entry(JobPriority::Default, entry, &shutdown)
            .await;
        let after_second = harness.store.fetch(&record.id).unwrap().unwrap();

        assert_eq!(after_second.status, JobStatus::Completed);
        assert_eq!(after_second.attempts, after_first.attempts);
        assert_eq!(after_second.result, after_first.result);
        assert_eq!(harness.observer.completed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_redelivery_of_failed_job_is_noop() {
        let harness = make_harness();
        let record = submit(&harness, "BOOM");
        let shutdown = CancellationToken::new();
        let entry = QueueEntry::for_job(&record);

        for _ in 0..3 {
            harness
                .pool
                .process_entry(JobPriority::Default, entry.clone(), &shutdown)
                .await;
        }
        let after_terminal = harness.store.fetch(&record.id).unwrap().unwrap();
        assert_eq!(after_terminal.status, JobStatus::Failed);

        harness
            .pool
            .process_entry(JobPriority::Default, entry, &shutdown)
            .await;

        let after_redelivery = harness.store.fetch(&record.id).unwrap().unwrap();
        assert_eq!(after_redelivery.status, JobStatus::Failed);
        assert_eq!(after_redelivery.attempts, 3);
        assert_eq!(after_redelivery.error, after_terminal.error);
        assert_eq!(harness.observer.failed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_type_exhausts_attempts_before_failing() {
        let harness = make_harness();
        let record = submit(&harness, "NO_SUCH_TYPE");
        let shutdown = CancellationToken::new();

        for expected_attempts in 1..=2 {
            harness
                .pool
                .process_entry(JobPriority::Default, QueueEntry::for_job(&record), &shutdown)
                .await;
            let fetched = harness.store.fetch(&record.id).unwrap().unwrap();
            assert_eq!(fetched.status, JobStatus::Processing);
            assert_eq!(fetched.attempts, expected_attempts);
        }

        harness
            .pool
            .process_entry(JobPriority::Default, QueueEntry::for_job(&record), &shutdown)
            .await;

        let fetched = harness.store.fetch(&record.id).unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Failed);
        assert_eq!(fetched.attempts, 3);
        assert!(fetched
            .error
            .as_deref()
            .unwrap()
            .contains("Unknown job type: NO_SUCH_TYPE"));
    }

    #[tokio::test]
    async fn test_entry_for_missing_record_is_dropped() {
        let harness = make_harness();
        let shutdown = CancellationToken::new();

        let orphan = QueueEntry {
            job_id: "no-such-job".to_string(),
            job_type: "OK".to_string(),
            payload: json!({}),
        };
        harness
            .pool
            .process_entry(JobPriority::Default, orphan, &shutdown)
            .await;

        assert!(harness.observer.completed.lock().unwrap().is_empty());
        assert!(harness.observer.failed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_lane_limit() {
        use tokio::sync::Semaphore;

        struct CountingHandler {
            in_flight: AtomicUsize,
            max_seen: AtomicUsize,
            release: Arc<Semaphore>,
        }

        #[async_trait]
        impl JobHandler for CountingHandler {
            async fn execute(&self, _job_id: &str, _payload: &JsonValue) -> Result<JsonValue> {
                let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_seen.fetch_max(current, Ordering::SeqCst);
                let _permit = self.release.acquire().await?;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(json!({}))
            }
        }

        let store = Arc::new(SqliteJobStore::in_memory().unwrap());
        let broker = Arc::new(QueueBroker::new(&QueueSettings::default()));

        let release = Arc::new(Semaphore::new(0));
        let handler = Arc::new(CountingHandler {
            in_flight: AtomicUsize::new(0),
            max_seen: AtomicUsize::new(0),
            release: release.clone(),
        });

        let mut registry = HandlerRegistry::new();
        registry.register("SLOW", handler.clone());

        let pool = Arc::new(WorkerPool::new(
            store.clone(),
            broker.clone(),
            Arc::new(registry),
            RetryPolicy::default(),
        ));

        let shutdown = CancellationToken::new();
        let handles = pool.spawn(shutdown.clone());

        // Flood the default lane with more jobs than its concurrency limit
        for _ in 0..10 {
            let record = JobRecord::new("SLOW".to_string(), JobPriority::Default, json!({}));
            store.insert(&record).unwrap();
            broker.enqueue(JobPriority::Default, QueueEntry::for_job(&record));
        }

        // Give executors time to pick up as much work as they can
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        let max_during_flood = handler.max_seen.load(Ordering::SeqCst);

        // Let everything drain
        release.add_permits(10);
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;

        assert!(max_during_flood >= 1);
        assert!(
            max_during_flood <= broker.concurrency(JobPriority::Default),
            "in-flight count {} exceeded lane limit {}",
            max_during_flood,
            broker.concurrency(JobPriority::Default)
        );

        shutdown.cancel();
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
