//! Observer hooks for job state transitions.
//!
//! Observers are invoked synchronously by the worker pool after a job
//! reaches a terminal state. They are decoupled from the retry decision
//! itself; a retry-enqueue is not a terminal transition and does not fire
//! any hook.

use serde_json::Value as JsonValue;
use tracing::info;

/// Callback interface for terminal job transitions.
pub trait JobObserver: Send + Sync {
    fn on_completed(&self, job_id: &str, result: &JsonValue);
    fn on_failed(&self, job_id: &str, error: &str);
}

/// Observer that reports terminal transitions to the log.
pub struct LoggingObserver;

impl JobObserver for LoggingObserver {
    fn on_completed(&self, job_id: &str, _result: &JsonValue) {
        info!("Job {} completed", job_id);
    }

    fn on_failed(&self, job_id: &str, error: &str) {
        info!("Job {} failed: {}", job_id, error);
    }
}
