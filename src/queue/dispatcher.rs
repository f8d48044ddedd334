//! Job submission path.
//!
//! Validates a submission, writes the initial job record, then enqueues a
//! reference into the lane matching the job's priority. The insert must
//! complete before the enqueue so a dequeued entry can always resolve a
//! matching record.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::info;

use crate::job_store::{JobPriority, JobRecord, JobStore};

use super::broker::{QueueBroker, QueueEntry};

/// Submission failure modes.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Malformed submission; rejected synchronously, no record created.
    #[error("{0}")]
    InvalidRequest(String),
    /// The job store was unreachable or rejected the write.
    #[error("job store error: {0}")]
    Store(#[source] anyhow::Error),
}

/// Producer side of the queue: validates and persists submissions, then
/// routes them into the broker.
pub struct Dispatcher {
    store: Arc<dyn JobStore>,
    broker: Arc<QueueBroker>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn JobStore>, broker: Arc<QueueBroker>) -> Self {
        Self { store, broker }
    }

    /// Submit a new job. Returns the persisted job id.
    pub fn submit(
        &self,
        job_type: &str,
        priority: JobPriority,
        payload: JsonValue,
    ) -> Result<String, SubmitError> {
        if job_type.trim().is_empty() || payload.is_null() {
            return Err(SubmitError::InvalidRequest(
                "type and payload are required".to_string(),
            ));
        }

        let record = JobRecord::new(job_type.to_string(), priority, payload);
        self.store.insert(&record).map_err(SubmitError::Store)?;

        // If the process dies between insert and enqueue the record stays
        // `pending` with no queue entry; the reconciliation sweep picks it
        // up later.
        self.broker.enqueue(priority, QueueEntry::for_job(&record));

        info!(
            "Job created: {} (type: {}, priority: {})",
            record.id,
            record.job_type,
            priority.as_str()
        );
        Ok(record.id)
    }
}
