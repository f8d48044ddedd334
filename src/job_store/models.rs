//! Data models for the job store.
//!
//! Defines job records, statuses, priorities, and queue statistics.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Status of a job in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed, // terminal
    Failed,    // terminal
}

impl JobStatus {
    /// Returns true if this is a terminal state (Completed or Failed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_db_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// Priority class of a job. Each priority is serviced by exactly one lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    Default,
    High,
}

impl JobPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPriority::Default => "default",
            JobPriority::High => "high",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "default" => Some(JobPriority::Default),
            "high" => Some(JobPriority::High),
            _ => None,
        }
    }
}

/// A persisted job record. This is the authoritative state for one unit of
/// work; the broker only ever holds lightweight references to it.
#[derive(Debug, Clone)]
pub struct JobRecord {
    /// Unique identifier (UUID), assigned at creation.
    pub id: String,
    /// Key into the handler registry.
    pub job_type: String,
    /// Priority class, fixed at creation.
    pub priority: JobPriority,
    /// Opaque payload, interpreted only by the handler.
    pub payload: JsonValue,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Execution attempts made so far. Advanced by the worker before each
    /// execution, never by the dispatcher.
    pub attempts: i64,
    /// Handler output, set only on Completed.
    pub result: Option<JsonValue>,
    /// Last failure message, set only on terminal Failed.
    pub error: Option<String>,
    /// When the record was created (Unix timestamp).
    pub created_at: i64,
    /// Refreshed on every state transition (Unix timestamp).
    pub updated_at: i64,
}

impl JobRecord {
    /// Create a new pending record with a fresh id.
    pub fn new(job_type: String, priority: JobPriority, payload: JsonValue) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_type,
            priority,
            payload,
            status: JobStatus::Pending,
            attempts: 0,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Per-status job counts, for the stats endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobStats {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }
}
