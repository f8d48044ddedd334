//! Job store module
//!
//! Persisted job records are the source of truth for every job's lifecycle.
//! The store is written by the dispatcher (insert) and the worker pool
//! (status transitions); the HTTP layer only ever reads from it.

mod models;
mod schema;
mod store;

pub use models::{JobPriority, JobRecord, JobStats, JobStatus};
pub use schema::JOBS_VERSIONED_SCHEMAS;
pub use store::{JobStore, SqliteJobStore};
