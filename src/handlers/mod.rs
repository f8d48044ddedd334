//! Job handler registry and the built-in handlers.
//!
//! A handler is the pluggable task implementation for one job type. It
//! receives the job id and the opaque payload, performs its own I/O, and is
//! solely responsible for validating its own payload shape. Failures are
//! reported as errors with a human-readable message; the worker pool turns
//! them into retry or terminal-failure transitions.

mod csv_export;
mod email_send;

pub use csv_export::CsvExportHandler;
pub use email_send::EmailSendHandler;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

/// Pluggable task implementation for one job type.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Execute the job, returning a serializable result.
    async fn execute(&self, job_id: &str, payload: &JsonValue) -> Result<JsonValue>;
}

/// Maps job type strings to handler implementations.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(job_type.into(), handler);
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn job_types(&self) -> Vec<&str> {
        self.handlers.keys().map(|k| k.as_str()).collect()
    }
}
