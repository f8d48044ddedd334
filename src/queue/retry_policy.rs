//! Retry policy for failed job executions.
//!
//! Implements exponential backoff with a hard ceiling.

use crate::config::RetrySettings;
use std::time::Duration;

/// Retry policy implementing exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of execution attempts before permanent failure.
    pub max_attempts: i64,
    /// Base backoff duration in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum backoff duration in milliseconds (cap for exponential growth).
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// Create a new RetryPolicy from configuration settings.
    pub fn new(config: &RetrySettings) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }

    /// Returns true if a job with this many attempts made still has retry
    /// budget remaining.
    pub fn has_budget(&self, attempts_made: i64) -> bool {
        attempts_made < self.max_attempts
    }

    /// Backoff delay before re-enqueueing a job that has made
    /// `attempts_made` attempts: `min(base * 2^attempts_made, max)`.
    pub fn backoff_delay(&self, attempts_made: i64) -> Duration {
        // Clamp the exponent so the shift cannot overflow
        let exponent = attempts_made.clamp(0, 20) as u32;
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetrySettings::default())
    }
}
