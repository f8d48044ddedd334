mod file_config;

pub use file_config::{FileConfig, LaneConfig, QueueConfig, ReconcilerConfig, RetryConfig};

use crate::job_store::JobPriority;
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub output_dir: Option<PathBuf>,
    pub mail_url: Option<String>,
    pub mail_timeout_sec: u64,
    pub mail_from: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            db_dir: None,
            port: 3000,
            logging_level: RequestsLoggingLevel::default(),
            output_dir: None,
            mail_url: None,
            mail_timeout_sec: 30,
            mail_from: "noreply@example.com".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub output_dir: PathBuf,
    pub mail: MailSettings,

    // Feature configs (with defaults)
    pub queue: QueueSettings,
    pub retry: RetrySettings,
    pub reconciler: ReconcilerSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        // Validate db_dir exists
        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let output_dir = file
            .output_dir
            .map(PathBuf::from)
            .or_else(|| cli.output_dir.clone())
            .unwrap_or_else(|| db_dir.join("output"));

        let mail = MailSettings {
            relay_url: file.mail_url.or_else(|| cli.mail_url.clone()),
            timeout_sec: file.mail_timeout_sec.unwrap_or(cli.mail_timeout_sec),
            from: file.mail_from.unwrap_or_else(|| cli.mail_from.clone()),
        };

        let queue_file = file.queue.unwrap_or_default();
        let queue = QueueSettings {
            high: resolve_lane(queue_file.high, LaneSettings::high_defaults()),
            default_lane: resolve_lane(queue_file.default, LaneSettings::default_lane_defaults()),
        };

        let retry_file = file.retry.unwrap_or_default();
        let retry = RetrySettings {
            max_attempts: retry_file.max_attempts.unwrap_or(3),
            base_delay_ms: retry_file.base_delay_ms.unwrap_or(1000),
            max_delay_ms: retry_file.max_delay_ms.unwrap_or(10000),
        };

        let reconciler_file = file.reconciler.unwrap_or_default();
        let reconciler = ReconcilerSettings {
            interval_secs: reconciler_file.interval_secs.unwrap_or(60),
            stale_threshold_secs: reconciler_file.stale_threshold_secs.unwrap_or(3600),
        };

        Ok(Self {
            db_dir,
            port,
            logging_level,
            output_dir,
            mail,
            queue,
            retry,
            reconciler,
        })
    }

    pub fn jobs_db_path(&self) -> PathBuf {
        self.db_dir.join("jobs.db")
    }
}

fn resolve_lane(file: Option<LaneConfig>, defaults: LaneSettings) -> LaneSettings {
    let file = file.unwrap_or_default();
    LaneSettings {
        concurrency: file.concurrency.unwrap_or(defaults.concurrency),
        max_dequeues_per_window: file
            .max_dequeues_per_window
            .unwrap_or(defaults.max_dequeues_per_window),
        window_ms: file.window_ms.unwrap_or(defaults.window_ms),
    }
}

#[derive(Debug, Clone)]
pub struct MailSettings {
    /// Base URL of the mail relay; the no-op transport is used when unset.
    pub relay_url: Option<String>,
    pub timeout_sec: u64,
    pub from: String,
}

/// Settings for one queue lane.
#[derive(Debug, Clone)]
pub struct LaneSettings {
    /// Maximum simultaneous in-flight executions.
    pub concurrency: usize,
    /// Maximum dequeues per rate window (0 disables the limit).
    pub max_dequeues_per_window: u32,
    /// Length of the rate window in milliseconds.
    pub window_ms: u64,
}

impl LaneSettings {
    fn high_defaults() -> Self {
        Self {
            concurrency: 5,
            max_dequeues_per_window: 10,
            window_ms: 1000,
        }
    }

    fn default_lane_defaults() -> Self {
        Self {
            concurrency: 3,
            max_dequeues_per_window: 5,
            window_ms: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub high: LaneSettings,
    pub default_lane: LaneSettings,
}

impl QueueSettings {
    pub fn lane(&self, priority: JobPriority) -> &LaneSettings {
        match priority {
            JobPriority::High => &self.high,
            JobPriority::Default => &self.default_lane,
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            high: LaneSettings::high_defaults(),
            default_lane: LaneSettings::default_lane_defaults(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub max_attempts: i64,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub interval_secs: u64,
    pub stale_threshold_secs: i64,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            stale_threshold_secs: 3600,
        }
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
