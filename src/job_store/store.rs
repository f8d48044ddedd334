//! Job storage and persistence.
//!
//! Provides SQLite-backed storage for job records. The store is the
//! authoritative source of truth for job state; queue entries held by the
//! broker are only references into it.

use super::models::{JobPriority, JobRecord, JobStats, JobStatus};
use super::schema::JOBS_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::BASE_DB_VERSION;
use anyhow::{bail, Context, Result};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Trait for job record storage operations.
pub trait JobStore: Send + Sync {
    /// Insert a new job record.
    fn insert(&self, record: &JobRecord) -> Result<()>;

    /// Fetch a job record by id.
    fn fetch(&self, id: &str) -> Result<Option<JobRecord>>;

    /// Advance a job to `processing` with the given attempt count.
    /// Written before the handler executes so a crash mid-execution still
    /// leaves an accurate attempt count.
    fn mark_processing(&self, id: &str, attempts: i64) -> Result<()>;

    /// Record a successful execution with the handler's output.
    fn mark_completed(&self, id: &str, result: &serde_json::Value) -> Result<()>;

    /// Record a terminal failure with the causing message.
    fn mark_failed(&self, id: &str, error: &str) -> Result<()>;

    /// List all pending jobs, oldest first. Used to rebuild the queues at
    /// startup.
    fn list_pending(&self) -> Result<Vec<JobRecord>>;

    /// List non-terminal jobs whose last update is older than the threshold.
    /// These are candidates for re-enqueueing by the reconciliation sweep.
    fn list_stuck(&self, stale_threshold_secs: i64) -> Result<Vec<JobRecord>>;

    /// Per-status job counts.
    fn stats(&self) -> Result<JobStats>;
}

/// SQLite-backed job store.
pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    /// Create a new SqliteJobStore.
    ///
    /// Opens an existing database or creates a new one with the current
    /// schema. Existing databases are validated against the expected schema
    /// and migrated if needed.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = if db_path.as_ref().exists() {
            Connection::open_with_flags(
                &db_path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                    | rusqlite::OpenFlags::SQLITE_OPEN_URI
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?
        } else {
            let conn = Connection::open(&db_path)?;
            JOBS_VERSIONED_SCHEMAS
                .last()
                .context("No schemas defined")?
                .create(&conn)?;
            info!("Created new jobs database at {:?}", db_path.as_ref());
            conn
        };

        // Read the database version
        let db_version = conn
            .query_row("PRAGMA user_version;", [], |row| row.get::<usize, i64>(0))
            .context("Failed to read database version")?
            - BASE_DB_VERSION as i64;

        if db_version < 0 {
            bail!(
                "Jobs database version {} is too old, does not contain base db version {}",
                db_version,
                BASE_DB_VERSION
            );
        }
        let version = db_version as usize;

        let schema_count = JOBS_VERSIONED_SCHEMAS.len();
        if version >= schema_count {
            bail!(
                "Jobs database version {} is too new (max supported: {})",
                version,
                schema_count - 1
            );
        }

        // Validate schema matches expected structure
        JOBS_VERSIONED_SCHEMAS
            .get(version)
            .context("Failed to get schema")?
            .validate(&conn)?;

        Self::migrate_if_needed(&conn, version)?;

        Ok(SqliteJobStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store for testing.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        JOBS_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;

        Ok(SqliteJobStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run any pending migrations.
    fn migrate_if_needed(conn: &Connection, current_version: usize) -> Result<()> {
        let target_version = JOBS_VERSIONED_SCHEMAS.len() - 1;

        if current_version >= target_version {
            return Ok(());
        }

        info!(
            "Migrating jobs database from version {} to {}",
            current_version, target_version
        );

        for schema in JOBS_VERSIONED_SCHEMAS.iter().skip(current_version + 1) {
            if let Some(migration_fn) = schema.migration {
                info!("Running jobs migration to version {}", schema.version);
                migration_fn(conn)?;
            }
        }

        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + target_version),
            [],
        )?;

        Ok(())
    }

    /// Helper to convert a database row to a JobRecord.
    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<JobRecord> {
        let payload_text: String = row.get("payload")?;
        let result_text: Option<String> = row.get("result")?;
        Ok(JobRecord {
            id: row.get("id")?,
            job_type: row.get("job_type")?,
            priority: JobPriority::from_str(&row.get::<_, String>("priority")?)
                .unwrap_or(JobPriority::Default),
            payload: serde_json::from_str(&payload_text).unwrap_or(serde_json::Value::Null),
            status: JobStatus::from_db_str(&row.get::<_, String>("status")?)
                .unwrap_or(JobStatus::Pending),
            attempts: row.get("attempts")?,
            result: result_text.and_then(|t| serde_json::from_str(&t).ok()),
            error: row.get("error")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    /// Get current timestamp in seconds.
    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

impl JobStore for SqliteJobStore {
    fn insert(&self, record: &JobRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO jobs (
                id, job_type, priority, payload, status, attempts,
                result, error, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
            rusqlite::params![
                record.id,
                record.job_type,
                record.priority.as_str(),
                serde_json::to_string(&record.payload)?,
                record.status.as_db_str(),
                record.attempts,
                record
                    .result
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                record.error,
                record.created_at,
                record.updated_at,
            ],
        )?;
        Ok(())
    }

    fn fetch(&self, id: &str) -> Result<Option<JobRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM jobs WHERE id = ?1")?;

        let record = stmt.query_row([id], Self::row_to_record).optional()?;

        Ok(record)
    }

    fn mark_processing(&self, id: &str, attempts: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            r#"UPDATE jobs
               SET status = 'processing', attempts = ?1, updated_at = ?2
               WHERE id = ?3"#,
            rusqlite::params![attempts, Self::now(), id],
        )?;
        if updated == 0 {
            bail!("Job not found: {}", id);
        }
        Ok(())
    }

    fn mark_completed(&self, id: &str, result: &serde_json::Value) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            r#"UPDATE jobs
               SET status = 'completed', result = ?1, updated_at = ?2
               WHERE id = ?3"#,
            rusqlite::params![serde_json::to_string(result)?, Self::now(), id],
        )?;
        if updated == 0 {
            bail!("Job not found: {}", id);
        }
        Ok(())
    }

    fn mark_failed(&self, id: &str, error: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            r#"UPDATE jobs
               SET status = 'failed', error = ?1, updated_at = ?2
               WHERE id = ?3"#,
            rusqlite::params![error, Self::now(), id],
        )?;
        if updated == 0 {
            bail!("Job not found: {}", id);
        }
        Ok(())
    }

    fn list_pending(&self) -> Result<Vec<JobRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT * FROM jobs
               WHERE status = 'pending'
               ORDER BY created_at ASC"#,
        )?;

        let records = stmt
            .query_map([], Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    fn list_stuck(&self, stale_threshold_secs: i64) -> Result<Vec<JobRecord>> {
        let cutoff = Self::now() - stale_threshold_secs;
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT * FROM jobs
               WHERE status IN ('pending', 'processing') AND updated_at <= ?1
               ORDER BY created_at ASC"#,
        )?;

        let records = stmt
            .query_map([cutoff], Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    fn stats(&self) -> Result<JobStats> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;

        let mut stats = JobStats::default();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (status, count) = row?;
            let count = count as usize;
            match JobStatus::from_db_str(&status) {
                Some(JobStatus::Pending) => stats.pending = count,
                Some(JobStatus::Processing) => stats.processing = count,
                Some(JobStatus::Completed) => stats.completed = count,
                Some(JobStatus::Failed) => stats.failed = count,
                None => {}
            }
        }

        Ok(stats)
    }
}
