use sqlx::SqlitePool;

use crate::error::SchedulerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A row of the `job_queue` table.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedJob {
    pub id: i64,
    pub kind: String,
    pub args: serde_json::Value,
    pub run_at: String,
    pub status: JobStatus,
    pub error: Option<String>,
    pub attempts: i64,
    pub finished_at: Option<String>,
}

type QueuedRow = (
    i64,
    String,
    String,
    String,
    String,
    Option<String>,
    i64,
    Option<String>,
);

impl QueuedJob {
    fn from_row(row: QueuedRow) -> Result<Self, SchedulerError> {
        let (id, kind, args, run_at, status, error, attempts, finished_at) = row;
        Ok(Self {
            id,
            kind,
            args: serde_json::from_str(&args)?,
            run_at,
            // Unknown statuses are only possible through manual edits.
            status: JobStatus::parse(&status).unwrap_or(JobStatus::Failed),
            error,
            attempts,
            finished_at,
        })
    }
}

#[derive(Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the `scheduled_jobs` and `job_queue` tables.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL statement fails.
    pub async fn init(&self) -> Result<(), SchedulerError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS scheduled_jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                cron_expr TEXT NOT NULL,
                kind TEXT NOT NULL,
                last_run TEXT
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS job_queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                args TEXT NOT NULL DEFAULT '{}',
                run_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                error TEXT,
                attempts INTEGER NOT NULL DEFAULT 0,
                finished_at TEXT
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_job_queue_due ON job_queue(status, run_at)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Upsert a cron job definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL statement fails.
    pub async fn upsert_job(
        &self,
        name: &str,
        cron_expr: &str,
        kind: &str,
    ) -> Result<(), SchedulerError> {
        sqlx::query(
            "INSERT INTO scheduled_jobs (name, cron_expr, kind)
             VALUES (?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET cron_expr = excluded.cron_expr, kind = excluded.kind",
        )
        .bind(name)
        .bind(cron_expr)
        .bind(kind)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a cron job execution timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL statement fails.
    pub async fn record_run(&self, name: &str, timestamp: &str) -> Result<(), SchedulerError> {
        sqlx::query("UPDATE scheduled_jobs SET last_run = ? WHERE name = ?")
            .bind(timestamp)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Set `last_run` for a cron job that has never run, leaving recorded runs alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL statement fails.
    pub async fn seed_last_run(&self, name: &str, timestamp: &str) -> Result<bool, SchedulerError> {
        let result =
            sqlx::query("UPDATE scheduled_jobs SET last_run = ? WHERE name = ? AND last_run IS NULL")
                .bind(timestamp)
                .bind(name)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Get the last run timestamp for a cron job.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL query fails.
    pub async fn last_run(&self, name: &str) -> Result<Option<String>, SchedulerError> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT last_run FROM scheduled_jobs WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|r| r.0))
    }

    /// Insert a pending job due at `run_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL statement fails.
    pub async fn insert_job(
        &self,
        kind: &str,
        args: &serde_json::Value,
        run_at: &str,
    ) -> Result<i64, SchedulerError> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO job_queue (kind, args, run_at) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(kind)
        .bind(serde_json::to_string(args)?)
        .bind(run_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Mark the earliest pending job due at or before `now` as running and
    /// return it.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL statement fails or the stored args are not JSON.
    pub async fn claim_due(&self, now: &str) -> Result<Option<QueuedJob>, SchedulerError> {
        let row: Option<QueuedRow> = sqlx::query_as(
            "UPDATE job_queue SET status = 'running', attempts = attempts + 1
             WHERE id = (
                 SELECT id FROM job_queue
                 WHERE status = 'pending' AND run_at <= ?
                 ORDER BY run_at, id LIMIT 1
             )
             RETURNING id, kind, args, run_at, status, error, attempts, finished_at",
        )
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.map(QueuedJob::from_row).transpose()
    }

    /// Mark a job as completed.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL statement fails.
    pub async fn mark_completed(&self, id: i64, finished_at: &str) -> Result<(), SchedulerError> {
        sqlx::query(
            "UPDATE job_queue SET status = 'completed', error = NULL, finished_at = ? WHERE id = ?",
        )
        .bind(finished_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark a job as failed with the error text.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL statement fails.
    pub async fn mark_failed(
        &self,
        id: i64,
        error: &str,
        finished_at: &str,
    ) -> Result<(), SchedulerError> {
        sqlx::query(
            "UPDATE job_queue SET status = 'failed', error = ?, finished_at = ? WHERE id = ?",
        )
        .bind(error)
        .bind(finished_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Return jobs left `running` by an interrupted process to `pending`.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL statement fails.
    pub async fn reset_running(&self) -> Result<u64, SchedulerError> {
        let result = sqlx::query("UPDATE job_queue SET status = 'pending' WHERE status = 'running'")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Fetch a queued job by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL query fails or the stored args are not JSON.
    pub async fn job(&self, id: i64) -> Result<Option<QueuedJob>, SchedulerError> {
        let row: Option<QueuedRow> = sqlx::query_as(
            "SELECT id, kind, args, run_at, status, error, attempts, finished_at
             FROM job_queue WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(QueuedJob::from_row).transpose()
    }
}
