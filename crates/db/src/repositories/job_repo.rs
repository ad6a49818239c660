//! Repository for the `jobs` table.
//!
//! Status updates are guarded in SQL so that a transition applied twice, or
//! applied to a terminal job, matches no rows instead of overwriting.

use matmul_core::job::JobStatus;
use matmul_core::store::NewJob;
use matmul_core::types::Timestamp;
use sqlx::types::Json;

use crate::models::job::{CompleteJob, Job, JobInputs, JobListQuery};
use crate::DbPool;

/// Column list for `jobs` queries (inputs excluded).
const COLUMNS: &str = "\
    id, status, rows_a, cols_a, cols_b, procs, \
    result, result_path, error_message, \
    compute_time_ms, execution_time_ms, total_time_ms, \
    created_at, started_at, completed_at";

/// Maximum page size for job listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
const DEFAULT_LIMIT: i64 = 50;

/// Provides persistence operations for compute jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new queued job.
    pub async fn create(pool: &DbPool, input: &NewJob, now: Timestamp) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (id, status, rows_a, cols_a, cols_b, procs, matrix_a, matrix_b, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(&input.id)
            .bind(JobStatus::Queued.as_str())
            .bind(input.matrix_a.rows() as i64)
            .bind(input.matrix_a.cols() as i64)
            .bind(input.matrix_b.cols() as i64)
            .bind(input.procs.map(i64::from))
            .bind(Json(&input.matrix_a))
            .bind(Json(&input.matrix_b))
            .bind(now)
            .fetch_one(pool)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &DbPool, id: &str) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = ?1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Current status of a job, if it exists.
    pub async fn find_status(pool: &DbPool, id: &str) -> Result<Option<JobStatus>, sqlx::Error> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM jobs WHERE id = ?1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(status.and_then(|s| s.parse().ok()))
    }

    /// Load the stored input matrices of a job.
    pub async fn find_inputs(pool: &DbPool, id: &str) -> Result<Option<JobInputs>, sqlx::Error> {
        sqlx::query_as::<_, JobInputs>("SELECT matrix_a, matrix_b FROM jobs WHERE id = ?1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List jobs with optional status filter and pagination.
    pub async fn list(pool: &DbPool, params: &JobListQuery) -> Result<Vec<Job>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = params.offset.unwrap_or(0).max(0);
        let order = params.sort.unwrap_or_default().as_sql();

        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE (?1 IS NULL OR status = ?1) \
             ORDER BY created_at {order}, rowid {order} \
             LIMIT ?2 OFFSET ?3"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(params.status.map(JobStatus::as_str))
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Move a queued job to `running`, stamping `started_at`.
    ///
    /// Returns `false` when the job is not queued (already running, terminal
    /// or missing).
    pub async fn mark_running(pool: &DbPool, id: &str, now: Timestamp) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET status = ?2, started_at = COALESCE(started_at, ?3) \
             WHERE id = ?1 AND status = ?4",
        )
        .bind(id)
        .bind(JobStatus::Running.as_str())
        .bind(now)
        .bind(JobStatus::Queued.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a non-terminal job completed with its result and timings.
    ///
    /// Returns `false` if the job was already terminal or does not exist.
    pub async fn mark_completed(
        pool: &DbPool,
        id: &str,
        input: &CompleteJob,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status = ?2, result = ?3, result_path = ?4, \
                 compute_time_ms = ?5, execution_time_ms = ?6, total_time_ms = ?7, \
                 error_message = NULL, completed_at = ?8, \
                 started_at = COALESCE(started_at, ?8) \
             WHERE id = ?1 AND status IN (?9, ?10)",
        )
        .bind(id)
        .bind(JobStatus::Completed.as_str())
        .bind(input.result.as_ref().map(Json))
        .bind(&input.result_path)
        .bind(input.compute_time_ms)
        .bind(input.execution_time_ms)
        .bind(input.total_time_ms)
        .bind(now)
        .bind(JobStatus::Queued.as_str())
        .bind(JobStatus::Running.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a non-terminal job failed.
    ///
    /// Returns `false` if the job was already terminal or does not exist.
    pub async fn mark_failed(
        pool: &DbPool,
        id: &str,
        error_message: &str,
        total_time_ms: f64,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status = ?2, error_message = ?3, total_time_ms = ?4, completed_at = ?5 \
             WHERE id = ?1 AND status IN (?6, ?7)",
        )
        .bind(id)
        .bind(JobStatus::Failed.as_str())
        .bind(error_message)
        .bind(total_time_ms)
        .bind(now)
        .bind(JobStatus::Queued.as_str())
        .bind(JobStatus::Running.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Fail every job left `queued` or `running` by a previous process.
    ///
    /// Returns the number of jobs that were failed.
    pub async fn fail_unfinished(
        pool: &DbPool,
        error_message: &str,
        now: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status = ?1, error_message = ?2, completed_at = ?3 \
             WHERE status IN (?4, ?5)",
        )
        .bind(JobStatus::Failed.as_str())
        .bind(error_message)
        .bind(now)
        .bind(JobStatus::Queued.as_str())
        .bind(JobStatus::Running.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
