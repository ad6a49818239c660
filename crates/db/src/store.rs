//! SQL-backed implementations of the engine's store interfaces.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use matmul_core::codec::{self, MatrixFileError, NumberFormat};
use matmul_core::job::JobStatus;
use matmul_core::matrix::Matrix;
use matmul_core::store::{
    BenchmarkResult, CompletedJob, FailedJob, JobStore, NewJob, ResultSink, StoreError,
};

use crate::models::job::{CompleteJob, Job};
use crate::repositories::{BenchmarkRepo, JobRepo};
use crate::DbPool;

/// Default number of result elements stored inline in the `jobs` row.
pub const DEFAULT_RESULT_INLINE_LIMIT: usize = 10_000;

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

// ---------------------------------------------------------------------------
// Result storage
// ---------------------------------------------------------------------------

/// Where a completed job's result matrix lives.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredResult {
    Inline(Matrix),
    File(PathBuf),
}

/// Inline-or-file placement of result matrices.
///
/// Results with at most `inline_limit` elements are stored as JSON in the
/// row; larger results are written to `dir/<job_id>.txt` in the matrix
/// interchange format and only the path is stored.
#[derive(Debug, Clone)]
pub struct ResultStorage {
    pub dir: PathBuf,
    pub inline_limit: usize,
}

impl ResultStorage {
    pub fn new(dir: impl Into<PathBuf>, inline_limit: usize) -> Self {
        Self {
            dir: dir.into(),
            inline_limit,
        }
    }

    /// Load from environment variables with defaults.
    ///
    /// | Env Var               | Default           |
    /// |-----------------------|-------------------|
    /// | `RESULT_DIR`          | `./work/results`  |
    /// | `RESULT_INLINE_LIMIT` | `10000`           |
    pub fn from_env() -> Self {
        let dir = std::env::var("RESULT_DIR").unwrap_or_else(|_| "./work/results".into());
        let inline_limit: usize = std::env::var("RESULT_INLINE_LIMIT")
            .unwrap_or_else(|_| DEFAULT_RESULT_INLINE_LIMIT.to_string())
            .parse()
            .expect("RESULT_INLINE_LIMIT must be a valid usize");
        Self::new(dir, inline_limit)
    }

    /// Place `matrix` for `job_id`, writing a file when it is over the limit.
    pub async fn persist(&self, job_id: &str, matrix: &Matrix) -> Result<StoredResult, MatrixFileError> {
        if matrix.len() <= self.inline_limit {
            return Ok(StoredResult::Inline(matrix.clone()));
        }
        let path = self.path_for(job_id)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| MatrixFileError::Io {
                path: self.dir.display().to_string(),
                source,
            })?;
        codec::write_matrix_file(&path, matrix, NumberFormat::Compact).await?;
        Ok(StoredResult::File(path))
    }

    /// Read back the result of `job`, wherever it was placed.
    pub async fn load(&self, job: &Job) -> Result<Option<Matrix>, MatrixFileError> {
        if let Some(result) = &job.result {
            return Ok(Some(result.0.clone()));
        }
        match &job.result_path {
            Some(path) => codec::read_matrix_file(Path::new(path)).await.map(Some),
            None => Ok(None),
        }
    }

    fn path_for(&self, job_id: &str) -> Result<PathBuf, MatrixFileError> {
        let safe = !job_id.is_empty()
            && job_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !safe {
            return Err(MatrixFileError::Io {
                path: job_id.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "job id is not usable as a file name",
                ),
            });
        }
        Ok(self.dir.join(format!("{job_id}.txt")))
    }
}

// ---------------------------------------------------------------------------
// Job store
// ---------------------------------------------------------------------------

/// [`JobStore`] over the `jobs` table.
#[derive(Clone)]
pub struct SqlJobStore {
    pool: DbPool,
    results: ResultStorage,
}

impl SqlJobStore {
    pub fn new(pool: DbPool, results: ResultStorage) -> Self {
        Self { pool, results }
    }

    pub fn results(&self) -> &ResultStorage {
        &self.results
    }

    /// Map an unchanged update to `NotFound` when the job does not exist.
    async fn changed_or_missing(&self, id: &str, changed: bool) -> Result<bool, StoreError> {
        if changed {
            return Ok(true);
        }
        match JobRepo::find_status(&self.pool, id).await.map_err(backend)? {
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }
}

#[async_trait]
impl JobStore for SqlJobStore {
    async fn create_job(&self, job: &NewJob) -> Result<(), StoreError> {
        JobRepo::create(&self.pool, job, chrono::Utc::now())
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    StoreError::Duplicate(job.id.clone())
                }
                _ => backend(e),
            })?;
        Ok(())
    }

    async fn job_status(&self, id: &str) -> Result<Option<JobStatus>, StoreError> {
        JobRepo::find_status(&self.pool, id).await.map_err(backend)
    }

    async fn mark_running(&self, id: &str) -> Result<bool, StoreError> {
        let changed = JobRepo::mark_running(&self.pool, id, chrono::Utc::now())
            .await
            .map_err(backend)?;
        self.changed_or_missing(id, changed).await
    }

    async fn mark_completed(&self, id: &str, completed: &CompletedJob) -> Result<bool, StoreError> {
        match JobRepo::find_status(&self.pool, id).await.map_err(backend)? {
            None => return Err(StoreError::NotFound(id.to_string())),
            Some(status) if status.is_terminal() => return Ok(false),
            Some(_) => {}
        }

        let stored = self
            .results
            .persist(id, &completed.result)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let (result, result_path) = match stored {
            StoredResult::Inline(matrix) => (Some(matrix), None),
            StoredResult::File(path) => (None, Some(path.display().to_string())),
        };

        let update = CompleteJob {
            result,
            result_path,
            compute_time_ms: completed.compute_time_ms,
            execution_time_ms: completed.execution_time_ms,
            total_time_ms: completed.total_time_ms,
        };
        JobRepo::mark_completed(&self.pool, id, &update, chrono::Utc::now())
            .await
            .map_err(backend)
    }

    async fn mark_failed(&self, id: &str, failed: &FailedJob) -> Result<bool, StoreError> {
        let changed = JobRepo::mark_failed(
            &self.pool,
            id,
            &failed.error_message,
            failed.total_time_ms,
            chrono::Utc::now(),
        )
        .await
        .map_err(backend)?;
        self.changed_or_missing(id, changed).await
    }
}

// ---------------------------------------------------------------------------
// Result sink
// ---------------------------------------------------------------------------

/// [`ResultSink`] over the `benchmark_results` table.
#[derive(Clone)]
pub struct SqlResultSink {
    pool: DbPool,
}

impl SqlResultSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultSink for SqlResultSink {
    async fn upsert_result(&self, result: &BenchmarkResult) -> Result<(), StoreError> {
        BenchmarkRepo::upsert_result(&self.pool, result, chrono::Utc::now())
            .await
            .map_err(backend)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
