//! Job rows and list parameters.

use matmul_core::job::JobStatus;
use matmul_core::matrix::Matrix;
use matmul_core::types::{JobId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

/// A row from the `jobs` table, without the input matrices.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: JobId,
    pub status: String,
    pub rows_a: i64,
    pub cols_a: i64,
    pub cols_b: i64,
    pub procs: Option<i64>,
    pub result: Option<Json<Matrix>>,
    pub result_path: Option<String>,
    pub error_message: Option<String>,
    pub compute_time_ms: Option<f64>,
    pub execution_time_ms: Option<f64>,
    pub total_time_ms: Option<f64>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl Job {
    /// Parsed status. Unknown strings (impossible under the table's CHECK
    /// constraint) read as `Failed`.
    pub fn status(&self) -> JobStatus {
        self.status.parse().unwrap_or(JobStatus::Failed)
    }
}

/// Input matrices of a job, loaded only on request.
#[derive(Debug, Clone, FromRow)]
pub struct JobInputs {
    pub matrix_a: Json<Matrix>,
    pub matrix_b: Json<Matrix>,
}

/// Values written when a job completes.
#[derive(Debug, Clone)]
pub struct CompleteJob {
    /// Inline result; `None` when the result went to `result_path`.
    pub result: Option<Matrix>,
    pub result_path: Option<String>,
    pub compute_time_ms: Option<f64>,
    pub execution_time_ms: f64,
    pub total_time_ms: f64,
}

/// Sort direction on `created_at`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Query parameters for `GET /api/v1/jobs`.
#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    /// Filter by status.
    pub status: Option<JobStatus>,
    /// Creation-time order. Defaults to newest first.
    pub sort: Option<SortOrder>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}
