//! Handlers for the `/jobs` resource.
//!
//! Submission validates the operands, persists a queued job and hands it to
//! the dispatcher; the response never waits on the compute binaries.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use matmul_core::error::CoreError;
use matmul_core::job::{truncate_error_message, JobPayload, JobStatus};
use matmul_core::matrix::Matrix;
use matmul_core::store::NewJob;
use matmul_core::types::{JobId, Timestamp};
use matmul_db::models::job::{Job, JobListQuery};
use matmul_db::repositories::JobRepo;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Body of `POST /api/v1/jobs`.
#[derive(Debug, Deserialize)]
pub struct SubmitJob {
    #[serde(alias = "matrixA")]
    pub matrix_a: Vec<Vec<f64>>,
    #[serde(alias = "matrixB")]
    pub matrix_b: Vec<Vec<f64>>,
    /// Worker-process override for the parallel run.
    pub procs: Option<u32>,
}

/// Body of a 202 submission response.
#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// Query parameters for `GET /api/v1/jobs/{id}`.
#[derive(Debug, Default, Deserialize)]
pub struct JobDetailQuery {
    /// Comma-separated extras; `matrices` adds the input operands.
    pub include: Option<String>,
}

impl JobDetailQuery {
    fn includes(&self, what: &str) -> bool {
        self.include
            .as_deref()
            .is_some_and(|inc| inc.split(',').any(|part| part.trim() == what))
    }
}

/// Public representation of a job.
#[derive(Debug, Serialize)]
pub struct JobView {
    pub id: JobId,
    pub status: JobStatus,
    pub rows_a: i64,
    pub cols_a: i64,
    pub cols_b: i64,
    pub procs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Matrix>,
    pub error_message: Option<String>,
    pub compute_time_ms: Option<f64>,
    pub execution_time_ms: Option<f64>,
    pub total_time_ms: Option<f64>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matrix_a: Option<Matrix>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matrix_b: Option<Matrix>,
}

impl JobView {
    fn new(job: Job, result: Option<Matrix>) -> Self {
        Self {
            status: job.status(),
            id: job.id,
            rows_a: job.rows_a,
            cols_a: job.cols_a,
            cols_b: job.cols_b,
            procs: job.procs,
            result,
            error_message: job.error_message,
            compute_time_ms: job.compute_time_ms,
            execution_time_ms: job.execution_time_ms,
            total_time_ms: job.total_time_ms,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            matrix_a: None,
            matrix_b: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build an operand, naming it in the validation message.
fn operand(name: &str, rows: Vec<Vec<f64>>) -> Result<Matrix, CoreError> {
    Matrix::from_rows(rows).map_err(|e| match e {
        CoreError::Validation(msg) => CoreError::Validation(format!("{name}: {msg}")),
        other => other,
    })
}

async fn find_job(state: &AppState, id: &str) -> AppResult<Job> {
    JobRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::NotFound {
                entity: "Job",
                id: id.to_string(),
            })
        })
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Validate both operands and the product shape, create a queued job and
/// enqueue it. Returns 202 with the job id.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(input): Json<SubmitJob>,
) -> AppResult<impl IntoResponse> {
    let matrix_a = operand("matrix_a", input.matrix_a)?;
    let matrix_b = operand("matrix_b", input.matrix_b)?;
    let payload = JobPayload::new(matrix_a.clone(), matrix_b.clone(), input.procs)?;

    let job_id = uuid::Uuid::new_v4().to_string();
    let new_job = NewJob {
        id: job_id.clone(),
        matrix_a,
        matrix_b,
        procs: input.procs,
    };
    JobRepo::create(&state.pool, &new_job, chrono::Utc::now()).await?;

    let (rows_a, cols_a, cols_b) = payload.dimensions();
    if let Err(err) = state.dispatcher.submit(job_id.clone(), payload) {
        tracing::error!(job_id = %job_id, error = %err, "Failed to enqueue job");
        let message = truncate_error_message(&format!("DISPATCH_ERROR: {err}"));
        JobRepo::mark_failed(&state.pool, &job_id, &message, 0.0, chrono::Utc::now()).await?;
        return Err(err.into());
    }

    tracing::info!(job_id = %job_id, rows_a, cols_a, cols_b, procs = ?input.procs, "Job submitted");

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: JobAccepted {
                job_id,
                status: JobStatus::Queued,
            },
        }),
    ))
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs
///
/// List jobs without result matrices. Supports `status`, `sort=asc|desc`,
/// `limit` and `offset` query parameters.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let jobs = JobRepo::list(&state.pool, &params).await?;
    let data: Vec<JobView> = jobs.into_iter().map(|job| JobView::new(job, None)).collect();
    Ok(Json(DataResponse { data }))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
///
/// Get a single job with its result once completed. `?include=matrices`
/// adds the input operands.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(params): Query<JobDetailQuery>,
) -> AppResult<impl IntoResponse> {
    let job = find_job(&state, &job_id).await?;

    let result = state
        .results
        .load(&job)
        .await
        .map_err(|e| AppError::InternalError(format!("cannot load result of job {job_id}: {e}")))?;

    let mut view = JobView::new(job, result);
    if params.includes("matrices") {
        if let Some(inputs) = JobRepo::find_inputs(&state.pool, &job_id).await? {
            view.matrix_a = Some(inputs.matrix_a.0);
            view.matrix_b = Some(inputs.matrix_b.0);
        }
    }

    Ok(Json(DataResponse { data: view }))
}
