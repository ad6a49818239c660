//! Persistence interfaces consumed by the execution engine.
//!
//! The engine never owns storage. Job lifecycle updates go through
//! [`JobStore`] and benchmark measurements through [`ResultSink`]; both are
//! injected at construction as trait objects.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::job::JobStatus;
use crate::matrix::Matrix;

/// Errors reported by a store implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job already exists: {0}")]
    Duplicate(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// Metadata for a newly submitted (queued) job. Creating an id that already
/// exists is rejected with [`StoreError::Duplicate`].
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: String,
    pub matrix_a: Matrix,
    pub matrix_b: Matrix,
    /// Worker-process override requested at submission.
    pub procs: Option<u32>,
}

/// Terminal success payload.
#[derive(Debug, Clone)]
pub struct CompletedJob {
    pub result: Matrix,
    /// Self-reported compute time from the binary, when it printed one.
    pub compute_time_ms: Option<f64>,
    /// Wall clock around the successful process invocation.
    pub execution_time_ms: f64,
    /// From request arrival to completion.
    pub total_time_ms: f64,
}

/// Terminal failure payload.
#[derive(Debug, Clone)]
pub struct FailedJob {
    pub error_message: String,
    pub total_time_ms: f64,
}

/// Job record store.
///
/// Every transition is idempotent: calling it again for a job that already
/// reached (or passed) the target state returns `Ok(false)` and changes
/// nothing. `Ok(true)` means the call changed the stored status.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: &NewJob) -> Result<(), StoreError>;

    async fn mark_running(&self, id: &str) -> Result<bool, StoreError>;

    async fn mark_completed(&self, id: &str, completed: &CompletedJob) -> Result<bool, StoreError>;

    async fn mark_failed(&self, id: &str, failed: &FailedJob) -> Result<bool, StoreError>;

    /// Stored status of `id`; `None` when the job does not exist.
    async fn job_status(&self, id: &str) -> Result<Option<JobStatus>, StoreError>;
}

// ---------------------------------------------------------------------------
// Benchmark results
// ---------------------------------------------------------------------------

/// Which binary produced a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Serial,
    Mpi,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Serial => "serial",
            Self::Mpi => "mpi",
        }
    }
}

impl std::str::FromStr for RunMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "serial" => Ok(Self::Serial),
            "mpi" => Ok(Self::Mpi),
            other => Err(CoreError::Validation(format!("Invalid run mode: {other}"))),
        }
    }
}

/// Lifecycle of one benchmark combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Pending,
    Ok,
    Failed,
}

impl ResultStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ok => "ok",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::str::FromStr for ResultStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "ok" => Ok(Self::Ok),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::Validation(format!("Invalid result status: {other}"))),
        }
    }
}

/// One row of a benchmark batch, keyed by `(batch_id, n, mode, p)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkResult {
    pub batch_id: String,
    pub n: u32,
    pub mode: RunMode,
    /// Always 1 for [`RunMode::Serial`].
    pub p: u32,
    pub status: ResultStatus,
    pub time_ms: Option<f64>,
    /// Post-warm-up samples.
    pub samples: Vec<f64>,
    pub error_msg: Option<String>,
}

impl BenchmarkResult {
    pub fn pending(batch_id: &str, n: u32, mode: RunMode, p: u32) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            n,
            mode,
            p,
            status: ResultStatus::Pending,
            time_ms: None,
            samples: Vec::new(),
            error_msg: None,
        }
    }

    pub fn ok(self, time_ms: f64, samples: Vec<f64>) -> Self {
        Self {
            status: ResultStatus::Ok,
            time_ms: Some(time_ms),
            samples,
            error_msg: None,
            ..self
        }
    }

    pub fn failed(self, error_msg: String) -> Self {
        Self {
            status: ResultStatus::Failed,
            time_ms: None,
            samples: Vec::new(),
            error_msg: Some(error_msg),
            ..self
        }
    }

    /// Composite upsert key.
    pub fn key(&self) -> (String, u32, RunMode, u32) {
        (self.batch_id.clone(), self.n, self.mode, self.p)
    }
}

/// Destination for benchmark measurements. Writes for an existing key
/// overwrite it.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn upsert_result(&self, result: &BenchmarkResult) -> Result<(), StoreError>;
}
