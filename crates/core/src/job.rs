//! Compute job lifecycle: statuses, transition rules, payload and the
//! helpers the pipeline uses to report outcomes.
//!
//! ```text
//! queued -> running -> completed
//!                   \-> failed
//! ```
//!
//! Transitions only move forward. Re-applying a transition that has already
//! happened is a no-op, never an error.

use std::sync::LazyLock;
use std::time::Instant;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::matrix::{validate_product_shapes, Matrix};

/// Worker-process count used when a submission does not specify one.
pub const DEFAULT_PROCS: u32 = 4;

/// Upper bound on a per-job worker-process override.
pub const MAX_PROCS: u32 = 256;

/// Maximum stored length (in characters) of a failure message.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 2000;

static COMPUTE_MS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)COMPUTE_MS\s*=\s*([0-9]+(?:\.[0-9]+)?)").expect("valid regex")
});

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Persisted job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Queued,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    /// Database / wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether moving from `self` to `next` changes the stored status.
    ///
    /// `running -> running` is allowed (idempotent re-entry); nothing leaves a
    /// terminal state.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match (self, next) {
            (Self::Queued, Self::Running) => true,
            (Self::Running, Self::Running) => true,
            (Self::Queued | Self::Running, Self::Completed | Self::Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Invalid job status: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Everything the orchestrator needs to run one job.
#[derive(Debug, Clone)]
pub struct JobPayload {
    pub matrix_a: Matrix,
    pub matrix_b: Matrix,
    /// Worker-process override; the configured default when `None`.
    pub procs: Option<u32>,
    /// When the originating request arrived, for end-to-end timing.
    pub submitted_at: Instant,
}

impl JobPayload {
    /// Validate shapes and the process override, stamping `submitted_at`
    /// with the current instant.
    pub fn new(matrix_a: Matrix, matrix_b: Matrix, procs: Option<u32>) -> Result<Self, CoreError> {
        validate_product_shapes(&matrix_a, &matrix_b)?;
        if let Some(p) = procs {
            validate_procs(p)?;
        }
        Ok(Self {
            matrix_a,
            matrix_b,
            procs,
            submitted_at: Instant::now(),
        })
    }

    /// `(rows_A, cols_A, cols_B)`.
    pub fn dimensions(&self) -> (usize, usize, usize) {
        (
            self.matrix_a.rows(),
            self.matrix_a.cols(),
            self.matrix_b.cols(),
        )
    }
}

/// Validate a worker-process count.
pub fn validate_procs(procs: u32) -> Result<(), CoreError> {
    if procs == 0 || procs > MAX_PROCS {
        return Err(CoreError::Validation(format!(
            "Process count must be between 1 and {MAX_PROCS}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

/// Extract a self-reported `COMPUTE_MS=<number>` figure from process output.
pub fn parse_compute_ms(stdout: &str) -> Option<f64> {
    COMPUTE_MS_RE
        .captures(stdout)
        .and_then(|caps| caps[1].parse().ok())
}

/// Truncate `message` to [`MAX_ERROR_MESSAGE_CHARS`] characters.
pub fn truncate_error_message(message: &str) -> String {
    match message.char_indices().nth(MAX_ERROR_MESSAGE_CHARS) {
        Some((byte_idx, _)) => message[..byte_idx].to_string(),
        None => message.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
