//! Job orchestrator: drives one job from `running` to a terminal state.
//!
//! ```text
//! mark running -> write A, B -> mpirun ... -> read C -> mark completed
//!                                 |  fails
//!                                 v
//!                             serial once -> read C -> mark completed
//!                                 |  fails
//!                                 v
//!                             mark failed
//! ```
//!
//! Every failure is collapsed into a FAILED job with a bounded message; no
//! error escapes [`JobRunner::start`]. The per-job directory is removed on
//! every path. A job that is already terminal is reported as stored and
//! nothing runs.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use matmul_core::codec::{self, CodecError, NumberFormat};
use matmul_core::job::{parse_compute_ms, truncate_error_message, JobPayload, JobStatus};
use matmul_core::matrix::Matrix;
use matmul_core::process::{ProcessInvoker, ProcessOutput};
use matmul_core::store::{CompletedJob, FailedJob, JobStore, RunMode};
use serde::Serialize;

use crate::config::ComputeConfig;
use crate::error::PipelineError;
use crate::gate::ComputeGate;
use crate::invocation::Invocation;
use crate::workspace::{self, JobWorkspace};

/// Failure code of jobs still queued when the dispatcher stops.
pub const ABANDONED: &str = "ABANDONED";

/// Terminal result of [`JobRunner::start`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed {
        /// Which binary produced the result.
        binary: RunMode,
        compute_time_ms: Option<f64>,
        execution_time_ms: f64,
        total_time_ms: f64,
    },
    Failed {
        code: &'static str,
        message: String,
        total_time_ms: f64,
    },
    /// The job was already terminal; the stored state was left as is.
    Unchanged { recorded: JobStatus },
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Successful run before it is recorded.
struct RunSuccess {
    result: Matrix,
    binary: RunMode,
    compute_time_ms: Option<f64>,
    execution_time_ms: f64,
}

/// Runs compute jobs with a given invoker and store.
pub struct JobRunner<I> {
    config: Arc<ComputeConfig>,
    invoker: I,
    store: Arc<dyn JobStore>,
    gate: ComputeGate,
}

impl<I: ProcessInvoker> JobRunner<I> {
    pub fn new(
        config: Arc<ComputeConfig>,
        invoker: I,
        store: Arc<dyn JobStore>,
        gate: ComputeGate,
    ) -> Self {
        Self {
            config: Arc::new(config.with_absolute_binaries()),
            invoker,
            store,
            gate,
        }
    }

    pub fn config(&self) -> &ComputeConfig {
        &self.config
    }

    /// Run the job to completion and record its terminal state.
    ///
    /// Safe to call more than once for the same job: the store ignores
    /// transitions out of a terminal state.
    pub async fn start(&self, job_id: &str, payload: JobPayload) -> JobOutcome {
        tracing::info!(
            job_id,
            procs = payload.procs.unwrap_or(self.config.default_procs),
            "Job started",
        );

        let run = match self.claim(job_id).await {
            Ok(Some(recorded)) => {
                tracing::info!(job_id, status = recorded.as_str(), "Job already finished, not rerun");
                return JobOutcome::Unchanged { recorded };
            }
            Ok(None) => self.execute(job_id, &payload).await,
            Err(err) => Err(err),
        };
        let total_time_ms = elapsed_ms(payload.submitted_at);

        let success = match run {
            Ok(success) => success,
            Err(err) => {
                tracing::warn!(job_id, code = err.code(), error = %err, "Job failed");
                return self
                    .record_failure(job_id, err.code(), &err.to_message(), total_time_ms)
                    .await;
            }
        };

        let completed = CompletedJob {
            result: success.result,
            compute_time_ms: success.compute_time_ms,
            execution_time_ms: success.execution_time_ms,
            total_time_ms,
        };
        match self.store.mark_completed(job_id, &completed).await {
            Ok(true) => {}
            Ok(false) => return self.stored_outcome(job_id).await,
            Err(e) => {
                tracing::error!(job_id, error = %e, "Failed to record job result");
                let message = format!("STORE_ERROR: could not record result: {e}");
                return self
                    .record_failure(job_id, "STORE_ERROR", &message, total_time_ms)
                    .await;
            }
        }

        tracing::info!(
            job_id,
            binary = success.binary.as_str(),
            compute_time_ms = ?success.compute_time_ms,
            execution_time_ms = success.execution_time_ms,
            total_time_ms,
            "Job completed",
        );
        JobOutcome::Completed {
            binary: success.binary,
            compute_time_ms: success.compute_time_ms,
            execution_time_ms: success.execution_time_ms,
            total_time_ms,
        }
    }

    /// Fail a job that was queued but never started.
    pub async fn abandon(&self, job_id: &str, submitted_at: Instant) -> JobOutcome {
        tracing::warn!(job_id, "Job abandoned before it started");
        self.record_failure(
            job_id,
            ABANDONED,
            "ABANDONED: the dispatcher stopped before the job ran",
            elapsed_ms(submitted_at),
        )
        .await
    }

    async fn record_failure(
        &self,
        job_id: &str,
        code: &'static str,
        message: &str,
        total_time_ms: f64,
    ) -> JobOutcome {
        let message = truncate_error_message(message);
        let failed = FailedJob {
            error_message: message.clone(),
            total_time_ms,
        };
        match self.store.mark_failed(job_id, &failed).await {
            Ok(false) => return self.stored_outcome(job_id).await,
            Ok(true) => {}
            Err(e) => tracing::error!(job_id, error = %e, "Failed to record job failure"),
        }
        JobOutcome::Failed {
            code,
            message,
            total_time_ms,
        }
    }

    /// Move the job to running. Returns the stored status instead when the
    /// job is already terminal.
    async fn claim(&self, job_id: &str) -> Result<Option<JobStatus>, PipelineError> {
        if self.store.mark_running(job_id).await? {
            return Ok(None);
        }
        let status = self.store.job_status(job_id).await?;
        Ok(status.filter(|s| s.is_terminal()))
    }

    /// Outcome for a job whose terminal write was a no-op.
    async fn stored_outcome(&self, job_id: &str) -> JobOutcome {
        let recorded = match self.store.job_status(job_id).await {
            Ok(Some(status)) => status,
            Ok(None) => JobStatus::Failed,
            Err(e) => {
                tracing::error!(job_id, error = %e, "Failed to read job status");
                JobStatus::Failed
            }
        };
        tracing::warn!(job_id, status = recorded.as_str(), "Job finished elsewhere, result discarded");
        JobOutcome::Unchanged { recorded }
    }

    async fn execute(&self, job_id: &str, payload: &JobPayload) -> Result<RunSuccess, PipelineError> {
        let workspace = JobWorkspace::create(&self.config.job_work_dir, job_id)
            .await
            .map_err(|e| {
                PipelineError::InputWrite(format!(
                    "{}: {e}",
                    self.config.job_work_dir.join(job_id).display()
                ))
            })?;

        let result = self.run_in(job_id, &workspace, payload).await;
        workspace.cleanup().await;
        result
    }

    async fn run_in(
        &self,
        job_id: &str,
        ws: &JobWorkspace,
        payload: &JobPayload,
    ) -> Result<RunSuccess, PipelineError> {
        for (path, matrix) in [(&ws.input_a, &payload.matrix_a), (&ws.input_b, &payload.matrix_b)] {
            codec::write_matrix_file(path, matrix, NumberFormat::Compact)
                .await
                .map_err(|e| PipelineError::InputWrite(e.to_string()))?;
        }

        let procs = payload.procs.unwrap_or(self.config.default_procs);
        let parallel = Invocation::mpi(
            &self.config.mpirun,
            procs,
            self.config.oversubscribe,
            &self.config.mpi_bin,
            &ws.input_a,
            &ws.input_b,
            &ws.output,
        );

        let (binary, output, execution_time_ms) = match self.run(&parallel, &ws.dir).await {
            Ok((output, ms)) => (RunMode::Mpi, output, ms),
            Err(err) if err.is_process_failure() => {
                tracing::warn!(
                    job_id,
                    code = err.code(),
                    error = %err,
                    "Parallel run failed, falling back to serial",
                );
                workspace::remove_quietly(&ws.output).await;
                let serial =
                    Invocation::serial(&self.config.serial_bin, &ws.input_a, &ws.input_b, &ws.output);
                let (output, ms) = self.run(&serial, &ws.dir).await?;
                (RunMode::Serial, output, ms)
            }
            Err(err) => return Err(err),
        };

        let result = codec::read_matrix_file(&ws.output)
            .await
            .map_err(PipelineError::from_output)?;
        check_result_shape(&ws.output, &result, payload)?;

        Ok(RunSuccess {
            result,
            binary,
            compute_time_ms: parse_compute_ms(&output.stdout),
            execution_time_ms,
        })
    }

    /// Invoke once under the compute gate. Returns the output and the wall
    /// clock around the invocation.
    async fn run(
        &self,
        invocation: &Invocation,
        dir: &Path,
    ) -> Result<(ProcessOutput, f64), PipelineError> {
        let _permit = self.gate.acquire().await;
        tracing::debug!(command = %invocation.display(), "Invoking compute binary");

        let started = Instant::now();
        let output = self
            .invoker
            .invoke(&invocation.program, invocation.input(dir, self.config.timeout))
            .await
            .map_err(|e| PipelineError::from_process(&invocation.program, e))?;
        let elapsed = elapsed_ms(started);

        if !output.success() {
            let diagnostic = output.diagnostic();
            let message = if diagnostic.is_empty() {
                format!("Process exited with code {}", output.exit_code)
            } else {
                diagnostic.to_string()
            };
            return Err(PipelineError::NonZeroExit {
                program: invocation.program.clone(),
                exit_code: output.exit_code,
                message,
            });
        }
        Ok((output, elapsed))
    }
}

fn check_result_shape(path: &Path, result: &Matrix, payload: &JobPayload) -> Result<(), PipelineError> {
    let (rows, _, cols) = payload.dimensions();
    let source = if result.rows() != rows {
        CodecError::RowCount {
            expected: rows,
            found: result.rows(),
        }
    } else if result.cols() != cols {
        CodecError::ColumnCount {
            row: 1,
            expected: cols,
            found: result.cols(),
        }
    } else {
        return Ok(());
    };
    Err(PipelineError::OutputParse {
        path: path.display().to_string(),
        source,
    })
}

pub(crate) fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
