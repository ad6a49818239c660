//! Benchmark sweep engine.
//!
//! For each size `n` (ascending) the engine generates `A_n`, `B_n` from the
//! batch seed, times the serial binary, then times the parallel binary for
//! each process count `p` (ascending). Every combination is written as
//! `pending` first and then `ok` or `failed`; one combination failing never
//! stops the others.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use matmul_core::job::truncate_error_message;
use matmul_core::matrix_gen::{self, GeneratedFiles};
use matmul_core::metrics::{median_after_warmup, post_warmup};
use matmul_core::process::ProcessInvoker;
use matmul_core::store::{BenchmarkResult, ResultSink, ResultStatus, RunMode};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::config::ComputeConfig;
use crate::gate::ComputeGate;
use crate::invocation::Invocation;
use crate::runner::elapsed_ms;
use crate::workspace::remove_quietly;

/// One sweep to run.
#[derive(Debug, Clone)]
pub struct BatchSpec {
    pub batch_id: String,
    pub seed: u32,
    /// Timed repetitions per combination, warm-up included.
    pub repeats: u32,
    pub sizes: Vec<u32>,
    pub procs: Vec<u32>,
    pub oversubscribe: bool,
}

impl BatchSpec {
    pub fn combinations(&self) -> usize {
        self.sizes.len() * self.procs.len()
    }
}

/// Final tally of a batch, counting the serial rows too.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub ok: usize,
    pub failed: usize,
}

impl BatchSummary {
    fn record(&mut self, status: ResultStatus) {
        match status {
            ResultStatus::Ok => self.ok += 1,
            ResultStatus::Failed => self.failed += 1,
            ResultStatus::Pending => {}
        }
    }
}

/// A timed measurement: median after warm-up plus the post-warm-up samples.
#[derive(Debug, Clone, PartialEq)]
struct Measurement {
    time_ms: f64,
    samples: Vec<f64>,
}

/// Runs benchmark batches.
pub struct BenchmarkEngine<I> {
    config: Arc<ComputeConfig>,
    invoker: I,
    sink: Arc<dyn ResultSink>,
    gate: ComputeGate,
}

impl<I: ProcessInvoker + 'static> BenchmarkEngine<I> {
    pub fn new(
        config: Arc<ComputeConfig>,
        invoker: I,
        sink: Arc<dyn ResultSink>,
        gate: ComputeGate,
    ) -> Self {
        Self {
            config: Arc::new(config.with_absolute_binaries()),
            invoker,
            sink,
            gate,
        }
    }

    /// Run `spec` as its own task.
    pub fn spawn(self: &Arc<Self>, spec: BatchSpec) -> JoinHandle<BatchSummary> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.run_batch(&spec).await })
    }

    /// Run every combination of `spec` sequentially.
    pub async fn run_batch(&self, spec: &BatchSpec) -> BatchSummary {
        let started = Instant::now();
        tracing::info!(
            batch_id = %spec.batch_id,
            seed = spec.seed,
            repeats = spec.repeats,
            combinations = spec.combinations(),
            "Benchmark batch started",
        );

        let mut sizes = spec.sizes.clone();
        sizes.sort_unstable();
        sizes.dedup();
        let mut procs = spec.procs.clone();
        procs.sort_unstable();
        procs.dedup();

        let mut summary = BatchSummary::default();
        let dir = self.prepare_dir(&spec.batch_id).await;

        for n in sizes {
            let generated = match &dir {
                Ok(dir) => matrix_gen::generate_to_dir(spec.seed, n, dir)
                    .await
                    .map(|files| (dir, files))
                    .map_err(|e| format!("input generation failed: {e}")),
                Err(reason) => Err(reason.clone()),
            };
            let (work_dir, files) = match generated {
                Ok(generated) => generated,
                Err(reason) => {
                    tracing::warn!(batch_id = %spec.batch_id, n, error = %reason, "Input generation failed");
                    self.fail_size(spec, n, &procs, &reason, &mut summary).await;
                    continue;
                }
            };

            let status = self.run_serial(spec, n, &files, work_dir).await;
            summary.record(status);

            for &p in &procs {
                let status = self.run_mpi(spec, n, p, &files, work_dir).await;
                summary.record(status);
            }

            remove_quietly(&files.path_a).await;
            remove_quietly(&files.path_b).await;
        }

        if let Ok(dir) = &dir {
            let _ = tokio::fs::remove_dir_all(dir).await;
        }

        tracing::info!(
            batch_id = %spec.batch_id,
            ok = summary.ok,
            failed = summary.failed,
            elapsed_ms = elapsed_ms(started),
            "Benchmark batch finished",
        );
        summary
    }

    async fn run_serial(
        &self,
        spec: &BatchSpec,
        n: u32,
        files: &GeneratedFiles,
        dir: &Path,
    ) -> ResultStatus {
        let pending = BenchmarkResult::pending(&spec.batch_id, n, RunMode::Serial, 1);
        self.upsert(&pending).await;

        let output = dir.join(format!("C_ser_{n}.txt"));
        let invocation =
            Invocation::serial(&self.config.serial_bin, &files.path_a, &files.path_b, &output);
        let measured = self.measure(&invocation, dir, spec.repeats).await;
        remove_quietly(&output).await;

        let result = match measured {
            Ok(m) => {
                tracing::info!(batch_id = %spec.batch_id, n, time_ms = m.time_ms, "Serial measured");
                pending.ok(m.time_ms, m.samples)
            }
            Err(reason) => {
                tracing::warn!(batch_id = %spec.batch_id, n, error = %reason, "Serial run failed");
                pending.failed(truncate_error_message(&format!("serial n={n} failed: {reason}")))
            }
        };
        self.upsert(&result).await;
        result.status
    }

    async fn run_mpi(
        &self,
        spec: &BatchSpec,
        n: u32,
        p: u32,
        files: &GeneratedFiles,
        dir: &Path,
    ) -> ResultStatus {
        let pending = BenchmarkResult::pending(&spec.batch_id, n, RunMode::Mpi, p);
        self.upsert(&pending).await;

        let output = dir.join(format!("C_mpi_{n}_{p}.txt"));
        let invocation = Invocation::mpi(
            &self.config.mpirun,
            p,
            spec.oversubscribe,
            &self.config.mpi_bin,
            &files.path_a,
            &files.path_b,
            &output,
        );
        let measured = self.measure(&invocation, dir, spec.repeats).await;
        remove_quietly(&output).await;

        let result = match measured {
            Ok(m) => {
                tracing::info!(batch_id = %spec.batch_id, n, p, time_ms = m.time_ms, "MPI measured");
                pending.ok(m.time_ms, m.samples)
            }
            Err(reason) => {
                tracing::warn!(batch_id = %spec.batch_id, n, p, error = %reason, "MPI run failed");
                pending.failed(truncate_error_message(&format!(
                    "mpi n={n}, p={p} failed: {reason}"
                )))
            }
        };
        self.upsert(&result).await;
        result.status
    }

    /// Mark the serial row and every mpi row of `n` failed.
    async fn fail_size(
        &self,
        spec: &BatchSpec,
        n: u32,
        procs: &[u32],
        reason: &str,
        summary: &mut BatchSummary,
    ) {
        let serial = BenchmarkResult::pending(&spec.batch_id, n, RunMode::Serial, 1)
            .failed(truncate_error_message(&format!("serial n={n} failed: {reason}")));
        self.upsert(&serial).await;
        summary.record(serial.status);

        for &p in procs {
            let mpi = BenchmarkResult::pending(&spec.batch_id, n, RunMode::Mpi, p).failed(
                truncate_error_message(&format!("mpi n={n}, p={p} failed: {reason}")),
            );
            self.upsert(&mpi).await;
            summary.record(mpi.status);
        }
    }

    /// Run `repeats` timed repetitions, retrying a failed repetition once.
    /// Fails only when no repetition produced a timing.
    async fn measure(
        &self,
        invocation: &Invocation,
        dir: &Path,
        repeats: u32,
    ) -> Result<Measurement, String> {
        let mut samples = Vec::with_capacity(repeats as usize);
        let mut last_error = None;

        for rep in 0..repeats {
            let attempt = match self.run_once(invocation, dir).await {
                Ok(ms) => Ok(ms),
                Err(first) => {
                    tracing::debug!(rep, error = %first, "Repetition failed, retrying once");
                    self.run_once(invocation, dir).await
                }
            };
            match attempt {
                Ok(ms) => samples.push(ms),
                Err(e) => last_error = Some(e),
            }
        }

        match median_after_warmup(&samples) {
            Some(time_ms) => Ok(Measurement {
                time_ms,
                samples: post_warmup(&samples).to_vec(),
            }),
            None => Err(last_error.unwrap_or_else(|| "no repetitions were run".to_string())),
        }
    }

    /// One invocation; returns the wall clock in milliseconds.
    async fn run_once(&self, invocation: &Invocation, dir: &Path) -> Result<f64, String> {
        let _permit = self.gate.acquire().await;
        let started = Instant::now();
        let output = self
            .invoker
            .invoke(&invocation.program, invocation.input(dir, self.config.timeout))
            .await
            .map_err(|e| e.to_string())?;
        let elapsed = elapsed_ms(started);

        if output.success() {
            return Ok(elapsed);
        }
        let diagnostic = output.diagnostic();
        Err(if diagnostic.is_empty() {
            format!("Process exited with code {}", output.exit_code)
        } else {
            diagnostic.to_string()
        })
    }

    async fn prepare_dir(&self, batch_id: &str) -> Result<PathBuf, String> {
        let dir = self.config.bench_work_dir.join(batch_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| format!("cannot create {}: {e}", dir.display()))?;
        tokio::fs::canonicalize(&dir)
            .await
            .map_err(|e| format!("cannot resolve {}: {e}", dir.display()))
    }

    async fn upsert(&self, result: &BenchmarkResult) {
        if let Err(e) = self.sink.upsert_result(result).await {
            tracing::error!(
                batch_id = %result.batch_id,
                n = result.n,
                mode = result.mode.as_str(),
                p = result.p,
                error = %e,
                "Failed to write benchmark result",
            );
        }
    }
}
