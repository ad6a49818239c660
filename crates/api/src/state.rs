use std::sync::Arc;

use matmul_core::process::BinaryInvoker;
use matmul_core::store::{JobStore, ResultSink};
use matmul_db::store::{ResultStorage, SqlJobStore, SqlResultSink};
use matmul_pipeline::benchmark::BenchmarkEngine;
use matmul_pipeline::config::ComputeConfig;
use matmul_pipeline::dispatcher::JobDispatcher;
use matmul_pipeline::gate::ComputeGate;
use matmul_pipeline::runner::JobRunner;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: matmul_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Compute binaries and working directories.
    pub compute: Arc<ComputeConfig>,
    /// Placement of completed results (inline or file).
    pub results: ResultStorage,
    /// Submission side of the job queue.
    pub dispatcher: JobDispatcher,
    /// Benchmark sweep runner.
    pub benchmarks: Arc<BenchmarkEngine<BinaryInvoker>>,
}

impl AppState {
    /// Wire the SQL stores into a job runner and benchmark engine sharing
    /// one compute gate, and start the dispatcher loop.
    ///
    /// Returns the state and the dispatcher loop handle, which finishes
    /// once `cancel` fires.
    pub fn start(
        pool: matmul_db::DbPool,
        config: ServerConfig,
        compute: ComputeConfig,
        results: ResultStorage,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let compute = Arc::new(compute);
        let gate = ComputeGate::new(compute.concurrency);

        let job_store: Arc<dyn JobStore> =
            Arc::new(SqlJobStore::new(pool.clone(), results.clone()));
        let runner = Arc::new(JobRunner::new(
            Arc::clone(&compute),
            BinaryInvoker,
            job_store,
            gate.clone(),
        ));
        let (dispatcher, dispatcher_handle) =
            JobDispatcher::start(runner, config.queue_capacity, cancel);

        let sink: Arc<dyn ResultSink> = Arc::new(SqlResultSink::new(pool.clone()));
        let benchmarks = Arc::new(BenchmarkEngine::new(
            Arc::clone(&compute),
            BinaryInvoker,
            sink,
            gate,
        ));

        let state = Self {
            pool,
            config: Arc::new(config),
            compute,
            results,
            dispatcher,
            benchmarks,
        };
        (state, dispatcher_handle)
    }
}
