//! Job dispatcher.
//!
//! Submitters enqueue a ticket and get a [`JobHandle`] back immediately. A
//! single long-lived loop receives tickets and spawns one task per job, so
//! jobs run concurrently and the submitter never waits on an external
//! process.
//!
//! On shutdown the loop stops receiving, fails every ticket still queued and
//! then waits for the jobs it spawned to reach a terminal state.

use std::sync::Arc;

use matmul_core::error::CoreError;
use matmul_core::job::JobPayload;
use matmul_core::process::ProcessInvoker;
use matmul_core::types::JobId;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::runner::{JobOutcome, JobRunner};

/// Default capacity of the submission queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

struct Ticket {
    job_id: JobId,
    payload: JobPayload,
    done: oneshot::Sender<JobOutcome>,
}

/// Completion signal for one submitted job.
#[derive(Debug)]
pub struct JobHandle {
    job_id: JobId,
    done: oneshot::Receiver<JobOutcome>,
}

impl JobHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Wait for the job to reach a terminal state. `None` if the dispatcher
    /// shut down before the job ran.
    pub async fn wait(self) -> Option<JobOutcome> {
        self.done.await.ok()
    }
}

/// Cheaply cloneable submission side of the dispatcher.
#[derive(Clone)]
pub struct JobDispatcher {
    tx: mpsc::Sender<Ticket>,
}

impl JobDispatcher {
    /// Start the dispatcher loop on the current runtime.
    ///
    /// The loop stops when `cancel` fires or every [`JobDispatcher`] clone
    /// is dropped. The returned handle finishes once queued tickets are
    /// failed and every spawned job has finished.
    pub fn start<I>(
        runner: Arc<JobRunner<I>>,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>)
    where
        I: ProcessInvoker + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_loop(runner, rx, cancel));
        (Self { tx }, handle)
    }

    /// Enqueue a job. Returns without waiting for it to run.
    pub fn submit(&self, job_id: JobId, payload: JobPayload) -> Result<JobHandle, CoreError> {
        let (done_tx, done_rx) = oneshot::channel();
        let ticket = Ticket {
            job_id: job_id.clone(),
            payload,
            done: done_tx,
        };
        self.tx.try_send(ticket).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                CoreError::Conflict("Job queue is full, try again later".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                CoreError::Internal("Job dispatcher is not running".to_string())
            }
        })?;
        tracing::debug!(job_id = %job_id, "Job enqueued");
        Ok(JobHandle {
            job_id,
            done: done_rx,
        })
    }
}

async fn run_loop<I>(
    runner: Arc<JobRunner<I>>,
    mut rx: mpsc::Receiver<Ticket>,
    cancel: CancellationToken,
) where
    I: ProcessInvoker + 'static,
{
    tracing::info!("Job dispatcher started");
    let jobs = TaskTracker::new();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Job dispatcher shutting down");
                break;
            }
            ticket = rx.recv() => {
                let Some(ticket) = ticket else {
                    tracing::info!("Job queue closed, dispatcher exiting");
                    break;
                };
                let runner = Arc::clone(&runner);
                jobs.spawn(async move {
                    let outcome = runner.start(&ticket.job_id, ticket.payload).await;
                    // The submitter may have dropped its handle.
                    let _ = ticket.done.send(outcome);
                });
            }
        }
    }

    rx.close();
    let mut abandoned = 0usize;
    while let Ok(ticket) = rx.try_recv() {
        let outcome = runner
            .abandon(&ticket.job_id, ticket.payload.submitted_at)
            .await;
        let _ = ticket.done.send(outcome);
        abandoned += 1;
    }
    if abandoned > 0 {
        tracing::warn!(abandoned, "Queued jobs failed at shutdown");
    }

    jobs.close();
    tracing::info!(in_flight = jobs.len(), "Waiting for running jobs");
    jobs.wait().await;
    tracing::info!("Job dispatcher stopped");
}
