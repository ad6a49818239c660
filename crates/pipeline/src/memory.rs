//! In-memory store implementations.
//!
//! Used by tests and by embedders that do not need persistence. They follow
//! the same idempotency rules as the SQL adapters.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use matmul_core::job::JobStatus;
use matmul_core::matrix::Matrix;
use matmul_core::store::{
    BenchmarkResult, CompletedJob, FailedJob, JobStore, NewJob, ResultSink, ResultStatus, RunMode,
    StoreError,
};
use matmul_core::types::Timestamp;

/// Snapshot of one job held by [`MemoryJobStore`].
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub status: JobStatus,
    /// Every status the job has been written with, in order.
    pub history: Vec<JobStatus>,
    pub result: Option<Matrix>,
    pub error_message: Option<String>,
    pub compute_time_ms: Option<f64>,
    pub execution_time_ms: Option<f64>,
    pub total_time_ms: Option<f64>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl JobRecord {
    fn queued() -> Self {
        Self {
            status: JobStatus::Queued,
            history: vec![JobStatus::Queued],
            result: None,
            error_message: None,
            compute_time_ms: None,
            execution_time_ms: None,
            total_time_ms: None,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    fn transition(&mut self, next: JobStatus) -> bool {
        if self.status == next || !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.history.push(next);
        true
    }
}

/// [`JobStore`] backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current record for `id`.
    pub fn get(&self, id: &str) -> Option<JobRecord> {
        self.lock().get(id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, JobRecord>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update<F>(&self, id: &str, apply: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut JobRecord) -> bool,
    {
        let mut jobs = self.lock();
        let record = jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(apply(record))
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, job: &NewJob) -> Result<(), StoreError> {
        match self.lock().entry(job.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(job.id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(JobRecord::queued());
                Ok(())
            }
        }
    }

    async fn job_status(&self, id: &str) -> Result<Option<JobStatus>, StoreError> {
        Ok(self.lock().get(id).map(|record| record.status))
    }

    async fn mark_running(&self, id: &str) -> Result<bool, StoreError> {
        self.update(id, |record| {
            let changed = record.transition(JobStatus::Running);
            if changed && record.started_at.is_none() {
                record.started_at = Some(chrono::Utc::now());
            }
            changed
        })
    }

    async fn mark_completed(&self, id: &str, completed: &CompletedJob) -> Result<bool, StoreError> {
        self.update(id, |record| {
            if !record.transition(JobStatus::Completed) {
                return false;
            }
            record.result = Some(completed.result.clone());
            record.compute_time_ms = completed.compute_time_ms;
            record.execution_time_ms = Some(completed.execution_time_ms);
            record.total_time_ms = Some(completed.total_time_ms);
            record.completed_at = Some(chrono::Utc::now());
            true
        })
    }

    async fn mark_failed(&self, id: &str, failed: &FailedJob) -> Result<bool, StoreError> {
        self.update(id, |record| {
            if !record.transition(JobStatus::Failed) {
                return false;
            }
            record.error_message = Some(failed.error_message.clone());
            record.total_time_ms = Some(failed.total_time_ms);
            record.completed_at = Some(chrono::Utc::now());
            true
        })
    }
}

/// [`ResultSink`] that keeps the latest row per key and a log of every
/// write.
#[derive(Debug, Default)]
pub struct MemoryResultSink {
    inner: Mutex<SinkState>,
}

#[derive(Debug, Default)]
struct SinkState {
    rows: HashMap<(String, u32, RunMode, u32), BenchmarkResult>,
    writes: Vec<BenchmarkResult>,
}

impl MemoryResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest row for a key.
    pub fn get(&self, batch_id: &str, n: u32, mode: RunMode, p: u32) -> Option<BenchmarkResult> {
        self.lock()
            .rows
            .get(&(batch_id.to_string(), n, mode, p))
            .cloned()
    }

    /// Current rows, sorted by `(n, mode, p)` with serial first.
    pub fn rows(&self) -> Vec<BenchmarkResult> {
        let mut rows: Vec<_> = self.lock().rows.values().cloned().collect();
        rows.sort_by_key(|r| (r.n, r.mode != RunMode::Serial, r.p));
        rows
    }

    /// Every write in order, including overwritten ones.
    pub fn writes(&self) -> Vec<BenchmarkResult> {
        self.lock().writes.clone()
    }

    /// Number of current rows with `status`.
    pub fn count(&self, status: ResultStatus) -> usize {
        self.lock()
            .rows
            .values()
            .filter(|r| r.status == status)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SinkState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ResultSink for MemoryResultSink {
    async fn upsert_result(&self, result: &BenchmarkResult) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.rows.insert(result.key(), result.clone());
        state.writes.push(result.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
