//! End-to-end job runs against fake compute binaries.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::{Fixture, ScriptedInvoker, FAIL, FORWARD_MPIRUN, MULTIPLY};
use matmul_core::job::{JobPayload, JobStatus, MAX_ERROR_MESSAGE_CHARS};
use matmul_core::process::BinaryInvoker;
use matmul_core::store::{FailedJob, JobStore, NewJob, RunMode};
use matmul_pipeline::gate::ComputeGate;
use matmul_pipeline::memory::MemoryJobStore;
use matmul_pipeline::runner::{JobOutcome, JobRunner};

fn ones() -> matmul_core::matrix::Matrix {
    common::matrix(vec![vec![1.0, 1.0], vec![1.0, 1.0]])
}

fn twos() -> matmul_core::matrix::Matrix {
    common::matrix(vec![vec![2.0, 2.0], vec![2.0, 2.0]])
}

async fn queued(store: &MemoryJobStore, id: &str) -> JobPayload {
    store
        .create_job(&NewJob {
            id: id.to_string(),
            matrix_a: ones(),
            matrix_b: twos(),
            procs: None,
        })
        .await
        .expect("create job");
    JobPayload::new(ones(), twos(), None).expect("valid payload")
}

fn runner(fixture: &Fixture, store: &Arc<MemoryJobStore>) -> JobRunner<BinaryInvoker> {
    JobRunner::new(
        fixture.config(),
        BinaryInvoker,
        Arc::clone(store) as Arc<dyn JobStore>,
        ComputeGate::unlimited(),
    )
}

// ---------------------------------------------------------------------------
// Test: parallel success
// ---------------------------------------------------------------------------

#[tokio::test]
async fn parallel_run_completes_job() {
    let fixture = Fixture::healthy();
    let store = Arc::new(MemoryJobStore::new());
    let payload = queued(&store, "job-1").await;

    let outcome = runner(&fixture, &store).start("job-1", payload).await;

    assert_matches!(
        outcome,
        JobOutcome::Completed { binary: RunMode::Mpi, compute_time_ms: Some(ms), .. } if ms == 1.25
    );
    let record = store.get("job-1").expect("record");
    assert_eq!(record.result, Some(common::matrix(vec![vec![4.0, 4.0], vec![4.0, 4.0]])));
    assert_eq!(
        record.history,
        vec![JobStatus::Queued, JobStatus::Running, JobStatus::Completed]
    );
    assert!(record.started_at.is_some());
    assert!(record.completed_at.is_some());
    assert!(record.execution_time_ms.expect("execution time") >= 0.0);
    assert!(record.total_time_ms.expect("total time") >= record.execution_time_ms.unwrap());
    assert_eq!(fixture.calls(), vec!["mpirun", "mpi"]);
    assert!(!fixture.config.job_work_dir.join("job-1").exists());
}

// ---------------------------------------------------------------------------
// Test: serial fallback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_parallel_run_falls_back_to_serial_once() {
    let fixture = Fixture::new(FAIL, MULTIPLY, MULTIPLY);
    let store = Arc::new(MemoryJobStore::new());
    let payload = queued(&store, "job-2").await;

    let outcome = runner(&fixture, &store).start("job-2", payload).await;

    assert_matches!(outcome, JobOutcome::Completed { binary: RunMode::Serial, .. });
    assert_eq!(fixture.calls(), vec!["mpirun", "serial"]);
    let record = store.get("job-2").expect("record");
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.result, Some(common::matrix(vec![vec![4.0, 4.0], vec![4.0, 4.0]])));
}

#[tokio::test]
async fn missing_launcher_falls_back_to_serial() {
    let mut fixture = Fixture::healthy();
    fixture.config.mpirun = "/nonexistent/mpirun".to_string();
    let store = Arc::new(MemoryJobStore::new());
    let payload = queued(&store, "job-3").await;

    let outcome = runner(&fixture, &store).start("job-3", payload).await;

    assert_matches!(outcome, JobOutcome::Completed { binary: RunMode::Serial, .. });
    assert_eq!(fixture.calls(), vec!["serial"]);
}

#[tokio::test]
async fn parallel_timeout_falls_back_to_serial() {
    let mut fixture = Fixture::new("exec sleep 5", MULTIPLY, MULTIPLY);
    fixture.config.timeout = Some(Duration::from_millis(300));
    let store = Arc::new(MemoryJobStore::new());
    let payload = queued(&store, "job-4").await;

    let outcome = runner(&fixture, &store).start("job-4", payload).await;

    assert_matches!(outcome, JobOutcome::Completed { binary: RunMode::Serial, .. });
}

#[tokio::test]
async fn scripted_invoker_sees_exactly_one_serial_call() {
    let fixture = Fixture::healthy();
    let mpirun = fixture.config.mpirun.clone();
    let serial = fixture.config.serial_bin.to_string_lossy().into_owned();
    let invoker = ScriptedInvoker::new(&[&mpirun], "2 2\n4 4\n4 4\n");
    let store = Arc::new(MemoryJobStore::new());
    let payload = queued(&store, "job-5").await;

    let runner = JobRunner::new(
        fixture.config(),
        invoker.clone(),
        Arc::clone(&store) as Arc<dyn JobStore>,
        ComputeGate::new(1),
    );
    let outcome = runner.start("job-5", payload).await;

    assert_matches!(
        outcome,
        JobOutcome::Completed { binary: RunMode::Serial, compute_time_ms: Some(ms), .. } if ms == 2.5
    );
    assert_eq!(invoker.calls(), vec![mpirun, serial]);
}

// ---------------------------------------------------------------------------
// Test: failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn both_binaries_failing_marks_job_failed() {
    let fixture = Fixture::new(FAIL, MULTIPLY, FAIL);
    let store = Arc::new(MemoryJobStore::new());
    let payload = queued(&store, "job-6").await;

    let outcome = runner(&fixture, &store).start("job-6", payload).await;

    assert_matches!(
        &outcome,
        JobOutcome::Failed { code: "PROCESS_NONZERO_EXIT", message, .. } if message.contains("boom")
    );
    let record = store.get("job-6").expect("record");
    assert_eq!(
        record.history,
        vec![JobStatus::Queued, JobStatus::Running, JobStatus::Failed]
    );
    assert!(record.result.is_none());
    assert!(record.error_message.expect("message").starts_with("PROCESS_NONZERO_EXIT"));
    assert!(!fixture.config.job_work_dir.join("job-6").exists());
}

#[tokio::test]
async fn missing_binaries_report_spawn_error() {
    let mut fixture = Fixture::healthy();
    fixture.config.mpirun = "/nonexistent/mpirun".to_string();
    fixture.config.serial_bin = "/nonexistent/serial".into();
    let store = Arc::new(MemoryJobStore::new());
    let payload = queued(&store, "job-7").await;

    let outcome = runner(&fixture, &store).start("job-7", payload).await;

    assert_matches!(outcome, JobOutcome::Failed { code: "PROCESS_SPAWN_ERROR", .. });
    assert_eq!(store.get("job-7").expect("record").status, JobStatus::Failed);
}

#[tokio::test]
async fn unparseable_output_fails_without_fallback() {
    let garbage = r#"printf '2 2\n4 x\n4 4\n' > "$3""#;
    let fixture = Fixture::new(FORWARD_MPIRUN, garbage, MULTIPLY);
    let store = Arc::new(MemoryJobStore::new());
    let payload = queued(&store, "job-8").await;

    let outcome = runner(&fixture, &store).start("job-8", payload).await;

    assert_matches!(outcome, JobOutcome::Failed { code: "OUTPUT_PARSE_ERROR", .. });
    assert_eq!(fixture.calls(), vec!["mpirun", "mpi"]);
}

#[tokio::test]
async fn wrong_result_shape_is_a_parse_error() {
    let wrong = r#"printf '1 1\n4\n' > "$3""#;
    let fixture = Fixture::new(FORWARD_MPIRUN, wrong, MULTIPLY);
    let store = Arc::new(MemoryJobStore::new());
    let payload = queued(&store, "job-9").await;

    let outcome = runner(&fixture, &store).start("job-9", payload).await;

    assert_matches!(outcome, JobOutcome::Failed { code: "OUTPUT_PARSE_ERROR", .. });
}

#[tokio::test]
async fn missing_output_is_a_read_error() {
    let fixture = Fixture::new(FORWARD_MPIRUN, "exit 0", MULTIPLY);
    let store = Arc::new(MemoryJobStore::new());
    let payload = queued(&store, "job-10").await;

    let outcome = runner(&fixture, &store).start("job-10", payload).await;

    assert_matches!(outcome, JobOutcome::Failed { code: "OUTPUT_READ_ERROR", .. });
}

#[tokio::test]
async fn long_error_message_is_truncated() {
    let noisy = "head -c 5000 /dev/zero | tr '\\0' 'x' >&2\nexit 3";
    let fixture = Fixture::new(FAIL, MULTIPLY, noisy);
    let store = Arc::new(MemoryJobStore::new());
    let payload = queued(&store, "job-11").await;

    let outcome = runner(&fixture, &store).start("job-11", payload).await;

    let JobOutcome::Failed { message, .. } = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert_eq!(message.chars().count(), MAX_ERROR_MESSAGE_CHARS);
    let stored = store.get("job-11").expect("record").error_message.expect("message");
    assert_eq!(stored, message);
}

#[tokio::test]
async fn unwritable_work_dir_is_an_input_error() {
    let mut fixture = Fixture::healthy();
    let blocker = fixture.state_path("not-a-dir");
    std::fs::write(&blocker, "file").expect("write blocker");
    fixture.config.job_work_dir = blocker;
    let store = Arc::new(MemoryJobStore::new());
    let payload = queued(&store, "job-12").await;

    let outcome = runner(&fixture, &store).start("job-12", payload).await;

    assert_matches!(outcome, JobOutcome::Failed { code: "INPUT_WRITE_ERROR", .. });
    assert!(fixture.calls().is_empty());
}

// ---------------------------------------------------------------------------
// Test: idempotency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn restarting_finished_job_keeps_first_result() {
    let fixture = Fixture::healthy();
    let store = Arc::new(MemoryJobStore::new());
    let payload = queued(&store, "job-13").await;
    let runner = runner(&fixture, &store);

    runner.start("job-13", payload.clone()).await;
    let first = store.get("job-13").expect("record");
    let calls = fixture.calls();

    let again = runner.start("job-13", payload).await;
    let second = store.get("job-13").expect("record");

    assert_eq!(again, JobOutcome::Unchanged { recorded: JobStatus::Completed });
    assert_eq!(fixture.calls(), calls, "no binary runs twice");
    assert_eq!(second.history, first.history);
    assert_eq!(second.completed_at, first.completed_at);
    assert_eq!(second.result, first.result);
}

#[tokio::test]
async fn restarting_failed_job_reports_stored_failure() {
    let broken = Fixture::new(FAIL, MULTIPLY, FAIL);
    let store = Arc::new(MemoryJobStore::new());
    let payload = queued(&store, "job-14").await;
    runner(&broken, &store).start("job-14", payload.clone()).await;

    let healthy = Fixture::healthy();
    let outcome = runner(&healthy, &store).start("job-14", payload).await;

    assert_eq!(outcome, JobOutcome::Unchanged { recorded: JobStatus::Failed });
    assert!(healthy.calls().is_empty());
    assert_eq!(store.get("job-14").expect("record").status, JobStatus::Failed);
    assert!(!healthy.config.job_work_dir.join("job-14").exists());
}

#[tokio::test]
async fn result_discarded_when_job_finished_elsewhere() {
    let store = Arc::new(MemoryJobStore::new());
    let payload = queued(&store, "job-15").await;
    store.mark_running("job-15").await.expect("running");

    // The job is failed by another writer while the parallel run is in flight.
    let slow = Fixture::new(&format!("sleep 0.3\n{FORWARD_MPIRUN}"), MULTIPLY, MULTIPLY);
    let racing = runner(&slow, &store);
    let run = tokio::spawn(async move { racing.start("job-15", payload).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    let failed = FailedJob {
        error_message: "cancelled by operator".to_string(),
        total_time_ms: 1.0,
    };
    assert!(store.mark_failed("job-15", &failed).await.expect("fail"));

    let outcome = run.await.expect("join");
    assert_eq!(outcome, JobOutcome::Unchanged { recorded: JobStatus::Failed });
    let record = store.get("job-15").expect("record");
    assert!(record.result.is_none());
    assert_eq!(record.error_message.as_deref(), Some("cancelled by operator"));
}

// ---------------------------------------------------------------------------
// Test: relative binary paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn relative_binary_paths_resolve_outside_job_dir() {
    let mut fixture = Fixture::healthy();
    let _local = fixture.use_relative_binaries();
    assert!(fixture.config.mpi_bin.is_relative());
    let store = Arc::new(MemoryJobStore::new());
    let payload = queued(&store, "job-16").await;

    let outcome = runner(&fixture, &store).start("job-16", payload).await;

    assert_matches!(outcome, JobOutcome::Completed { binary: RunMode::Mpi, .. });
    assert_eq!(fixture.calls(), vec!["mpirun", "mpi"]);
}

#[tokio::test]
async fn relative_serial_binary_used_for_fallback() {
    let mut fixture = Fixture::new(FORWARD_MPIRUN, FAIL, MULTIPLY);
    let _local = fixture.use_relative_binaries();
    let store = Arc::new(MemoryJobStore::new());
    let payload = queued(&store, "job-17").await;

    let outcome = runner(&fixture, &store).start("job-17", payload).await;

    assert_matches!(outcome, JobOutcome::Completed { binary: RunMode::Serial, .. });
    assert_eq!(fixture.calls(), vec!["mpirun", "mpi", "serial"]);
    assert_eq!(
        store.get("job-17").expect("record").result,
        Some(common::matrix(vec![vec![4.0, 4.0], vec![4.0, 4.0]]))
    );
}

#[tokio::test]
async fn unknown_job_reports_store_error() {
    let fixture = Fixture::healthy();
    let store = Arc::new(MemoryJobStore::new());
    let payload = JobPayload::new(ones(), twos(), None).expect("valid payload");

    let outcome = runner(&fixture, &store).start("ghost", payload).await;

    assert_matches!(outcome, JobOutcome::Failed { code: "STORE_ERROR", .. });
    assert!(fixture.calls().is_empty());
}
