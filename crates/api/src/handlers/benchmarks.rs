//! Handlers for the `/benchmarks` resource.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use matmul_core::error::CoreError;
use matmul_core::hardware::HardwareProfile;
use matmul_core::job::MAX_PROCS;
use matmul_core::metrics::ScalingMetrics;
use matmul_core::store::{ResultStatus, RunMode};
use matmul_core::sweep::{
    parse_list_or_range, validate_combination_limit, validate_repeats, DEFAULT_REPEATS,
};
use matmul_db::models::benchmark::{BenchmarkBatch, BenchmarkResultRow, CreateBatch};
use matmul_db::repositories::BenchmarkRepo;
use matmul_pipeline::benchmark::BatchSpec;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Largest matrix size accepted in a sweep.
pub const MAX_SIZE: u32 = 8192;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Body of `POST /api/v1/benchmarks`.
#[derive(Debug, Deserialize)]
pub struct SubmitBenchmark {
    /// Size expression, e.g. `"128,256"` or `"128-1024:128"`.
    pub sizes: String,
    /// Process-count expression in the same syntax.
    pub procs: String,
    pub repeats: Option<u32>,
    /// Generator seed; random when absent.
    pub seed: Option<u32>,
    /// Defaults to the server's `OVERSUBSCRIBE` setting.
    pub oversubscribe: Option<bool>,
}

/// Body of a 202 benchmark response.
#[derive(Debug, Serialize)]
pub struct BenchmarkAccepted {
    pub batch_id: String,
    pub combinations: usize,
    pub seed: u32,
    pub repeats: u32,
    pub sizes: Vec<u32>,
    pub procs: Vec<u32>,
}

/// One result row with derived scaling figures (null for serial rows and
/// when no serial reference exists).
#[derive(Debug, Serialize)]
pub struct ResultView {
    #[serde(flatten)]
    pub row: BenchmarkResultRow,
    #[serde(flatten)]
    pub scaling: ScalingMetrics,
}

/// Row counts by status against the number of rows the batch will write.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub expected: usize,
    pub pending: usize,
    pub ok: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize)]
pub struct BenchmarkReport {
    pub batch: BenchmarkBatch,
    pub progress: Progress,
    pub results: Vec<ResultView>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn field_error(field: &str, err: CoreError) -> CoreError {
    match err {
        CoreError::Validation(msg) => CoreError::Validation(format!("{field}: {msg}")),
        other => other,
    }
}

/// Attach scaling metrics to each mpi row, using the `ok` serial row of the
/// same size as the reference.
fn with_scaling(rows: Vec<BenchmarkResultRow>) -> Vec<ResultView> {
    let serial: HashMap<i64, f64> = rows
        .iter()
        .filter(|r| r.mode == RunMode::Serial.as_str() && r.status == ResultStatus::Ok.as_str())
        .filter_map(|r| r.time_ms.map(|t| (r.n, t)))
        .collect();

    rows.into_iter()
        .map(|row| {
            let scaling = match row.time_ms {
                Some(tp)
                    if row.mode == RunMode::Mpi.as_str()
                        && row.status == ResultStatus::Ok.as_str() =>
                {
                    let procs = u32::try_from(row.p).unwrap_or(0);
                    ScalingMetrics::derive(serial.get(&row.n).copied(), tp, procs)
                }
                _ => ScalingMetrics::default(),
            };
            ResultView { row, scaling }
        })
        .collect()
}

fn tally(batch: &BenchmarkBatch, results: &[ResultView]) -> Progress {
    let mut progress = Progress {
        expected: batch.sizes.0.len() * (batch.procs.0.len() + 1),
        ..Progress::default()
    };
    for r in results {
        match r.row.status.parse::<ResultStatus>() {
            Ok(ResultStatus::Pending) => progress.pending += 1,
            Ok(ResultStatus::Ok) => progress.ok += 1,
            Ok(ResultStatus::Failed) | Err(_) => progress.failed += 1,
        }
    }
    progress
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/benchmarks
///
/// Parse the sweep, enforce the combination cap, record the batch and start
/// it in the background. Returns 202 with the batch id.
pub async fn submit_benchmark(
    State(state): State<AppState>,
    Json(input): Json<SubmitBenchmark>,
) -> AppResult<impl IntoResponse> {
    let sizes = parse_list_or_range(&input.sizes, 1, MAX_SIZE).map_err(|e| field_error("sizes", e))?;
    let procs =
        parse_list_or_range(&input.procs, 1, MAX_PROCS).map_err(|e| field_error("procs", e))?;
    let combinations = validate_combination_limit(&sizes, &procs, state.config.combination_cap)?;

    let repeats = input.repeats.unwrap_or(DEFAULT_REPEATS);
    validate_repeats(repeats)?;
    let seed = input.seed.unwrap_or_else(rand::random);
    let oversubscribe = input.oversubscribe.unwrap_or(state.compute.oversubscribe);

    let hardware = HardwareProfile::capture();
    if let Some(&max_procs) = procs.last() {
        if hardware.oversubscribed_at(max_procs) && !oversubscribe {
            tracing::warn!(
                max_procs,
                logical_cpus = hardware.logical_cpus,
                "Process counts exceed logical CPUs without --oversubscribe",
            );
        }
    }

    let batch_id = uuid::Uuid::new_v4().to_string();
    let batch = BenchmarkRepo::create_batch(
        &state.pool,
        &CreateBatch {
            id: batch_id.clone(),
            seed,
            repeats,
            sizes_expr: input.sizes,
            procs_expr: input.procs,
            sizes: sizes.clone(),
            procs: procs.clone(),
            oversubscribe,
            hardware,
        },
        chrono::Utc::now(),
    )
    .await?;

    // Detached: progress is observed through the result rows.
    state.benchmarks.spawn(BatchSpec {
        batch_id: batch.id.clone(),
        seed,
        repeats,
        sizes: sizes.clone(),
        procs: procs.clone(),
        oversubscribe,
    });

    tracing::info!(batch_id = %batch.id, seed, repeats, combinations, "Benchmark batch submitted");

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: BenchmarkAccepted {
                batch_id: batch.id,
                combinations,
                seed,
                repeats,
                sizes,
                procs,
            },
        }),
    ))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/benchmarks/{batch_id}
///
/// Batch descriptor, progress and every result row with derived speedup,
/// efficiency and Karp-Flatt figures.
pub async fn get_benchmark(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let batch = BenchmarkRepo::find_batch(&state.pool, &batch_id)
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::NotFound {
                entity: "BenchmarkBatch",
                id: batch_id.clone(),
            })
        })?;

    let rows = BenchmarkRepo::list_results(&state.pool, &batch_id).await?;
    let results = with_scaling(rows);
    let progress = tally(&batch, &results);

    Ok(Json(DataResponse {
        data: BenchmarkReport {
            batch,
            progress,
            results,
        },
    }))
}

#[cfg(test)]
mod tests {
    use sqlx::types::Json;

    use super::*;

    fn row(n: i64, mode: RunMode, p: i64, status: ResultStatus, time_ms: Option<f64>) -> BenchmarkResultRow {
        BenchmarkResultRow {
            batch_id: "b".to_string(),
            n,
            mode: mode.as_str().to_string(),
            p,
            status: status.as_str().to_string(),
            time_ms,
            samples: Json(Vec::new()),
            error_msg: None,
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn mpi_rows_scale_against_serial_of_same_size() {
        let views = with_scaling(vec![
            row(128, RunMode::Serial, 1, ResultStatus::Ok, Some(100.0)),
            row(128, RunMode::Mpi, 4, ResultStatus::Ok, Some(25.0)),
            row(256, RunMode::Mpi, 4, ResultStatus::Ok, Some(25.0)),
        ]);
        assert_eq!(views[0].scaling, ScalingMetrics::default());
        assert_eq!(views[1].scaling.speedup, Some(4.0));
        assert_eq!(views[1].scaling.efficiency, Some(1.0));
        assert_eq!(views[2].scaling, ScalingMetrics::default());
    }

    #[test]
    fn failed_serial_leaves_metrics_null() {
        let views = with_scaling(vec![
            row(64, RunMode::Serial, 1, ResultStatus::Failed, None),
            row(64, RunMode::Mpi, 2, ResultStatus::Ok, Some(10.0)),
        ]);
        assert_eq!(views[1].scaling.speedup, None);
        assert_eq!(views[1].scaling.karp_flatt, None);
    }

    #[test]
    fn scaling_fields_flatten_into_row() {
        let views = with_scaling(vec![
            row(8, RunMode::Serial, 1, ResultStatus::Ok, Some(30.0)),
            row(8, RunMode::Mpi, 2, ResultStatus::Ok, Some(15.0)),
        ]);
        let json = serde_json::to_value(&views[1]).expect("serialize");
        assert_eq!(json["mode"], "mpi");
        assert_eq!(json["speedup"], 2.0);
        assert!(json["karp_flatt"].is_number());
    }
}
