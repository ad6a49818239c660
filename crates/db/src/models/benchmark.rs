//! Benchmark batch and result rows.

use matmul_core::hardware::HardwareProfile;
use matmul_core::types::Timestamp;
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;

/// A row from the `benchmark_batches` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BenchmarkBatch {
    pub id: String,
    pub seed: i64,
    pub repeats: i64,
    pub sizes_expr: String,
    pub procs_expr: String,
    pub sizes: Json<Vec<u32>>,
    pub procs: Json<Vec<u32>>,
    pub oversubscribe: bool,
    pub hardware: Json<HardwareProfile>,
    pub created_at: Timestamp,
}

/// DTO for inserting a batch.
#[derive(Debug, Clone)]
pub struct CreateBatch {
    pub id: String,
    pub seed: u32,
    pub repeats: u32,
    pub sizes_expr: String,
    pub procs_expr: String,
    pub sizes: Vec<u32>,
    pub procs: Vec<u32>,
    pub oversubscribe: bool,
    pub hardware: HardwareProfile,
}

/// A row from the `benchmark_results` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BenchmarkResultRow {
    pub batch_id: String,
    pub n: i64,
    pub mode: String,
    pub p: i64,
    pub status: String,
    pub time_ms: Option<f64>,
    pub samples: Json<Vec<f64>>,
    pub error_msg: Option<String>,
    pub updated_at: Timestamp,
}
