//! Repository for `benchmark_batches` and `benchmark_results`.

use matmul_core::store::{BenchmarkResult, ResultStatus};
use matmul_core::types::Timestamp;
use sqlx::types::Json;

use crate::models::benchmark::{BenchmarkBatch, BenchmarkResultRow, CreateBatch};
use crate::DbPool;

const BATCH_COLUMNS: &str = "\
    id, seed, repeats, sizes_expr, procs_expr, sizes, procs, \
    oversubscribe, hardware, created_at";

const RESULT_COLUMNS: &str = "\
    batch_id, n, mode, p, status, time_ms, samples, error_msg, updated_at";

/// Provides persistence operations for benchmark sweeps.
pub struct BenchmarkRepo;

impl BenchmarkRepo {
    /// Insert a batch descriptor.
    pub async fn create_batch(
        pool: &DbPool,
        input: &CreateBatch,
        now: Timestamp,
    ) -> Result<BenchmarkBatch, sqlx::Error> {
        let query = format!(
            "INSERT INTO benchmark_batches \
                 (id, seed, repeats, sizes_expr, procs_expr, sizes, procs, oversubscribe, hardware, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
             RETURNING {BATCH_COLUMNS}"
        );
        sqlx::query_as::<_, BenchmarkBatch>(&query)
            .bind(&input.id)
            .bind(i64::from(input.seed))
            .bind(i64::from(input.repeats))
            .bind(&input.sizes_expr)
            .bind(&input.procs_expr)
            .bind(Json(&input.sizes))
            .bind(Json(&input.procs))
            .bind(input.oversubscribe)
            .bind(Json(&input.hardware))
            .bind(now)
            .fetch_one(pool)
            .await
    }

    /// Find a batch by its ID.
    pub async fn find_batch(pool: &DbPool, id: &str) -> Result<Option<BenchmarkBatch>, sqlx::Error> {
        let query = format!("SELECT {BATCH_COLUMNS} FROM benchmark_batches WHERE id = ?1");
        sqlx::query_as::<_, BenchmarkBatch>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Insert or overwrite the row keyed by `(batch_id, n, mode, p)`.
    pub async fn upsert_result(
        pool: &DbPool,
        result: &BenchmarkResult,
        now: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO benchmark_results \
                 (batch_id, n, mode, p, status, time_ms, samples, error_msg, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
             ON CONFLICT (batch_id, n, mode, p) DO UPDATE SET \
                 status = excluded.status, \
                 time_ms = excluded.time_ms, \
                 samples = excluded.samples, \
                 error_msg = excluded.error_msg, \
                 updated_at = excluded.updated_at",
        )
        .bind(&result.batch_id)
        .bind(i64::from(result.n))
        .bind(result.mode.as_str())
        .bind(i64::from(result.p))
        .bind(result.status.as_str())
        .bind(result.time_ms)
        .bind(Json(&result.samples))
        .bind(&result.error_msg)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// All results of a batch ordered by size, serial first, then by `p`.
    pub async fn list_results(
        pool: &DbPool,
        batch_id: &str,
    ) -> Result<Vec<BenchmarkResultRow>, sqlx::Error> {
        let query = format!(
            "SELECT {RESULT_COLUMNS} FROM benchmark_results \
             WHERE batch_id = ?1 \
             ORDER BY n ASC, CASE mode WHEN 'serial' THEN 0 ELSE 1 END, p ASC"
        );
        sqlx::query_as::<_, BenchmarkResultRow>(&query)
            .bind(batch_id)
            .fetch_all(pool)
            .await
    }

    /// Fail every result row still `pending` from a previous process.
    pub async fn fail_pending(
        pool: &DbPool,
        error_msg: &str,
        now: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE benchmark_results \
             SET status = ?1, error_msg = ?2, updated_at = ?3 \
             WHERE status = ?4",
        )
        .bind(ResultStatus::Failed.as_str())
        .bind(error_msg)
        .bind(now)
        .bind(ResultStatus::Pending.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
