//! Route definitions for the `/benchmarks` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::benchmarks;
use crate::state::AppState;

/// Routes mounted at `/benchmarks`.
///
/// ```text
/// POST   /                -> submit_benchmark
/// GET    /{batch_id}      -> get_benchmark
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(benchmarks::submit_benchmark))
        .route("/{batch_id}", get(benchmarks::get_benchmark))
}
