pub mod benchmarks;
pub mod health;
pub mod jobs;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /jobs                          submit, list
/// /jobs/{id}                     get (?include=matrices)
///
/// /benchmarks                    submit sweep
/// /benchmarks/{batch_id}         batch, progress, results
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/benchmarks", benchmarks::router())
}
