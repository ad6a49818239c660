#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use matmul_api::config::ServerConfig;
use matmul_api::routes;
use matmul_api::state::AppState;
use matmul_db::store::{ResultStorage, DEFAULT_RESULT_INLINE_LIMIT};
use matmul_pipeline::config::ComputeConfig;

/// Multiplies `$1 x $2` into `$3` with awk.
pub const MULTIPLY: &str = r#"awk '
FNR == 1 { f++; if (f == 1) { ra = $1; ca = $2 } else { cb = $2 }; next }
f == 1 { for (j = 1; j <= NF; j++) A[FNR - 1, j] = $j }
f == 2 { for (j = 1; j <= NF; j++) B[FNR - 1, j] = $j }
END {
  print ra, cb
  for (i = 1; i <= ra; i++) {
    line = ""
    for (j = 1; j <= cb; j++) {
      s = 0
      for (k = 1; k <= ca; k++) s += A[i, k] * B[k, j]
      line = line (j > 1 ? " " : "") s
    }
    print line
  }
}' "$1" "$2" > "$3"
echo "COMPUTE_MS=0.5""#;

/// Fake `mpirun`: drops `-n <p> [--oversubscribe]` and runs the rest.
pub const FORWARD_MPIRUN: &str = r#"shift 2
if [ "$1" = "--oversubscribe" ]; then shift; fi
exec "$@""#;

pub const FAIL: &str = r#"echo "boom" >&2
exit 1"#;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        database_url: "sqlite::memory:".to_string(),
        combination_cap: 6,
        queue_capacity: 64,
        shutdown_grace_secs: 5,
    }
}

/// Fake compute host plus the app wired to it.
pub struct TestApp {
    pub app: Router,
    pub pool: matmul_db::DbPool,
    pub root: TempDir,
    pub cancel: CancellationToken,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Options for [`spawn_app_with`].
pub struct Host<'a> {
    pub mpirun: &'a str,
    pub mpi: &'a str,
    pub serial: &'a str,
    pub inline_limit: usize,
}

impl Default for Host<'_> {
    fn default() -> Self {
        Self {
            mpirun: FORWARD_MPIRUN,
            mpi: MULTIPLY,
            serial: MULTIPLY,
            inline_limit: DEFAULT_RESULT_INLINE_LIMIT,
        }
    }
}

/// App over an in-memory database and working fake binaries.
pub async fn spawn_app() -> TestApp {
    spawn_app_with(Host::default()).await
}

pub async fn spawn_app_with(host: Host<'_>) -> TestApp {
    let root = tempfile::tempdir().expect("tempdir");
    let bin = root.path().join("bin");
    std::fs::create_dir_all(&bin).expect("bin dir");

    let compute = ComputeConfig {
        serial_bin: write_script(&bin, "sermm", host.serial),
        mpi_bin: write_script(&bin, "mpimm", host.mpi),
        mpirun: write_script(&bin, "mpirun", host.mpirun)
            .to_string_lossy()
            .into_owned(),
        job_work_dir: root.path().join("jobs"),
        bench_work_dir: root.path().join("bench"),
        default_procs: 2,
        oversubscribe: true,
        timeout: Some(Duration::from_secs(10)),
        concurrency: 0,
    };
    let results = ResultStorage::new(root.path().join("results"), host.inline_limit);

    let pool = matmul_db::create_memory_pool().await.expect("memory pool");
    matmul_db::run_migrations(&pool).await.expect("migrations");

    let cancel = CancellationToken::new();
    let (state, _dispatcher) =
        AppState::start(pool.clone(), test_config(), compute, results, cancel.clone());

    TestApp {
        app: build_test_app(state),
        pool,
        root,
        cancel,
    }
}

/// Build the full application router with all middleware layers.
///
/// Mirrors the router construction in `main.rs`.
pub fn build_test_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:5173".parse().unwrap()])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");

    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    let mut perms = std::fs::metadata(&path).expect("metadata").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod");
    path
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll `GET uri` until `done(data)` holds, returning the final `data`.
pub async fn poll_until<F>(app: &Router, uri: &str, done: F) -> serde_json::Value
where
    F: Fn(&serde_json::Value) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(15);
    loop {
        let response = get(app.clone(), uri).await;
        assert_eq!(response.status(), StatusCode::OK, "polling {uri}");
        let json = body_json(response).await;
        if done(&json["data"]) {
            return json["data"].clone();
        }
        assert!(Instant::now() < deadline, "timed out polling {uri}: {json}");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

/// Wait for a job to reach `completed` or `failed`.
pub async fn wait_for_job(app: &Router, job_id: &str) -> serde_json::Value {
    let uri = format!("/api/v1/jobs/{job_id}");
    poll_until(app, &uri, |job| {
        matches!(job["status"].as_str(), Some("completed" | "failed"))
    })
    .await
}
