use matmul_core::sweep::DEFAULT_COMBINATION_CAP;
use matmul_pipeline::dispatcher::DEFAULT_QUEUE_CAPACITY;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// Compute settings live in [`matmul_pipeline::config::ComputeConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// SQLite connection string (default: `sqlite://matmul.db`).
    pub database_url: String,
    /// Maximum `|sizes| x |procs|` accepted per benchmark batch (default: `100`).
    pub combination_cap: usize,
    /// Capacity of the job submission queue (default: `1024`).
    pub queue_capacity: usize,
    /// Seconds to wait for running jobs at shutdown (default: `30`).
    pub shutdown_grace_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `DATABASE_URL`         | `sqlite://matmul.db`       |
    /// | `COMBINATION_CAP`      | `100`                      |
    /// | `JOB_QUEUE_CAPACITY`   | `1024`                     |
    /// | `SHUTDOWN_GRACE_SECS`  | `30`                       |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://matmul.db".into());

        let combination_cap: usize = std::env::var("COMBINATION_CAP")
            .unwrap_or_else(|_| DEFAULT_COMBINATION_CAP.to_string())
            .parse()
            .expect("COMBINATION_CAP must be a valid usize");

        let queue_capacity: usize = std::env::var("JOB_QUEUE_CAPACITY")
            .unwrap_or_else(|_| DEFAULT_QUEUE_CAPACITY.to_string())
            .parse()
            .expect("JOB_QUEUE_CAPACITY must be a valid usize");

        let shutdown_grace_secs: u64 = std::env::var("SHUTDOWN_GRACE_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_GRACE_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            database_url,
            combination_cap,
            queue_capacity,
            shutdown_grace_secs,
        }
    }
}
