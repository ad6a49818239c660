use std::path::{Path, PathBuf};
use std::time::Duration;

use matmul_core::job::DEFAULT_PROCS;

/// Compute configuration shared by the job runner and the benchmark engine.
#[derive(Debug, Clone)]
pub struct ComputeConfig {
    /// Serial compute binary.
    pub serial_bin: PathBuf,
    /// Parallel compute binary, launched through `mpirun`.
    pub mpi_bin: PathBuf,
    /// MPI launcher program (path or name resolved via `PATH`).
    pub mpirun: String,
    /// Root under which per-job working directories are created.
    pub job_work_dir: PathBuf,
    /// Root under which per-batch working directories are created.
    pub bench_work_dir: PathBuf,
    /// Worker-process count for jobs that do not override it.
    pub default_procs: u32,
    /// Pass `--oversubscribe` to `mpirun` for jobs.
    pub oversubscribe: bool,
    /// Per-invocation limit; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Maximum concurrent compute invocations on this host; `0` is unlimited.
    pub concurrency: usize,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            serial_bin: PathBuf::from("./worker/sermm"),
            mpi_bin: PathBuf::from("./worker/mpimm"),
            mpirun: "mpirun".to_string(),
            job_work_dir: PathBuf::from("./work/jobs"),
            bench_work_dir: PathBuf::from("./work/bench"),
            default_procs: DEFAULT_PROCS,
            oversubscribe: true,
            timeout: None,
            concurrency: 0,
        }
    }
}

impl ComputeConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default          |
    /// |------------------------|------------------|
    /// | `SERIAL_BIN`           | `./worker/sermm` |
    /// | `MPI_BIN`              | `./worker/mpimm` |
    /// | `MPIRUN`               | `mpirun`         |
    /// | `JOB_WORK_DIR`         | `./work/jobs`    |
    /// | `BENCH_WORK_DIR`       | `./work/bench`   |
    /// | `DEFAULT_PROCS`        | `4`              |
    /// | `OVERSUBSCRIBE`        | `true`           |
    /// | `COMPUTE_TIMEOUT_SECS` | `0` (none)       |
    /// | `COMPUTE_CONCURRENCY`  | `0` (unlimited)  |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let path_var = |key: &str, default: PathBuf| {
            std::env::var(key).map(PathBuf::from).unwrap_or(default)
        };

        let default_procs: u32 = std::env::var("DEFAULT_PROCS")
            .unwrap_or_else(|_| DEFAULT_PROCS.to_string())
            .parse()
            .expect("DEFAULT_PROCS must be a valid u32");
        assert!(default_procs > 0, "DEFAULT_PROCS must be at least 1");

        let oversubscribe: bool = std::env::var("OVERSUBSCRIBE")
            .unwrap_or_else(|_| "true".into())
            .parse()
            .expect("OVERSUBSCRIBE must be true or false");

        let timeout_secs: u64 = std::env::var("COMPUTE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "0".into())
            .parse()
            .expect("COMPUTE_TIMEOUT_SECS must be a valid u64");

        let concurrency: usize = std::env::var("COMPUTE_CONCURRENCY")
            .unwrap_or_else(|_| "0".into())
            .parse()
            .expect("COMPUTE_CONCURRENCY must be a valid usize");

        let config = Self {
            serial_bin: path_var("SERIAL_BIN", defaults.serial_bin),
            mpi_bin: path_var("MPI_BIN", defaults.mpi_bin),
            mpirun: std::env::var("MPIRUN").unwrap_or(defaults.mpirun),
            job_work_dir: path_var("JOB_WORK_DIR", defaults.job_work_dir),
            bench_work_dir: path_var("BENCH_WORK_DIR", defaults.bench_work_dir),
            default_procs,
            oversubscribe,
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            concurrency,
        };
        config.with_absolute_binaries()
    }

    /// Resolve relative binary paths against the current directory.
    ///
    /// Binaries run inside per-job directories, so a relative path would be
    /// looked up there. An `mpirun` without a path separator is left to
    /// `PATH` lookup.
    pub fn with_absolute_binaries(&self) -> Self {
        let mpirun = if self.mpirun.contains(std::path::MAIN_SEPARATOR) {
            absolute(Path::new(&self.mpirun))
                .to_string_lossy()
                .into_owned()
        } else {
            self.mpirun.clone()
        };
        Self {
            serial_bin: absolute(&self.serial_bin),
            mpi_bin: absolute(&self.mpi_bin),
            mpirun,
            ..self.clone()
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
