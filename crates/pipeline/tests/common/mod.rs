//! Shared fixtures: fake compute binaries as executable shell scripts.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use matmul_core::matrix::Matrix;
use matmul_core::process::{ProcessError, ProcessInput, ProcessInvoker, ProcessOutput};
use matmul_pipeline::config::ComputeConfig;
use tempfile::TempDir;

/// Multiplies `$1 x $2` into `$3` and reports a compute time.
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
echo "COMPUTE_MS=1.25""#;

/// Fake `mpirun`: drops `-n <p> [--oversubscribe]` and runs the rest.
pub const FORWARD_MPIRUN: &str = r#"shift 2
if [ "$1" = "--oversubscribe" ]; then shift; fi
exec "$@""#;

/// Succeeds without output.
pub const SUCCEED: &str = "exit 0";

/// Fails with a diagnostic on stderr.
pub const FAIL: &str = r#"echo "boom" >&2
exit 1"#;

/// A temporary host with fake `mpirun`, parallel and serial binaries.
///
/// Every script appends its role (`mpirun`, `mpi`, `serial`) to a call log
/// before running its body.
pub struct Fixture {
    pub root: TempDir,
    pub config: ComputeConfig,
    log: PathBuf,
}

impl Fixture {
    pub fn new(mpirun_body: &str, mpi_body: &str, serial_body: &str) -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let bin = root.path().join("bin");
        std::fs::create_dir_all(&bin).expect("bin dir");
        let log = root.path().join("calls.log");

        let mpirun = write_script(&bin, "mpirun", &logged(&log, "mpirun", mpirun_body));
        let mpi_bin = write_script(&bin, "mpimm", &logged(&log, "mpi", mpi_body));
        let serial_bin = write_script(&bin, "sermm", &logged(&log, "serial", serial_body));

        let config = ComputeConfig {
            serial_bin,
            mpi_bin,
            mpirun: mpirun.to_string_lossy().into_owned(),
            job_work_dir: root.path().join("jobs"),
            bench_work_dir: root.path().join("bench"),
            default_procs: 2,
            oversubscribe: true,
            timeout: Some(Duration::from_secs(10)),
            concurrency: 0,
        };
        Self { root, config, log }
    }

    /// Parallel and serial binaries both multiply correctly.
    pub fn healthy() -> Self {
        Self::new(FORWARD_MPIRUN, MULTIPLY, MULTIPLY)
    }

    pub fn config(&self) -> Arc<ComputeConfig> {
        Arc::new(self.config.clone())
    }

    /// Roles in invocation order.
    pub fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Path for scratch state shared with scripts (counters etc).
    pub fn state_path(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    /// Copy the compute binaries into a fresh directory under the current
    /// directory and point the config at them through `./<dir>/...` paths.
    /// The directory is removed when the returned guard drops.
    pub fn use_relative_binaries(&mut self) -> TempDir {
        let local = tempfile::Builder::new()
            .prefix("relbin")
            .tempdir_in(".")
            .expect("local tempdir");
        let relative = Path::new(".").join(local.path().file_name().expect("dir name"));
        for (name, slot) in [
            ("sermm", &mut self.config.serial_bin),
            ("mpimm", &mut self.config.mpi_bin),
        ] {
            std::fs::copy(&*slot, local.path().join(name)).expect("copy binary");
            *slot = relative.join(name);
        }
        local
    }
}

fn logged(log: &Path, role: &str, body: &str) -> String {
    format!("echo {role} >> '{}'\n{body}", log.display())
}

/// Write an executable `#!/bin/sh` script.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    let mut perms = std::fs::metadata(&path).expect("metadata").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod");
    path
}

/// Script body that fails on the listed 1-based invocation numbers, using
/// `counter` to count invocations, and otherwise runs `then`.
pub fn fail_on_calls(counter: &Path, calls: &[u32], then: &str) -> String {
    let cases = calls
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("|");
    format!(
        r#"c=$(cat '{counter}' 2>/dev/null || echo 0)
c=$((c + 1))
echo $c > '{counter}'
case $c in {cases}) echo "flaky failure $c" >&2; exit 1;; esac
{then}"#,
        counter = counter.display(),
    )
}

pub fn matrix(rows: Vec<Vec<f64>>) -> Matrix {
    Matrix::from_rows(rows).expect("valid matrix")
}

// ---------------------------------------------------------------------------
// Scripted invoker
// ---------------------------------------------------------------------------

/// Invoker that never spawns anything. Programs listed in `failing` exit 1;
/// any other program "succeeds" by writing `output` to its last argument.
#[derive(Clone)]
pub struct ScriptedInvoker {
    failing: Vec<String>,
    output: String,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedInvoker {
    pub fn new(failing: &[&str], output: &str) -> Self {
        Self {
            failing: failing.iter().map(|s| s.to_string()).collect(),
            output: output.to_string(),
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl ProcessInvoker for ScriptedInvoker {
    async fn invoke(
        &self,
        program: &str,
        input: ProcessInput,
    ) -> Result<ProcessOutput, ProcessError> {
        self.calls.lock().unwrap().push(program.to_string());
        if self.failing.iter().any(|f| f == program) {
            return Ok(ProcessOutput {
                stdout: String::new(),
                stderr: "scripted failure".to_string(),
                exit_code: 1,
                duration_ms: 0.0,
            });
        }
        let target = input.args.last().expect("output path argument");
        tokio::fs::write(target, &self.output)
            .await
            .map_err(ProcessError::IoError)?;
        Ok(ProcessOutput {
            stdout: "COMPUTE_MS=2.5\n".to_string(),
            stderr: String::new(),
            exit_code: 0,
            duration_ms: 0.0,
        })
    }
}
