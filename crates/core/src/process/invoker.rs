//! Process invocation interface and shared types.
//!
//! Defines [`ProcessInvoker`], the seam between the job runner / benchmark
//! engine and the operating system, along with [`ProcessInput`],
//! [`ProcessOutput`], and [`ProcessError`].

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// Arguments and limits for one process invocation.
#[derive(Debug, Clone, Default)]
pub struct ProcessInput {
    /// Argument vector passed to the program verbatim.
    pub args: Vec<String>,
    /// Working directory for the child process (uses current dir if `None`).
    pub working_directory: Option<PathBuf>,
    /// Maximum wall-clock time before the process is killed. `None` waits
    /// indefinitely.
    pub timeout: Option<Duration>,
}

impl ProcessInput {
    pub fn new(args: Vec<String>) -> Self {
        Self {
            args,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }
}

/// Captured output from a finished process.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutput {
    /// Complete stdout captured from the process.
    pub stdout: String,
    /// Complete stderr captured from the process.
    pub stderr: String,
    /// Process exit code (`-1` if killed by signal).
    pub exit_code: i32,
    /// Wall-clock duration in milliseconds, sub-millisecond precision.
    pub duration_ms: f64,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stderr if non-empty, otherwise stdout. Used for failure messages.
    pub fn diagnostic(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// Errors that prevent a process from producing an exit status.
#[derive(Debug)]
pub enum ProcessError {
    /// The program was not found at the specified path.
    NotFound(String),
    /// The program exists but lacks execute permissions.
    PermissionDenied(String),
    /// The process exceeded its configured timeout and was killed.
    Timeout {
        /// Elapsed wall-clock time before the process was killed.
        elapsed_ms: u64,
    },
    /// An I/O error occurred while spawning or waiting on the process.
    IoError(std::io::Error),
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "Program not found: {path}"),
            Self::PermissionDenied(path) => write!(f, "Permission denied: {path}"),
            Self::Timeout { elapsed_ms } => {
                write!(f, "Process timed out after {elapsed_ms}ms")
            }
            Self::IoError(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for ProcessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IoError(err) => Some(err),
            _ => None,
        }
    }
}

/// Runs an external program with an argument vector.
pub trait ProcessInvoker: Send + Sync {
    /// Run `program` with `input` and wait for it to exit.
    ///
    /// A non-zero exit is NOT an error here; it is reported through
    /// [`ProcessOutput::exit_code`].
    fn invoke(
        &self,
        program: &str,
        input: ProcessInput,
    ) -> impl std::future::Future<Output = Result<ProcessOutput, ProcessError>> + Send;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
