//! Direct binary invocation.
//!
//! Runs a program without a shell. When the program is given as a path it
//! must exist and carry an execute bit; bare names (e.g. `mpirun`) are
//! resolved through `PATH` by the OS at spawn time.

use std::os::unix::fs::PermissionsExt;

use super::invoker::{ProcessError, ProcessInput, ProcessInvoker, ProcessOutput};
use super::subprocess;

/// Invoker for executables on the local host.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryInvoker;

impl ProcessInvoker for BinaryInvoker {
    async fn invoke(
        &self,
        program: &str,
        input: ProcessInput,
    ) -> Result<ProcessOutput, ProcessError> {
        if program.contains(std::path::MAIN_SEPARATOR) {
            let metadata = tokio::fs::metadata(program)
                .await
                .map_err(|_| ProcessError::NotFound(program.to_string()))?;

            let mode = metadata.permissions().mode();
            if mode & 0o111 == 0 {
                return Err(ProcessError::PermissionDenied(format!(
                    "{program} is not executable (mode {mode:#o})"
                )));
            }
        }

        let mut cmd = tokio::process::Command::new(program);
        subprocess::run_command(&mut cmd, &input).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
