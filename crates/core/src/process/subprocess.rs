//! Shared subprocess management.
//!
//! [`run_command`] spawns a prepared [`tokio::process::Command`], captures
//! stdout/stderr and enforces the optional timeout. Invokers set the program
//! and arguments and delegate the rest here.

use std::process::Stdio;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::invoker::{ProcessError, ProcessInput, ProcessOutput};

/// Maximum stdout or stderr size captured per stream (10 MiB).
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Spawn `cmd`, capture its output, and wait for it under `input.timeout`.
///
/// Stdin is closed immediately; the compute binaries read their operands
/// from files.
pub async fn run_command(
    cmd: &mut Command,
    input: &ProcessInput,
) -> Result<ProcessOutput, ProcessError> {
    // `kill_on_drop(true)` kills the child when the timeout drops it.
    cmd.args(&input.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = &input.working_directory {
        cmd.current_dir(dir);
    }

    let start = Instant::now();

    let mut child = cmd.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            ProcessError::NotFound(cmd.as_std().get_program().to_string_lossy().into_owned())
        }
        std::io::ErrorKind::PermissionDenied => ProcessError::PermissionDenied(
            cmd.as_std().get_program().to_string_lossy().into_owned(),
        ),
        _ => ProcessError::IoError(e),
    })?;

    // Read both streams in spawned tasks so `child.wait()` can borrow the
    // child mutably.
    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();

    let stdout_task = tokio::spawn(async move { read_stream(stdout_handle).await });
    let stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

    let wait_result = match input.timeout {
        Some(limit) => tokio::time::timeout(limit, child.wait()).await,
        None => Ok(child.wait().await),
    };

    match wait_result {
        Ok(Ok(status)) => {
            let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
            let stdout_bytes = stdout_task.await.unwrap_or_default();
            let stderr_bytes = stderr_task.await.unwrap_or_default();

            Ok(ProcessOutput {
                stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
                stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
                exit_code: status.code().unwrap_or(-1),
                duration_ms,
            })
        }
        Ok(Err(e)) => Err(ProcessError::IoError(e)),
        Err(_elapsed) => {
            // `child` is dropped here, which kills the process.
            Err(ProcessError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            })
        }
    }
}

/// Read an entire output stream into a byte buffer, capped at [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
