//! Per-job working directories.
//!
//! Every job gets `<root>/<job_id>/` holding `A.txt`, `B.txt` and the
//! binary's output `C.txt`. Directories of concurrent jobs never overlap.

use std::io;
use std::path::{Path, PathBuf};

/// Files of one job's run. All paths are absolute.
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    pub dir: PathBuf,
    pub input_a: PathBuf,
    pub input_b: PathBuf,
    pub output: PathBuf,
}

impl JobWorkspace {
    /// Create the directory for `job_id` under `root`.
    pub async fn create(root: &Path, job_id: &str) -> io::Result<Self> {
        if !is_safe_component(job_id) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("job id {job_id:?} is not a valid directory name"),
            ));
        }
        let dir = root.join(job_id);
        tokio::fs::create_dir_all(&dir).await?;
        let dir = tokio::fs::canonicalize(&dir).await?;
        Ok(Self {
            input_a: dir.join("A.txt"),
            input_b: dir.join("B.txt"),
            output: dir.join("C.txt"),
            dir,
        })
    }

    /// Remove the directory and everything in it. Failures are logged and
    /// otherwise ignored.
    pub async fn cleanup(&self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.dir).await {
            tracing::debug!(dir = %self.dir.display(), error = %e, "Job workspace cleanup failed");
        }
    }
}

/// Remove a file, ignoring any error.
pub async fn remove_quietly(path: &Path) {
    let _ = tokio::fs::remove_file(path).await;
}

fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
