//! Argument vectors for the compute binaries.
//!
//! Both binaries take positional `inputA inputB outputC`. The parallel one
//! is started through the MPI launcher:
//!
//! ```text
//! <serial_bin> A B C
//! <mpirun> -n <p> [--oversubscribe] <mpi_bin> A B C
//! ```

use std::path::Path;
use std::time::Duration;

use matmul_core::process::ProcessInput;

/// A program plus its argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// Serial binary on `a x b -> c`.
    pub fn serial(serial_bin: &Path, a: &Path, b: &Path, c: &Path) -> Self {
        Self {
            program: path_arg(serial_bin),
            args: vec![path_arg(a), path_arg(b), path_arg(c)],
        }
    }

    /// Parallel binary on `a x b -> c` with `procs` MPI ranks.
    pub fn mpi(
        mpirun: &str,
        procs: u32,
        oversubscribe: bool,
        mpi_bin: &Path,
        a: &Path,
        b: &Path,
        c: &Path,
    ) -> Self {
        let mut args = vec!["-n".to_string(), procs.to_string()];
        if oversubscribe {
            args.push("--oversubscribe".to_string());
        }
        args.extend([path_arg(mpi_bin), path_arg(a), path_arg(b), path_arg(c)]);
        Self {
            program: mpirun.to_string(),
            args,
        }
    }

    /// Build invoker input running in `dir` with the optional timeout.
    pub fn input(&self, dir: &Path, timeout: Option<Duration>) -> ProcessInput {
        ProcessInput::new(self.args.clone())
            .in_dir(dir)
            .with_timeout(timeout)
    }

    /// Human-readable command line for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
