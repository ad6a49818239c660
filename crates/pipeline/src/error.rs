//! Failure taxonomy of the job pipeline.

use matmul_core::codec::{CodecError, MatrixFileError};
use matmul_core::process::ProcessError;
use matmul_core::store::StoreError;

/// A step of the job pipeline that did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The job store could not be read or the RUNNING transition recorded.
    #[error("job store: {0}")]
    Store(#[from] StoreError),

    /// Input files could not be written to the job directory.
    #[error("{0}")]
    InputWrite(String),

    /// The compute binary could not be started.
    #[error("{program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: ProcessError,
    },

    /// The compute binary ran and reported failure (or timed out).
    #[error("{program} exited with code {exit_code}: {message}")]
    NonZeroExit {
        program: String,
        exit_code: i32,
        message: String,
    },

    /// The output artifact could not be read.
    #[error("{0}")]
    OutputRead(String),

    /// The output artifact is not a valid matrix.
    #[error("{path}: {source}")]
    OutputParse {
        path: String,
        #[source]
        source: CodecError,
    },
}

impl PipelineError {
    /// Stable taxonomy code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Store(_) => "STORE_ERROR",
            Self::InputWrite(_) => "INPUT_WRITE_ERROR",
            Self::Spawn { .. } => "PROCESS_SPAWN_ERROR",
            Self::NonZeroExit { .. } => "PROCESS_NONZERO_EXIT",
            Self::OutputRead(_) => "OUTPUT_READ_ERROR",
            Self::OutputParse { .. } => "OUTPUT_PARSE_ERROR",
        }
    }

    /// Map an invoker error. Timeouts count as a non-zero exit.
    pub fn from_process(program: &str, err: ProcessError) -> Self {
        match err {
            ProcessError::Timeout { elapsed_ms } => Self::NonZeroExit {
                program: program.to_string(),
                exit_code: -1,
                message: format!("killed after {elapsed_ms}ms timeout"),
            },
            source => Self::Spawn {
                program: program.to_string(),
                source,
            },
        }
    }

    /// Map a failure reading back the output matrix.
    pub fn from_output(err: MatrixFileError) -> Self {
        match err {
            MatrixFileError::Io { path, source } => Self::OutputRead(format!("{path}: {source}")),
            MatrixFileError::Parse { path, source } => Self::OutputParse { path, source },
        }
    }

    /// Whether the serial fallback applies.
    pub fn is_process_failure(&self) -> bool {
        matches!(self, Self::Spawn { .. } | Self::NonZeroExit { .. })
    }

    /// `"<CODE>: <message>"`, as stored on a failed job.
    pub fn to_message(&self) -> String {
        format!("{}: {}", self.code(), self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
