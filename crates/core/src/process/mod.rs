//! External process invocation.
//!
//! The compute binaries (serial, MPI launcher) are always run directly with
//! an argument vector, never through a shell. This module owns the spawn,
//! output capture and timeout handling; callers decide what to run.

pub mod binary;
pub mod invoker;
pub mod subprocess;

pub use binary::BinaryInvoker;
pub use invoker::{ProcessError, ProcessInput, ProcessInvoker, ProcessOutput};
