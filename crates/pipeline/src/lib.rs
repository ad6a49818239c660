//! Execution engine for matrix-multiplication jobs and benchmark sweeps.
//!
//! [`runner::JobRunner`] drives one job from `running` to a terminal state,
//! [`dispatcher::JobDispatcher`] hands jobs to it without blocking the
//! submitter, and [`benchmark::BenchmarkEngine`] runs size x process-count
//! sweeps. All of them report through the store traits in
//! `matmul_core::store` and invoke binaries through
//! `matmul_core::process::ProcessInvoker`.

pub mod benchmark;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod invocation;
pub mod memory;
pub mod runner;
pub mod workspace;
