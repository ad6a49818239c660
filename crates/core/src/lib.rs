//! Pure domain logic for the matrix-multiplication job service.
//!
//! Everything here is free of database access: the interchange codec, the
//! deterministic benchmark generator, timing metrics, sweep parsing, the job
//! state machine, the subprocess layer and the store interfaces the engine
//! reports through.

pub mod codec;
pub mod error;
pub mod hardware;
pub mod job;
pub mod matrix;
pub mod matrix_gen;
pub mod metrics;
pub mod process;
pub mod store;
pub mod sweep;
pub mod types;
