//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&DbPool` as the first argument.

pub mod benchmark_repo;
pub mod job_repo;

pub use benchmark_repo::BenchmarkRepo;
pub use job_repo::JobRepo;
