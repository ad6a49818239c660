pub mod benchmarks;
pub mod jobs;
