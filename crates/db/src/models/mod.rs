//! Row structs and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the table and the DTOs repositories accept.

pub mod benchmark;
pub mod job;
