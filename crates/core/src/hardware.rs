//! Host snapshot attached to benchmark batches.
//!
//! Recorded once at submission so results can later be compared against the
//! machine that produced them.

use serde::{Deserialize, Serialize};

/// Static characteristics of the benchmarking host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareProfile {
    /// Logical CPUs visible to this process.
    pub logical_cpus: usize,
    pub os: String,
    pub arch: String,
    /// Total physical memory, when the platform reports it.
    pub total_memory_bytes: Option<u64>,
}

impl HardwareProfile {
    /// Capture the current host.
    pub fn capture() -> Self {
        Self {
            logical_cpus: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            total_memory_bytes: total_memory_bytes(),
        }
    }

    /// Whether running `procs` workers exceeds the logical CPU count.
    pub fn oversubscribed_at(&self, procs: u32) -> bool {
        procs as usize > self.logical_cpus
    }
}

#[cfg(unix)]
fn total_memory_bytes() -> Option<u64> {
    // Safety: sysconf has no preconditions and only reads system limits.
    let (pages, page_size) =
        unsafe { (libc::sysconf(libc::_SC_PHYS_PAGES), libc::sysconf(libc::_SC_PAGESIZE)) };
    if pages <= 0 || page_size <= 0 {
        return None;
    }
    (pages as u64).checked_mul(page_size as u64)
}

#[cfg(not(unix))]
fn total_memory_bytes() -> Option<u64> {
    None
}
