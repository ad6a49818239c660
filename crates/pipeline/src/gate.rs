//! Host-wide limit on concurrent compute invocations.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Shared by every job runner and benchmark engine on the host. Cloning
/// shares the same permits.
#[derive(Debug, Clone, Default)]
pub struct ComputeGate {
    semaphore: Option<Arc<Semaphore>>,
}

impl ComputeGate {
    /// At most `limit` concurrent invocations; `0` means unlimited.
    pub fn new(limit: usize) -> Self {
        Self {
            semaphore: (limit > 0).then(|| Arc::new(Semaphore::new(limit))),
        }
    }

    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Wait for a slot. Hold the returned permit for the duration of the
    /// invocation; `None` when the gate is unlimited.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        match &self.semaphore {
            Some(semaphore) => Arc::clone(semaphore).acquire_owned().await.ok(),
            None => None,
        }
    }

    /// Free slots, or `None` when unlimited.
    pub fn available(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|s| s.available_permits())
    }
}
