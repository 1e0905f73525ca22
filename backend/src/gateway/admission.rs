//! Fixed-capacity admission gate for dispatch work.
//!
//! Admission never waits: when every permit is taken the caller is turned
//! away at once with [`AdmissionRejected`].

use std::future::Future;

use tokio::sync::Semaphore;

/// Every admission permit is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Admission capacity exhausted")]
pub struct AdmissionRejected;

/// Bounds the number of dispatches in flight.
#[derive(Debug)]
pub struct AdmissionController {
    permits: Semaphore,
    capacity: usize,
}

impl AdmissionController {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Semaphore::new(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits not currently held.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn in_flight(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    /// Run `work` holding one permit, or fail immediately if none is free.
    ///
    /// The permit is released when the work finishes, fails, panics or is
    /// dropped mid-flight. Errors from `work` come back unchanged.
    pub async fn admit<F, Fut, T, E>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<AdmissionRejected>,
    {
        let _permit = match self.permits.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!(capacity = self.capacity, "Admission rejected, at capacity");
                return Err(AdmissionRejected.into());
            }
        };

        work().await
    }
}
