//! Admission control for sandbox executions
//!
//! Each execution builds an image and runs a memory-capped container, so the
//! number running at once is bounded by a counting semaphore. The permit is an
//! RAII guard: the slot is returned when the work finishes, fails or panics.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::errors::AdmissionError;

pub const DEFAULT_MAX_CONCURRENT_EXECUTIONS: usize = 5;

/// Proof of admission. Dropping it frees the slot.
#[derive(Debug)]
pub struct AdmissionPermit(OwnedSemaphorePermit);

#[derive(Debug, Clone)]
pub struct AdmissionController {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    acquire_timeout: Option<Duration>,
}

impl AdmissionController {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            acquire_timeout: None,
        }
    }

    /// Give up with [`AdmissionError::Unavailable`] if no slot frees up within `timeout`.
    pub fn with_acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots free right now.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Executions currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Stop admitting. Waiting and future callers get `Unavailable`; work
    /// already admitted runs to completion.
    pub fn close(&self) {
        log::info!("Admission controller closing, {} execution(s) in flight", self.in_flight());
        self.semaphore.close();
    }

    /// Wait for a free slot. The slot is held until the returned permit drops.
    pub async fn admit(&self) -> Result<AdmissionPermit, AdmissionError> {
        if self.available() == 0 && !self.is_closed() {
            log::debug!("All {} execution slots busy, waiting", self.capacity);
        }
        let acquire = self.semaphore.clone().acquire_owned();
        let permit = match self.acquire_timeout {
            Some(timeout) => tokio::time::timeout(timeout, acquire).await.map_err(|_| {
                AdmissionError::Unavailable(format!(
                    "no execution slot freed up within {:?}",
                    timeout
                ))
            })?,
            None => acquire.await,
        };
        permit
            .map(AdmissionPermit)
            .map_err(|_| AdmissionError::Unavailable("execution engine is shutting down".to_string()))
    }

    /// Wait for a free slot, run `work`, release the slot.
    pub async fn execute<F, T>(&self, work: F) -> Result<T, AdmissionError>
    where
        F: Future<Output = T>,
    {
        let _permit = self.admit().await?;
        Ok(work.await)
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT_EXECUTIONS)
    }
}
