//! Admission gate bounding concurrent downloads
//!
//! One gate is created at startup and handed to every coordinator that
//! downloads, so the bound holds across all resources. Slots are granted in
//! arrival order and returned when the guarded future completes or is dropped.

use crate::error::{AgendaError, AgendaResult};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// Bounded-concurrency admission gate
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    running: Arc<AtomicUsize>,
    capacity: usize,
}

impl ConcurrencyGate {
    /// Create a gate admitting at most `capacity` guarded operations at once
    pub fn new(capacity: i64) -> AgendaResult<Self> {
        if capacity <= 0 {
            return Err(AgendaError::InvalidConfiguration(format!(
                "gate capacity must be positive, got {}",
                capacity
            )));
        }
        let capacity = usize::try_from(capacity)
            .map_err(|_| AgendaError::InvalidConfiguration("gate capacity too large".into()))?;

        Ok(Self {
            // tokio's semaphore queues waiters FIFO
            semaphore: Arc::new(Semaphore::new(capacity)),
            running: Arc::new(AtomicUsize::new(0)),
            capacity,
        })
    }

    /// Run `operation` once a slot is free
    pub async fn run_guarded<F, T>(&self, operation: F) -> AgendaResult<T>
    where
        F: Future<Output = AgendaResult<T>>,
    {
        let permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| AgendaError::Internal("concurrency gate closed".to_string()))?;

        // Both guards release if this future is dropped mid-flight
        let slot = RunningSlot::enter(&self.running);
        debug!(
            "Gate admitted operation ({}/{} running)",
            self.running(),
            self.capacity
        );

        let result = operation.await;
        drop(slot);
        drop(permit);
        result
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Operations currently admitted
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }
}

struct RunningSlot<'a>(&'a AtomicUsize);

impl<'a> RunningSlot<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for RunningSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
