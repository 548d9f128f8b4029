//! Process-wide admission control for adapter invocations.
//!
//! Every adapter call, whatever batch or model it came from, holds exactly
//! one [`GatePermit`] for its whole duration. The gate is the only admission
//! control: there is no per-model sub-limit and no queue beyond waiting on
//! the semaphore.
//!
//! ```text
//!   batch A ──┐
//!   batch B ──┼──► Semaphore(N) ──► spawn_blocking(adapter.predict)
//!   batch C ──┘
//! ```

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::DispatchError;

/// Default number of concurrent adapter invocations
pub const DEFAULT_MAX_CONCURRENCY: usize = 6;

/// Counting permit pool shared by all models and batches
#[derive(Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// A held permit; dropping it releases the slot
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    /// Create a gate with `capacity` permits (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            tracing::warn!("Concurrency gate capacity 0 is unusable, using 1");
            1
        } else {
            capacity
        };

        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a permit
    pub async fn acquire(&self) -> Result<GatePermit, DispatchError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DispatchError::Shutdown)?;

        tracing::trace!(available = self.available(), "Gate permit acquired");
        Ok(GatePermit { _permit: permit })
    }

    /// Take a permit only if one is free right now
    pub fn try_acquire(&self) -> Option<GatePermit> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| GatePermit { _permit: permit })
    }

    /// Total number of permits
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits not currently held
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Permits currently held
    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    /// Stop admitting work; pending and future `acquire` calls fail
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENCY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_permits_are_counted() {
        let gate = ConcurrencyGate::new(2);
        assert_eq!(gate.available(), 2);

        let p1 = gate.acquire().await.unwrap();
        assert_eq!(gate.in_use(), 1);

        let _p2 = gate.try_acquire().unwrap();
        assert_eq!(gate.available(), 0);

        // Third should fail (no permits)
        assert!(gate.try_acquire().is_none());

        drop(p1);
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let gate = ConcurrencyGate::new(1);
        let held = gate.acquire().await.unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.acquire().await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_close_fails_acquire() {
        let gate = ConcurrencyGate::new(1);
        gate.close();
        assert!(gate.is_closed());
        assert_eq!(gate.acquire().await.unwrap_err(), DispatchError::Shutdown);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let gate = ConcurrencyGate::new(0);
        assert_eq!(gate.capacity(), 1);
        assert_eq!(ConcurrencyGate::default().capacity(), DEFAULT_MAX_CONCURRENCY);
    }
}
