//! Metrics for the dispatcher.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters describing dispatcher activity
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    /// Batches accepted (strict + detailed)
    pub batches: AtomicU64,

    /// Input items across all batches
    pub items: AtomicU64,

    /// Items answered from the cache during partitioning
    pub cache_hits: AtomicU64,

    /// Items that needed a computation (own or shared)
    pub cache_misses: AtomicU64,

    /// Misses that attached to someone else's computation
    pub coalesced: AtomicU64,

    /// Adapter invocations started
    pub adapter_calls: AtomicU64,

    /// Adapter invocations that failed
    pub adapter_failures: AtomicU64,

    /// Adapter invocations currently executing
    pub adapter_active: AtomicU64,

    /// Highest number of simultaneous adapter invocations observed
    pub adapter_peak: AtomicU64,

    /// Total adapter time in milliseconds (for averaging)
    pub adapter_ms_total: AtomicU64,
}

impl DispatchMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a batch of `items` inputs
    pub fn record_batch(&self, items: usize) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.items.fetch_add(items as u64, Ordering::Relaxed);
    }

    pub fn record_partition(&self, hits: usize, misses: usize) {
        self.cache_hits.fetch_add(hits as u64, Ordering::Relaxed);
        self.cache_misses.fetch_add(misses as u64, Ordering::Relaxed);
    }

    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an adapter invocation starting
    pub fn record_adapter_start(&self) {
        self.adapter_calls.fetch_add(1, Ordering::Relaxed);
        let active = self.adapter_active.fetch_add(1, Ordering::Relaxed) + 1;
        // Update peak if needed
        let mut current_peak = self.adapter_peak.load(Ordering::Relaxed);
        while active > current_peak {
            match self.adapter_peak.compare_exchange_weak(
                current_peak,
                active,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => current_peak = x,
            }
        }
    }

    /// Record an adapter invocation finishing
    pub fn record_adapter_end(&self, elapsed: Duration, failed: bool) {
        self.adapter_active.fetch_sub(1, Ordering::Relaxed);
        self.adapter_ms_total
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        if failed {
            self.adapter_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Average adapter invocation time in milliseconds
    pub fn avg_adapter_ms(&self) -> f64 {
        let calls = self.adapter_calls.load(Ordering::Relaxed);
        if calls == 0 {
            return 0.0;
        }
        self.adapter_ms_total.load(Ordering::Relaxed) as f64 / calls as f64
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            batches: self.batches.load(Ordering::Relaxed),
            items: self.items.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            adapter_calls: self.adapter_calls.load(Ordering::Relaxed),
            adapter_failures: self.adapter_failures.load(Ordering::Relaxed),
            adapter_active: self.adapter_active.load(Ordering::Relaxed),
            adapter_peak: self.adapter_peak.load(Ordering::Relaxed),
            avg_adapter_ms: self.avg_adapter_ms(),
        }
    }
}

/// Snapshot of dispatcher metrics at a point in time
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DispatchSnapshot {
    pub batches: u64,
    pub items: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub coalesced: u64,
    pub adapter_calls: u64,
    pub adapter_failures: u64,
    pub adapter_active: u64,
    pub adapter_peak: u64,
    pub avg_adapter_ms: f64,
}
