//! Metrics for the result cache.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for monitoring cache performance
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Lookups that found a live entry
    pub hits: AtomicU64,
    /// Lookups that found nothing (or an expired entry)
    pub misses: AtomicU64,
    /// Entries written
    pub puts: AtomicU64,
    /// Entries dropped by the LRU bound
    pub evictions: AtomicU64,
    /// Entries dropped because their TTL elapsed
    pub expirations: AtomicU64,
}

impl CacheMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expirations(&self, count: u64) {
        self.expirations.fetch_add(count, Ordering::Relaxed);
    }

    /// Get a snapshot of all counters
    pub fn snapshot(&self) -> CacheCounters {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        CacheCounters {
            hits,
            misses,
            puts: self.puts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            hit_rate: if lookups > 0 {
                hits as f64 / lookups as f64
            } else {
                0.0
            },
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.puts.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.expirations.store(0, Ordering::Relaxed);
    }
}

/// Snapshot of cache counters
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CacheCounters {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub evictions: u64,
    pub expirations: u64,
    /// hits / (hits + misses)
    pub hit_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_calculation() {
        let metrics = CacheMetrics::new();

        for _ in 0..3 {
            metrics.record_hit();
        }
        metrics.record_miss();

        let counters = metrics.snapshot();
        assert_eq!(counters.hits, 3);
        assert_eq!(counters.misses, 1);
        assert!((counters.hit_rate - 0.75).abs() < 0.001);
    }

    #[test]
    fn test_empty_hit_rate() {
        assert_eq!(CacheMetrics::new().snapshot().hit_rate, 0.0);
    }

    #[test]
    fn test_reset() {
        let metrics = CacheMetrics::new();
        metrics.record_hit();
        metrics.record_put();
        metrics.record_expirations(4);

        metrics.reset();

        let counters = metrics.snapshot();
        assert_eq!(counters.hits, 0);
        assert_eq!(counters.puts, 0);
        assert_eq!(counters.expirations, 0);
    }
}
