//! Memoization of adapter results.
//!
//! The cache maps a `(model, text, canonical params)` key to the result the
//! adapter produced for it. Entries are immutable once written.
//!
//! # Architecture
//!
//! ```text
//!            CacheKey
//!               │
//!         xxh3 digest % N
//!               │
//!   ┌───────┬───┴───┬───────┐
//!   │ shard │ shard │ shard │ ← independent Mutex<LruCache>
//!   └───────┴───────┴───────┘
//! ```
//!
//! Lookups and writes for keys routed to different shards never contend, so
//! a slow writer on one key does not block readers of unrelated keys.
//!
//! The default configuration is unbounded with no TTL: an entry lives until
//! [`ResultCache::clear`]. A capacity (LRU) and/or TTL can be layered on via
//! [`CacheConfig`] without changing the memoization contract.

mod config;
mod key;
mod metrics;
mod shard;

pub use config::CacheConfig;
pub use key::CacheKey;
pub use metrics::{CacheCounters, CacheMetrics};

use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};

use shard::{Lookup, Shard};

/// Sharded, thread-safe result cache
pub struct ResultCache {
    shards: Vec<Mutex<Shard>>,
    metrics: Arc<CacheMetrics>,
    config: CacheConfig,
}

impl ResultCache {
    /// Create a new result cache with the given configuration
    pub fn new(config: CacheConfig) -> Self {
        let capacities = shard_capacities(config.capacity, config.shards);
        let shard_count = capacities.len();

        let shards = capacities
            .into_iter()
            .map(|cap| Mutex::new(Shard::new(cap, config.ttl)))
            .collect();

        tracing::debug!(
            shards = shard_count,
            capacity = ?config.capacity,
            ttl = ?config.ttl,
            "Result cache initialized"
        );

        Self {
            shards,
            metrics: Arc::new(CacheMetrics::new()),
            config,
        }
    }

    /// Unbounded cache with default sharding
    pub fn unbounded() -> Self {
        Self::new(CacheConfig::default())
    }

    fn shard_for(&self, key: &CacheKey) -> MutexGuard<'_, Shard> {
        let idx = (key.digest() % self.shards.len() as u64) as usize;
        // A panic while holding a shard lock cannot leave an entry half-written
        self.shards[idx]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_all(&self) -> impl Iterator<Item = MutexGuard<'_, Shard>> {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    /// Look up a previously computed result
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let lookup = self.shard_for(key).get(key);
        match lookup {
            Lookup::Hit(value) => {
                self.metrics.record_hit();
                Some(value)
            }
            Lookup::Miss => {
                self.metrics.record_miss();
                None
            }
            Lookup::Expired => {
                self.metrics.record_expirations(1);
                self.metrics.record_miss();
                None
            }
        }
    }

    /// Look up without touching hit/miss counters
    pub(crate) fn peek(&self, key: &CacheKey) -> Option<Value> {
        match self.shard_for(key).get(key) {
            Lookup::Hit(value) => Some(value),
            Lookup::Miss | Lookup::Expired => None,
        }
    }

    /// Store a computed result
    pub fn put(&self, key: CacheKey, value: Value) {
        let evicted = self.shard_for(&key).put(key, value);
        self.metrics.record_put();
        if evicted {
            self.metrics.record_eviction();
        }
    }

    /// Remove every entry, returning how many were removed
    pub fn clear(&self) -> usize {
        let cleared: usize = self.lock_all().map(|mut shard| shard.clear()).sum();
        tracing::info!(cleared, "Result cache cleared");
        cleared
    }

    /// Current number of entries
    pub fn len(&self) -> usize {
        self.lock_all().map(|shard| shard.len()).sum()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `n` keys rendered for display, most recently used first per shard
    pub fn sample_keys(&self, n: usize) -> Vec<String> {
        let mut sample = Vec::with_capacity(n);
        for shard in self.lock_all() {
            if sample.len() >= n {
                break;
            }
            sample.extend(shard.keys().take(n - sample.len()).map(|k| k.to_string()));
        }
        sample
    }

    /// Remove expired entries (call periodically when a TTL is configured)
    pub fn evict_expired(&self) -> usize {
        let count: usize = self.lock_all().map(|mut shard| shard.evict_expired()).sum();
        if count > 0 {
            self.metrics.record_expirations(count as u64);
            tracing::debug!(count, "Evicted expired cache entries");
        }
        count
    }

    /// Get cache counters
    pub fn counters(&self) -> CacheCounters {
        self.metrics.snapshot()
    }

    /// Get the cache configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

/// Per-shard capacities. When bounded, there are never more shards than
/// entries and the caps sum exactly to the configured total.
fn shard_capacities(capacity: Option<usize>, shards: usize) -> Vec<Option<usize>> {
    let shards = shards.max(1);
    match capacity {
        None => vec![None; shards],
        Some(cap) => {
            let cap = cap.max(1);
            let count = shards.min(cap);
            let base = cap / count;
            let extra = cap % count;
            (0..count)
                .map(|i| Some(if i < extra { base + 1 } else { base }))
                .collect()
        }
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn key(model: &str, text: &str) -> CacheKey {
        CacheKey::new(model, text, "{}")
    }

    #[test]
    fn test_cache_basic() {
        let cache = ResultCache::unbounded();

        assert!(cache.get(&key("sentiment", "good")).is_none());

        cache.put(key("sentiment", "good"), json!({"label": "positive", "score": 0.98}));

        let cached = cache.get(&key("sentiment", "good"));
        assert_eq!(cached, Some(json!({"label": "positive", "score": 0.98})));

        let counters = cache.counters();
        assert_eq!(counters.hits, 1);
        assert_eq!(counters.misses, 1);
        assert_eq!(counters.puts, 1);
    }

    #[test]
    fn test_same_text_different_model() {
        let cache = ResultCache::unbounded();

        cache.put(key("translate", "hello"), json!({"text": "안녕"}));
        cache.put(key("summarize", "hello"), json!({"text": "hi"}));

        assert_ne!(
            cache.get(&key("translate", "hello")),
            cache.get(&key("summarize", "hello"))
        );
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_params_are_part_of_key() {
        let cache = ResultCache::unbounded();

        cache.put(CacheKey::new("summarize", "text", r#"{"max_length":32}"#), json!(1));
        cache.put(CacheKey::new("summarize", "text", r#"{"max_length":64}"#), json!(2));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("summarize", "text")).is_none());
    }

    #[test]
    fn test_clear_returns_count() {
        let cache = ResultCache::unbounded();
        for i in 0..10 {
            cache.put(key("translate", &format!("text-{i}")), json!(i));
        }

        assert_eq!(cache.clear(), 10);
        assert!(cache.is_empty());
        assert_eq!(cache.clear(), 0);
    }

    #[test]
    fn test_sample_keys_limited() {
        let cache = ResultCache::unbounded();
        for i in 0..10 {
            cache.put(key("translate", &format!("text-{i}")), json!(i));
        }

        let sample = cache.sample_keys(3);
        assert_eq!(sample.len(), 3);
        assert!(sample.iter().all(|k| k.starts_with("(\"translate\"")));

        assert!(ResultCache::unbounded().sample_keys(3).is_empty());
    }

    #[test]
    fn test_bounded_cache_evicts() {
        let cache = ResultCache::new(CacheConfig {
            capacity: Some(2),
            ttl: None,
            shards: 1,
        });

        cache.put(key("m", "a"), json!(1));
        cache.put(key("m", "b"), json!(2));
        cache.put(key("m", "c"), json!(3));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.counters().evictions, 1);
        assert!(cache.get(&key("m", "a")).is_none());
    }

    #[test]
    fn test_bounded_cache_respects_total_with_default_shards() {
        let cache = ResultCache::new(CacheConfig::bounded(2));
        for i in 0..50 {
            cache.put(key("m", &format!("text-{i}")), json!(i));
        }
        assert!(cache.len() <= 2, "len = {}", cache.len());

        let cache = ResultCache::new(CacheConfig::bounded(100));
        for i in 0..1000 {
            cache.put(key("m", &format!("text-{i}")), json!(i));
        }
        assert!(cache.len() <= 100, "len = {}", cache.len());
        assert!(cache.counters().evictions >= 900);
    }

    #[test]
    fn test_shard_capacities_sum_to_total() {
        assert_eq!(shard_capacities(None, 4), vec![None; 4]);
        assert_eq!(shard_capacities(Some(2), 16), vec![Some(1), Some(1)]);
        assert_eq!(
            shard_capacities(Some(10), 4),
            vec![Some(3), Some(3), Some(2), Some(2)]
        );

        let caps = shard_capacities(Some(100), 16);
        assert_eq!(caps.len(), 16);
        assert_eq!(caps.iter().flatten().sum::<usize>(), 100);
    }

    #[test]
    fn test_ttl_expiry_counts() {
        let cache = ResultCache::new(CacheConfig {
            capacity: None,
            ttl: Some(Duration::from_millis(1)),
            shards: 4,
        });
        cache.put(key("m", "a"), json!(1));
        cache.put(key("m", "b"), json!(2));

        std::thread::sleep(Duration::from_millis(10));

        assert!(cache.get(&key("m", "a")).is_none());
        assert_eq!(cache.evict_expired(), 1);
        assert_eq!(cache.counters().expirations, 2);
    }

    #[test]
    fn test_concurrent_put_get() {
        let cache = Arc::new(ResultCache::unbounded());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let k = key("m", &format!("{t}-{i}"));
                        cache.put(k.clone(), json!(i));
                        assert_eq!(cache.get(&k), Some(json!(i)));
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), 800);
    }
}
