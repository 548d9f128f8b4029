//! A single cache shard: LRU ordering with optional capacity and TTL.

use lru::LruCache;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use super::key::CacheKey;

/// A cached result with its creation time for TTL checking
struct CachedEntry {
    value: Value,
    created_at: Instant,
}

impl CachedEntry {
    fn new(value: Value) -> Self {
        Self {
            value,
            created_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Option<Duration>) -> bool {
        ttl.is_some_and(|ttl| self.created_at.elapsed() > ttl)
    }
}

/// Outcome of a shard lookup
pub(crate) enum Lookup {
    Hit(Value),
    Miss,
    Expired,
}

/// One lock's worth of the result cache
pub(crate) struct Shard {
    entries: LruCache<CacheKey, CachedEntry>,
    ttl: Option<Duration>,
}

impl Shard {
    /// Create a shard; `capacity: None` never evicts
    pub(crate) fn new(capacity: Option<usize>, ttl: Option<Duration>) -> Self {
        let entries = match capacity.and_then(NonZeroUsize::new) {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };
        Self { entries, ttl }
    }

    pub(crate) fn get(&mut self, key: &CacheKey) -> Lookup {
        match self.entries.get(key) {
            None => return Lookup::Miss,
            Some(entry) if !entry.is_expired(self.ttl) => return Lookup::Hit(entry.value.clone()),
            Some(_) => {}
        }

        self.entries.pop(key);
        Lookup::Expired
    }

    /// Insert a value; returns true when another key was evicted to make room
    pub(crate) fn put(&mut self, key: CacheKey, value: Value) -> bool {
        let incoming = key.clone();
        match self.entries.push(key, CachedEntry::new(value)) {
            Some((old_key, _)) => old_key != incoming,
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.entries.iter().map(|(k, _)| k)
    }

    /// Remove expired entries
    pub(crate) fn evict_expired(&mut self) -> usize {
        let ttl = self.ttl;
        if ttl.is_none() {
            return 0;
        }

        let expired: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(ttl))
            .map(|(key, _)| key.clone())
            .collect();

        let count = expired.len();
        for key in expired {
            self.entries.pop(&key);
        }
        count
    }
}
