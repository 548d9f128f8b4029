//! Configuration for the result cache.

use std::time::Duration;

/// Configuration for the result cache
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Maximum number of entries across all shards (`None` = unbounded)
    pub capacity: Option<usize>,

    /// Time-to-live for entries (`None` = entries never expire)
    pub ttl: Option<Duration>,

    /// Number of independently locked shards
    pub shards: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            // Entries live for the process lifetime unless cleared
            capacity: None,
            ttl: None,
            shards: 16,
        }
    }
}

impl CacheConfig {
    /// Bounded LRU cache with the given capacity
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::default()
        }
    }

    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("INFERGATE_CACHE_SIZE") {
            if let Ok(n) = val.parse::<usize>() {
                config.capacity = if n == 0 { None } else { Some(n) };
            }
        }

        if let Ok(val) = std::env::var("INFERGATE_CACHE_TTL_SECS") {
            if let Ok(n) = val.parse::<u64>() {
                config.ttl = if n == 0 { None } else { Some(Duration::from_secs(n)) };
            }
        }

        if let Ok(val) = std::env::var("INFERGATE_CACHE_SHARDS") {
            if let Ok(n) = val.parse::<usize>() {
                config.shards = n.max(1);
            }
        }

        config
    }

    /// Whether this config ever drops entries on its own
    pub fn is_bounded(&self) -> bool {
        self.capacity.is_some() || self.ttl.is_some()
    }
}
