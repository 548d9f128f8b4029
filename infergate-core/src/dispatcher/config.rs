//! Configuration for the dispatcher.

use crate::cache::CacheConfig;
use crate::gate::DEFAULT_MAX_CONCURRENCY;

/// Configuration for the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherConfig {
    /// Maximum number of adapter invocations in flight, process-wide
    pub max_concurrency: usize,

    /// Result cache configuration
    pub cache: CacheConfig,

    /// Number of cache keys reported by `cache_stats`
    pub sample_keys: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            cache: CacheConfig::default(),
            sample_keys: 3,
        }
    }
}

impl DispatcherConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self {
            cache: CacheConfig::from_env(),
            ..Self::default()
        };

        if let Ok(val) = std::env::var("INFERGATE_MAX_CONCURRENCY") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_concurrency = n.max(1);
            }
        }

        if let Ok(val) = std::env::var("INFERGATE_SAMPLE_KEYS") {
            if let Ok(n) = val.parse() {
                config.sample_keys = n;
            }
        }

        config
    }

    /// Builder-style override of the concurrency limit
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Builder-style override of the cache configuration
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DispatcherConfig::default();
        assert_eq!(config.max_concurrency, 6);
        assert_eq!(config.sample_keys, 3);
        assert_eq!(config.cache.capacity, None);
    }

    #[test]
    fn test_builders() {
        let config = DispatcherConfig::default()
            .with_max_concurrency(0)
            .with_cache(CacheConfig::bounded(10));
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.cache.capacity, Some(10));
    }
}
