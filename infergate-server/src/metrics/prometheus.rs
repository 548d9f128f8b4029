//! Prometheus metrics for the infergate server
//!
//! Request counters are updated by handlers; dispatcher gauges are refreshed
//! from the core snapshots on every scrape.

use infergate_core::Dispatcher;
use lazy_static::lazy_static;
use prometheus::{CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

lazy_static! {
    /// Global Prometheus registry for infergate metrics
    pub static ref REGISTRY: Registry = Registry::new();

    // ============== Request Metrics ==============

    /// Total requests counter with endpoint and status labels
    pub static ref REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("requests_total", "Total number of requests")
            .namespace("infergate"),
        &["endpoint", "status"]
    ).expect("metric can be created");

    /// Request duration histogram with endpoint label
    pub static ref REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "request_duration_seconds",
            "Request duration in seconds"
        )
        .namespace("infergate")
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["endpoint"]
    ).expect("metric can be created");

    /// Input items received, by model
    pub static ref ITEMS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("items_total", "Total input items received")
            .namespace("infergate"),
        &["model"]
    ).expect("metric can be created");

    /// Items that failed in detailed mode, by model
    pub static ref ITEM_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new("item_failures_total", "Total items that failed in detailed mode")
            .namespace("infergate"),
        &["model"]
    ).expect("metric can be created");

    // ============== Cache Metrics ==============

    /// Cache size gauge (number of entries)
    pub static ref CACHE_ITEMS: Gauge = Gauge::with_opts(
        Opts::new("cache_items", "Current number of cached results")
            .namespace("infergate")
    ).expect("metric can be created");

    /// Cache hits since startup (mirrored from the cache counters)
    pub static ref CACHE_HITS: Gauge = Gauge::with_opts(
        Opts::new("cache_hits", "Cache hits since startup")
            .namespace("infergate")
    ).expect("metric can be created");

    /// Cache misses since startup (mirrored from the cache counters)
    pub static ref CACHE_MISSES: Gauge = Gauge::with_opts(
        Opts::new("cache_misses", "Cache misses since startup")
            .namespace("infergate")
    ).expect("metric can be created");

    // ============== Dispatch Metrics ==============

    /// Keys currently being computed
    pub static ref IN_FLIGHT: Gauge = Gauge::with_opts(
        Opts::new("in_flight", "Keys currently being computed")
            .namespace("infergate")
    ).expect("metric can be created");

    /// Misses that attached to an existing computation
    pub static ref COALESCED: Gauge = Gauge::with_opts(
        Opts::new("coalesced", "Misses served by another caller's computation")
            .namespace("infergate")
    ).expect("metric can be created");

    /// Gate capacity
    pub static ref MAX_CONCURRENCY: Gauge = Gauge::with_opts(
        Opts::new("max_concurrency", "Maximum concurrent adapter invocations")
            .namespace("infergate")
    ).expect("metric can be created");

    /// Free gate permits
    pub static ref AVAILABLE_PERMITS: Gauge = Gauge::with_opts(
        Opts::new("available_permits", "Gate permits currently free")
            .namespace("infergate")
    ).expect("metric can be created");

    /// Highest concurrent adapter invocations observed
    pub static ref ADAPTER_PEAK: Gauge = Gauge::with_opts(
        Opts::new("adapter_peak", "Peak concurrent adapter invocations")
            .namespace("infergate")
    ).expect("metric can be created");
}

/// Register all metrics with the global registry.
/// Should be called once at startup.
pub fn register_metrics() -> prometheus::Result<()> {
    // Request metrics
    REGISTRY.register(Box::new(REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEST_DURATION_SECONDS.clone()))?;
    REGISTRY.register(Box::new(ITEMS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ITEM_FAILURES_TOTAL.clone()))?;

    // Cache metrics
    REGISTRY.register(Box::new(CACHE_ITEMS.clone()))?;
    REGISTRY.register(Box::new(CACHE_HITS.clone()))?;
    REGISTRY.register(Box::new(CACHE_MISSES.clone()))?;

    // Dispatch metrics
    REGISTRY.register(Box::new(IN_FLIGHT.clone()))?;
    REGISTRY.register(Box::new(COALESCED.clone()))?;
    REGISTRY.register(Box::new(MAX_CONCURRENCY.clone()))?;
    REGISTRY.register(Box::new(AVAILABLE_PERMITS.clone()))?;
    REGISTRY.register(Box::new(ADAPTER_PEAK.clone()))?;

    Ok(())
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_else(|e| format!("# Error encoding metrics: {}", e))
}

/// Copy the dispatcher's current state into the gauges
pub fn refresh_dispatch_gauges(dispatcher: &Dispatcher) {
    let stats = dispatcher.cache_stats();
    let snapshot = dispatcher.metrics();

    CACHE_ITEMS.set(stats.item_count as f64);
    CACHE_HITS.set(stats.counters.hits as f64);
    CACHE_MISSES.set(stats.counters.misses as f64);
    IN_FLIGHT.set(stats.in_flight as f64);
    MAX_CONCURRENCY.set(stats.max_concurrency as f64);
    AVAILABLE_PERMITS.set(stats.available_permits as f64);
    COALESCED.set(snapshot.coalesced as f64);
    ADAPTER_PEAK.set(snapshot.adapter_peak as f64);
}

/// Record items received for a model
pub fn record_items(model: &str, count: usize) {
    ITEMS_TOTAL.with_label_values(&[model]).inc_by(count as f64);
}

/// Record item failures for a model
pub fn record_item_failures(model: &str, count: usize) {
    if count > 0 {
        ITEM_FAILURES_TOTAL
            .with_label_values(&[model])
            .inc_by(count as f64);
    }
}

/// Helper struct for tracking request duration.
/// Records the request as an error if dropped without an explicit outcome.
pub struct RequestTimer {
    endpoint: &'static str,
    start: std::time::Instant,
    finished: bool,
}

impl RequestTimer {
    /// Start a new request timer for the given endpoint.
    pub fn new(endpoint: &'static str) -> Self {
        Self {
            endpoint,
            start: std::time::Instant::now(),
            finished: false,
        }
    }

    /// Record a successful request completion.
    pub fn record_success(mut self) {
        self.finish("success");
    }

    /// Record a failed request.
    pub fn record_failure(mut self) {
        self.finish("error");
    }

    /// Record the outcome of a handler result.
    pub fn record<T, E>(self, result: &Result<T, E>) {
        match result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
    }

    fn finish(&mut self, status: &str) {
        if self.finished {
            return;
        }
        self.finished = true;
        REQUEST_DURATION_SECONDS
            .with_label_values(&[self.endpoint])
            .observe(self.start.elapsed().as_secs_f64());
        REQUESTS_TOTAL
            .with_label_values(&[self.endpoint, status])
            .inc();
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        self.finish("error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_timer_counts_once() {
        let before = REQUESTS_TOTAL
            .with_label_values(&["timer-test", "success"])
            .get();

        let timer = RequestTimer::new("timer-test");
        timer.record_success();

        let after = REQUESTS_TOTAL
            .with_label_values(&["timer-test", "success"])
            .get();
        assert_eq!(after - before, 1.0);

        let errors = REQUESTS_TOTAL
            .with_label_values(&["timer-test", "error"])
            .get();
        assert_eq!(errors, 0.0);
    }

    #[test]
    fn test_dropped_timer_counts_as_error() {
        {
            let _timer = RequestTimer::new("drop-test");
        }
        let errors = REQUESTS_TOTAL
            .with_label_values(&["drop-test", "error"])
            .get();
        assert_eq!(errors, 1.0);
    }

    #[test]
    fn test_item_failures_skip_zero() {
        record_item_failures("zero-model", 0);
        record_item_failures("two-model", 2);
        assert_eq!(
            ITEM_FAILURES_TOTAL.with_label_values(&["two-model"]).get(),
            2.0
        );
    }

    #[test]
    fn test_encode_metrics() {
        let output = encode_metrics();
        // Empty until registered, otherwise namespaced
        assert!(output.is_empty() || output.starts_with('#') || output.contains("infergate"));
    }
}
