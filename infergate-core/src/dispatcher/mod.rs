//! Batch dispatcher: cache partitioning, single-flight resolution and
//! ordered result assembly.
//!
//! # Architecture
//!
//! ```text
//! infer / infer_detailed (model, inputs, params)
//!        │
//!        ▼
//! ┌──────────────┐
//! │   Registry   │ ─── unknown model fails here, before any cache lookup
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐
//! │ ResultCache  │ ─── hits fill their slot directly
//! └──────┬───────┘
//!        │ misses (concurrently)
//!        ▼
//! ┌──────────────┐
//! │ SingleFlight │ ─── one computation per key, shared by all waiters
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐
//! │ Gate permit  │ ─── held for the whole blocking adapter call
//! └──────┬───────┘
//!        ▼
//!   spawn_blocking(adapter.predict([text]))
//! ```
//!
//! Results are written back by input index, so the output order always
//! matches the input order regardless of completion order.

mod config;
mod metrics;
mod types;

pub use config::DispatcherConfig;
pub use metrics::{DispatchMetrics, DispatchSnapshot};
pub use types::{CacheStats, DetailedBatchResult, ItemError};

use futures::future::{join_all, try_join_all};
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::adapter::{Adapter, ModelRegistry};
use crate::cache::{CacheKey, ResultCache};
use crate::error::{AdapterError, DispatchError};
use crate::flight::{Role, SingleFlight};
use crate::gate::ConcurrencyGate;
use crate::params::{self, Params};

/// A batch after model resolution and cache partitioning
struct PreparedBatch {
    model: String,
    adapter: Arc<dyn Adapter>,
    params: Arc<Params>,
    params_key: String,
    /// One slot per input; cache hits are already filled
    slots: Vec<Option<Value>>,
    /// Indices of inputs that missed the cache
    misses: Vec<usize>,
}

/// Process-lifetime dispatcher shared by every request
pub struct Dispatcher {
    registry: Arc<ModelRegistry>,
    cache: Arc<ResultCache>,
    gate: ConcurrencyGate,
    flight: SingleFlight,
    metrics: Arc<DispatchMetrics>,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Create a dispatcher owning a fresh cache and gate
    pub fn new(registry: ModelRegistry, config: DispatcherConfig) -> Self {
        let cache = Arc::new(ResultCache::new(config.cache.clone()));
        let gate = ConcurrencyGate::new(config.max_concurrency);
        Self::with_parts(Arc::new(registry), cache, gate, config)
    }

    /// Create a dispatcher from externally owned components
    pub fn with_parts(
        registry: Arc<ModelRegistry>,
        cache: Arc<ResultCache>,
        gate: ConcurrencyGate,
        config: DispatcherConfig,
    ) -> Self {
        info!(
            models = registry.len(),
            max_concurrency = gate.capacity(),
            "Dispatcher initialized"
        );

        Self {
            flight: SingleFlight::new(cache.clone()),
            registry,
            cache,
            gate,
            metrics: Arc::new(DispatchMetrics::new()),
            config,
        }
    }

    /// Strict mode: every input must succeed.
    ///
    /// Returns one result per input in input order. The first failing miss
    /// aborts the call with [`DispatchError::AdapterFailure`]; computations
    /// other callers are waiting on keep running.
    #[instrument(skip(self, inputs, params), fields(model = %model, items = inputs.len()))]
    pub async fn infer(
        &self,
        model: &str,
        inputs: &[String],
        params: Option<&Value>,
    ) -> Result<Vec<Value>, DispatchError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let mut batch = self.prepare(model, inputs, params)?;

        let pending = batch.misses.iter().map(|&idx| {
            let batch = &batch;
            let text = &inputs[idx];
            async move { self.resolve_miss(batch, text).await.map(|value| (idx, value)) }
        });
        let resolved = try_join_all(pending).await.map_err(|e| {
            warn!(model = %model, error = %e, "Batch aborted");
            e
        })?;

        for (idx, value) in resolved {
            batch.slots[idx] = Some(value);
        }

        batch
            .slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.ok_or_else(|| DispatchError::Internal(format!("slot {idx} left unresolved")))
            })
            .collect()
    }

    /// Detailed mode: per-item failures are reported, never raised.
    ///
    /// Fails only when the model is unknown or the params are invalid.
    #[instrument(skip(self, inputs, params), fields(model = %model, items = inputs.len()))]
    pub async fn infer_detailed(
        &self,
        model: &str,
        inputs: &[String],
        params: Option<&Value>,
    ) -> Result<DetailedBatchResult, DispatchError> {
        if inputs.is_empty() {
            return Ok(DetailedBatchResult::empty(model));
        }

        let mut batch = self.prepare(model, inputs, params)?;

        let pending = batch.misses.iter().map(|&idx| {
            let batch = &batch;
            let text = &inputs[idx];
            async move { (idx, self.resolve_miss(batch, text).await) }
        });
        let resolved = join_all(pending).await;

        let mut errors = Vec::new();
        for (idx, outcome) in resolved {
            match outcome {
                Ok(value) => batch.slots[idx] = Some(value),
                Err(e) => errors.push(ItemError {
                    index: idx,
                    text: inputs[idx].clone(),
                    error: item_message(e),
                }),
            }
        }

        let fail = errors.len();
        if fail > 0 {
            warn!(model = %model, failed = fail, total = inputs.len(), "Batch completed with failures");
        }

        Ok(DetailedBatchResult {
            model: batch.model,
            total: inputs.len(),
            success: inputs.len() - fail,
            fail,
            outputs: batch.slots,
            errors,
        })
    }

    /// Embed inputs with the model's adapter. Not cached, but still gated.
    #[instrument(skip(self, inputs), fields(model = %model, items = inputs.len()))]
    pub async fn embed(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, DispatchError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let adapter = self.registry.resolve(model)?;
        let owned = inputs.to_vec();
        let expected = owned.len();

        let vectors = invoke(&self.gate, &self.metrics, move || adapter.embed(&owned)).await?;
        if vectors.len() != expected {
            return Err(DispatchError::adapter(format!(
                "expected {} vectors, adapter returned {}",
                expected,
                vectors.len()
            )));
        }
        Ok(vectors)
    }

    /// Resolve the adapter, canonicalize params and split hits from misses
    fn prepare(
        &self,
        model: &str,
        inputs: &[String],
        params: Option<&Value>,
    ) -> Result<PreparedBatch, DispatchError> {
        let adapter = self.registry.resolve(model)?;
        let params_key = params::canonicalize(params)?;
        let adapter_params = params::to_params(params)?;

        self.metrics.record_batch(inputs.len());

        let mut slots = Vec::with_capacity(inputs.len());
        let mut misses = Vec::new();
        for (idx, text) in inputs.iter().enumerate() {
            let key = CacheKey::new(model, text.as_str(), params_key.as_str());
            match self.cache.get(&key) {
                Some(value) => slots.push(Some(value)),
                None => {
                    slots.push(None);
                    misses.push(idx);
                }
            }
        }

        let hits = inputs.len() - misses.len();
        self.metrics.record_partition(hits, misses.len());
        debug!(model = %model, hits, misses = misses.len(), "Partitioned batch");

        Ok(PreparedBatch {
            model: model.to_string(),
            adapter,
            params: Arc::new(adapter_params),
            params_key,
            slots,
            misses,
        })
    }

    /// Resolve one cache miss through the single-flight coordinator
    async fn resolve_miss(&self, batch: &PreparedBatch, text: &str) -> Result<Value, DispatchError> {
        let key = CacheKey::new(batch.model.as_str(), text, batch.params_key.as_str());

        let adapter = batch.adapter.clone();
        let params = batch.params.clone();
        let gate = self.gate.clone();
        let metrics = self.metrics.clone();
        let model = batch.model.clone();
        let input = text.to_string();

        let compute = move || predict_one(adapter, gate, metrics, model, input, params);
        let (outcome, role) = self.flight.run_once_with_role(key, compute).await;

        if role == Role::Follower {
            self.metrics.record_coalesced();
        }
        outcome
    }

    /// Snapshot of the result cache. Never mutates anything.
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            item_count: self.cache.len(),
            sample_keys: self.cache.sample_keys(self.config.sample_keys),
            in_flight: self.flight.in_flight(),
            max_concurrency: self.gate.capacity(),
            available_permits: self.gate.available(),
            counters: self.cache.counters(),
        }
    }

    /// Empty the result cache. Running computations are not cancelled and
    /// will still publish their results when they finish.
    pub fn clear_cache(&self) -> usize {
        self.cache.clear()
    }

    /// Drop expired cache entries. A no-op unless a TTL is configured.
    pub fn evict_expired(&self) -> usize {
        self.cache.evict_expired()
    }

    /// Registered model names
    pub fn list_models(&self) -> Vec<String> {
        self.registry.list_models()
    }

    /// Get dispatcher metrics
    pub fn metrics(&self) -> DispatchSnapshot {
        self.metrics.snapshot()
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Stop admitting adapter work; waiting and future calls fail with
    /// [`DispatchError::Shutdown`]
    pub fn shutdown(&self) {
        info!("Dispatcher shutting down");
        self.gate.close();
    }
}

/// Run a single-input prediction. This is the computation the single-flight
/// leader spawns, so it owns everything it touches.
async fn predict_one(
    adapter: Arc<dyn Adapter>,
    gate: ConcurrencyGate,
    metrics: Arc<DispatchMetrics>,
    model: String,
    text: String,
    params: Arc<Params>,
) -> Result<Value, DispatchError> {
    let outcome = invoke(&gate, &metrics, move || {
        adapter.predict(std::slice::from_ref(&text), &params)
    })
    .await;

    match outcome {
        Ok(mut records) if !records.is_empty() => {
            debug!(model = %model, "Adapter prediction complete");
            Ok(records.swap_remove(0))
        }
        Ok(_) => {
            warn!(model = %model, "Adapter returned no result");
            Err(DispatchError::adapter("adapter returned no result"))
        }
        Err(e) => {
            warn!(model = %model, error = %e, "Adapter prediction failed");
            Err(e)
        }
    }
}

/// Run a blocking adapter call on a worker thread while holding one gate
/// permit. The permit moves into the worker so it is held for exactly the
/// duration of the call, even if the awaiting task goes away.
async fn invoke<T, F>(
    gate: &ConcurrencyGate,
    metrics: &Arc<DispatchMetrics>,
    call: F,
) -> Result<T, DispatchError>
where
    F: FnOnce() -> Result<T, AdapterError> + Send + 'static,
    T: Send + 'static,
{
    let permit = gate.acquire().await?;
    let metrics = metrics.clone();

    let joined = tokio::task::spawn_blocking(move || {
        metrics.record_adapter_start();
        let started = Instant::now();
        // A panicking adapter still has to close out its accounting
        let result = panic::catch_unwind(AssertUnwindSafe(call));
        let failed = !matches!(result, Ok(Ok(_)));
        metrics.record_adapter_end(started.elapsed(), failed);
        drop(permit);
        result
    })
    .await;

    match joined {
        Ok(Ok(result)) => result.map_err(DispatchError::from),
        Ok(Err(_)) => Err(DispatchError::adapter("adapter panicked")),
        Err(e) if e.is_panic() => Err(DispatchError::adapter("adapter panicked")),
        Err(e) => Err(DispatchError::Internal(format!("adapter task failed: {e}"))),
    }
}

/// Message recorded for a failed item in detailed mode
fn item_message(err: DispatchError) -> String {
    match err {
        DispatchError::AdapterFailure(msg) => msg,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdapterError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reverses text; fails on inputs starting with "bad"
    struct Reverse {
        calls: AtomicUsize,
    }

    impl Adapter for Reverse {
        fn name(&self) -> &str {
            "reverse"
        }

        fn predict(&self, inputs: &[String], params: &Params) -> Result<Vec<Value>, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let suffix = params.get("suffix").and_then(Value::as_str).unwrap_or("");
            inputs
                .iter()
                .map(|t| {
                    if t.starts_with("bad") {
                        Err(AdapterError::prediction(format!("cannot handle {t}")))
                    } else {
                        Ok(json!({"text": format!("{}{}", t.chars().rev().collect::<String>(), suffix)}))
                    }
                })
                .collect()
        }
    }

    fn dispatcher() -> (Dispatcher, Arc<Reverse>) {
        let adapter = Arc::new(Reverse {
            calls: AtomicUsize::new(0),
        });
        let mut registry = ModelRegistry::new();
        registry.register(adapter.clone());
        (Dispatcher::new(registry, DispatcherConfig::default()), adapter)
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_infer_preserves_order() {
        let (dispatcher, _) = dispatcher();
        let out = dispatcher
            .infer("reverse", &texts(&["abc", "xy", "q"]), None)
            .await
            .unwrap();

        assert_eq!(
            out,
            vec![json!({"text": "cba"}), json!({"text": "yx"}), json!({"text": "q"})]
        );
    }

    #[tokio::test]
    async fn test_second_call_is_pure_cache_hit() {
        let (dispatcher, adapter) = dispatcher();
        let inputs = texts(&["one", "two"]);

        let first = dispatcher.infer("reverse", &inputs, None).await.unwrap();
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);

        let second = dispatcher.infer("reverse", &inputs, None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_duplicates_in_batch_compute_once() {
        let (dispatcher, adapter) = dispatcher();
        let out = dispatcher
            .infer("reverse", &texts(&["dup", "dup", "dup"]), None)
            .await
            .unwrap();

        assert_eq!(out, vec![json!({"text": "pud"}); 3]);
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.metrics().coalesced, 2);
    }

    #[tokio::test]
    async fn test_params_flow_to_adapter_and_key() {
        let (dispatcher, adapter) = dispatcher();
        let inputs = texts(&["ab"]);

        let plain = dispatcher.infer("reverse", &inputs, None).await.unwrap();
        let suffixed = dispatcher
            .infer("reverse", &inputs, Some(&json!({"suffix": "!"})))
            .await
            .unwrap();

        assert_eq!(plain, vec![json!({"text": "ba"})]);
        assert_eq!(suffixed, vec![json!({"text": "ba!"})]);
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_model_fails_fast() {
        let (dispatcher, _) = dispatcher();
        let err = dispatcher
            .infer("translate", &texts(&["hi"]), None)
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::ModelNotFound("translate".to_string()));

        let err = dispatcher
            .infer_detailed("translate", &texts(&["hi"]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::ModelNotFound(_)));
        assert_eq!(dispatcher.cache_stats().counters.misses, 0);
    }

    #[tokio::test]
    async fn test_empty_input_returns_immediately() {
        let (dispatcher, _) = dispatcher();
        assert!(dispatcher.infer("reverse", &[], None).await.unwrap().is_empty());

        let detail = dispatcher.infer_detailed("nope", &[], None).await.unwrap();
        assert_eq!(detail.total, 0);
        assert!(detail.outputs.is_empty());
        assert_eq!(dispatcher.metrics().batches, 0);
    }

    #[tokio::test]
    async fn test_invalid_params() {
        let (dispatcher, _) = dispatcher();
        let err = dispatcher
            .infer("reverse", &texts(&["hi"]), Some(&json!([1, 2])))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn test_strict_mode_propagates_failure() {
        let (dispatcher, _) = dispatcher();
        let err = dispatcher
            .infer("reverse", &texts(&["ok1", "bad", "ok2"]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::AdapterFailure(ref m) if m.contains("cannot handle bad")));
    }

    #[tokio::test]
    async fn test_detailed_mode_reports_partial_results() {
        let (dispatcher, _) = dispatcher();
        let detail = dispatcher
            .infer_detailed("reverse", &texts(&["ok1", "bad", "ok2"]), None)
            .await
            .unwrap();

        assert_eq!(detail.total, 3);
        assert_eq!(detail.success, 2);
        assert_eq!(detail.fail, 1);
        assert_eq!(
            detail.outputs,
            vec![Some(json!({"text": "1ko"})), None, Some(json!({"text": "2ko"}))]
        );
        assert_eq!(detail.errors.len(), 1);
        assert_eq!(detail.errors[0].index, 1);
        assert_eq!(detail.errors[0].text, "bad");
        assert_eq!(detail.errors[0].error, "prediction failed: cannot handle bad");
        assert!(!detail.is_complete());
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let (dispatcher, adapter) = dispatcher();
        let inputs = texts(&["bad"]);

        let _ = dispatcher.infer_detailed("reverse", &inputs, None).await.unwrap();
        let _ = dispatcher.infer_detailed("reverse", &inputs, None).await.unwrap();

        assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.cache_stats().item_count, 0);
        assert_eq!(dispatcher.metrics().adapter_failures, 2);
    }

    struct Exploding;

    impl Adapter for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }

        fn predict(&self, _inputs: &[String], _params: &Params) -> Result<Vec<Value>, AdapterError> {
            panic!("model crashed");
        }
    }

    #[tokio::test]
    async fn test_adapter_panic_is_accounted() {
        let mut registry = ModelRegistry::new();
        registry.register(Arc::new(Exploding));
        let dispatcher = Dispatcher::new(registry, DispatcherConfig::default());

        let detail = dispatcher
            .infer_detailed("exploding", &texts(&["a"]), None)
            .await
            .unwrap();
        assert_eq!(detail.fail, 1);
        assert_eq!(detail.errors[0].error, "adapter panicked");

        let err = dispatcher
            .infer("exploding", &texts(&["b"]), None)
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::adapter("adapter panicked"));

        let snapshot = dispatcher.metrics();
        assert_eq!(snapshot.adapter_active, 0);
        assert_eq!(snapshot.adapter_failures, 2);
        assert_eq!(dispatcher.gate().available(), dispatcher.gate().capacity());
    }

    #[tokio::test]
    async fn test_clear_cache_forces_recompute() {
        let (dispatcher, adapter) = dispatcher();
        let inputs = texts(&["x", "y"]);

        dispatcher.infer("reverse", &inputs, None).await.unwrap();
        assert_eq!(dispatcher.clear_cache(), 2);

        dispatcher.infer("reverse", &texts(&["x"]), None).await.unwrap();
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cache_stats() {
        let (dispatcher, _) = dispatcher();
        dispatcher
            .infer("reverse", &texts(&["a", "b", "c", "d"]), None)
            .await
            .unwrap();

        let stats = dispatcher.cache_stats();
        assert_eq!(stats.item_count, 4);
        assert_eq!(stats.sample_keys.len(), 3);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.max_concurrency, 6);
        assert_eq!(stats.available_permits, 6);
    }

    #[tokio::test]
    async fn test_embed_unsupported() {
        let (dispatcher, _) = dispatcher();
        let err = dispatcher.embed("reverse", &texts(&["a"])).await.unwrap_err();
        assert!(matches!(err, DispatchError::AdapterFailure(ref m) if m.contains("not supported")));
    }

    #[tokio::test]
    async fn test_shutdown_rejects_work() {
        let (dispatcher, _) = dispatcher();
        dispatcher.shutdown();

        let err = dispatcher.infer("reverse", &texts(&["a"]), None).await.unwrap_err();
        assert_eq!(err, DispatchError::Shutdown);

        let detail = dispatcher.infer_detailed("reverse", &texts(&["a"]), None).await.unwrap();
        assert_eq!(detail.fail, 1);
    }
}
