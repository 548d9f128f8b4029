//! Health check, metrics and cache administration endpoints.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::metrics;
use crate::state::AppState;

/// Health check endpoint
///
/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "uptime_s": state.uptime_secs(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Ready check (for Kubernetes): at least one model and an open gate
///
/// GET /ready
pub async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let dispatcher = &state.dispatcher;
    if dispatcher.registry().is_empty() || dispatcher.gate().is_closed() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

/// Live check (for Kubernetes)
///
/// GET /live
pub async fn live() -> impl IntoResponse {
    StatusCode::OK
}

/// Metrics endpoint with cache and dispatcher statistics
///
/// GET /metrics
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.dispatcher.cache_stats();
    let dispatch = state.dispatcher.metrics();
    let cache_config = state.dispatcher.config().cache.clone();

    Json(json!({
        "status": "running",
        "uptime_s": state.uptime_secs(),
        "cache_items": stats.item_count,
        "cache_sample_keys": stats.sample_keys,
        "max_concurrency": stats.max_concurrency,
        "cache": {
            "config": {
                "capacity": cache_config.capacity,
                "ttl_secs": cache_config.ttl.map(|t| t.as_secs()),
                "shards": cache_config.shards
            },
            "counters": stats.counters,
            "in_flight": stats.in_flight
        },
        "gate": {
            "max_concurrency": stats.max_concurrency,
            "available_permits": stats.available_permits
        },
        "dispatch": dispatch
    }))
}

/// Prometheus text exposition
///
/// GET /metrics/prometheus
pub async fn metrics_prometheus(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    metrics::refresh_dispatch_gauges(&state.dispatcher);
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::encode_metrics(),
    )
}

/// Empty the result cache
///
/// DELETE /clear_cache
pub async fn clear_cache(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let cleared = state.dispatcher.clear_cache();
    info!(cleared, "Cache cleared via API");

    Json(json!({
        "status": "cleared",
        "cleared_items": cleared
    }))
}
