//! infergate server library
//!
//! HTTP surface over one process-lifetime [`Dispatcher`]. Can be used as the
//! standalone `infergate-server` binary or embedded in another axum app via
//! [`build_router`].
//!
//! [`Dispatcher`]: infergate_core::Dispatcher

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use infergate_core::{DispatcherConfig, ModelRegistry};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

pub mod auth;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod types;

pub use state::AppState;

/// Default maximum number of inputs per batch request
pub const DEFAULT_MAX_BATCH_INPUTS: usize = 20;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Largest accepted batch on the inference endpoints
    pub max_batch_inputs: usize,
    /// Dispatcher (cache + gate) configuration
    pub dispatcher: DispatcherConfig,
    /// Whether to print the banner on startup
    pub print_banner: bool,
    /// Accepted API keys for protected routes (`None` = no check)
    pub api_keys: Option<HashSet<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            max_batch_inputs: DEFAULT_MAX_BATCH_INPUTS,
            dispatcher: DispatcherConfig::default(),
            print_banner: true,
            api_keys: None,
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("INFERGATE_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8000),
            max_batch_inputs: std::env::var("INFERGATE_MAX_BATCH_INPUTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_MAX_BATCH_INPUTS),
            dispatcher: DispatcherConfig::from_env(),
            print_banner: std::env::var("INFERGATE_NO_BANNER").is_err(),
            api_keys: std::env::var("INFERGATE_API_KEYS")
                .ok()
                .and_then(|list| auth::parse_api_keys(&list)),
        }
    }
}

/// Initialize Prometheus metrics registry.
/// Should be called once before starting the server.
pub fn init_metrics() {
    if let Err(e) = metrics::register_metrics() {
        warn!("Failed to register Prometheus metrics: {}", e);
    }
}

/// Build the application router over shared state
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(routes::health))
        .route("/ready", get(routes::ready))
        .route("/live", get(routes::live))
        .route("/metrics", get(routes::metrics))
        .route("/metrics/prometheus", get(routes::metrics_prometheus))
        .route("/clear_cache", delete(routes::clear_cache))
        // Inference endpoints
        .route(
            "/v1/models",
            get(routes::list_models).route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth::require_api_key,
            )),
        )
        .route("/v1/infer", post(routes::infer))
        .route("/v1/infer_detail", post(routes::infer_detail))
        .route("/v1/embeddings", post(routes::embeddings))
        // File upload endpoints
        .route("/v1/upload_infer", post(routes::upload_infer))
        .route("/v1/upload_infer_csv", post(routes::upload_infer_csv))
        // Vector store endpoints
        .route("/v1/vec/upsert", post(routes::vec_upsert))
        .route("/v1/vec/query", post(routes::vec_query))
        // Middleware
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the infergate server.
///
/// This function starts the HTTP server and blocks until it's shut down
/// with Ctrl-C.
///
/// # Example
/// ```no_run
/// use infergate_core::ModelRegistry;
/// use infergate_server::{run_server, ServerConfig};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = ServerConfig {
///         port: 8000,
///         ..Default::default()
///     };
///     run_server(config, ModelRegistry::new()).await
/// }
/// ```
pub async fn run_server(config: ServerConfig, registry: ModelRegistry) -> anyhow::Result<()> {
    init_metrics();

    info!(
        port = config.port,
        models = registry.len(),
        max_concurrency = config.dispatcher.max_concurrency,
        "Starting infergate v{}",
        env!("CARGO_PKG_VERSION")
    );

    if registry.is_empty() {
        warn!("No models registered; set INFERGATE_MODELS or pass --models");
    }

    let state = Arc::new(AppState::new(config.clone(), registry));

    if let Some(ttl) = config.dispatcher.cache.ttl {
        spawn_expiry_sweeper(state.clone(), ttl);
    }

    let app = build_router(state.clone());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("infergate listening on http://{}", addr);
    info!("Inference: http://{}/v1/infer", addr);
    info!("Health:    http://{}/health", addr);

    if config.print_banner {
        print_banner(&config, &state);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

    Ok(())
}

/// Periodically drop expired cache entries
fn spawn_expiry_sweeper(state: Arc<AppState>, ttl: Duration) {
    let period = ttl.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = state.dispatcher.evict_expired();
            if evicted > 0 {
                debug!(evicted, "Expiry sweep");
            }
        }
    });
}

async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
    state.dispatcher.shutdown();
}

/// Print the startup banner
fn print_banner(config: &ServerConfig, state: &Arc<AppState>) {
    let addr = format!("0.0.0.0:{}", config.port);
    let cache = &config.dispatcher.cache;

    println!();
    println!("==================================================");
    println!("  infergate v{}", env!("CARGO_PKG_VERSION"));
    println!("==================================================");
    println!("  Listening on: http://{}", addr);
    println!();
    println!("  Dispatcher configuration:");
    println!("    Max concurrency: {}", config.dispatcher.max_concurrency);
    println!("    Max batch inputs: {}", config.max_batch_inputs);
    println!(
        "    Cache: {}, TTL {}, {} shards",
        cache
            .capacity
            .map_or("unbounded".to_string(), |c| format!("{} entries", c)),
        cache
            .ttl
            .map_or("none".to_string(), |t| format!("{}s", t.as_secs())),
        cache.shards
    );
    println!();
    println!("  Models:");
    let models = state.dispatcher.list_models();
    if models.is_empty() {
        println!("    (none registered)");
    }
    for model in models {
        println!("    - {}", model);
    }
    println!();
    println!("  Endpoints:");
    println!("    Infer:   POST /v1/infer, /v1/infer_detail, /v1/embeddings");
    println!("    Vectors: POST /v1/vec/upsert, /v1/vec/query");
    println!("    Uploads: POST /v1/upload_infer, /v1/upload_infer_csv");
    println!(
        "    Models:  GET  /v1/models{}",
        if config.api_keys.is_some() { " (API key)" } else { "" }
    );
    println!("    Cache:   DELETE /clear_cache");
    println!("    Health:  GET  /health, /ready, /live, /metrics");
    println!("    Prometheus: GET /metrics/prometheus");
    println!("==================================================");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.max_batch_inputs, 20);
        assert_eq!(config.dispatcher.max_concurrency, 6);
        assert!(config.print_banner);
        assert!(config.api_keys.is_none());
    }
}
