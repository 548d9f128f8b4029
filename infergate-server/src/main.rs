//! infergate server - batch text inference over remote model endpoints.
//!
//! ## Quick Start
//!
//! ```bash
//! # Two models served by external HTTP model servers
//! infergate-server --models sentiment=http://localhost:9001,ner=http://localhost:9002
//!
//! # Same, from the environment
//! INFERGATE_MODELS=sentiment=http://localhost:9001 INFERGATE_PORT=9000 infergate-server
//! ```
//!
//! ## Usage
//!
//! ```bash
//! curl -s localhost:8000/v1/infer \
//!   -H 'content-type: application/json' \
//!   -d '{"model": "sentiment", "inputs": ["great movie", "awful plot"]}'
//! ```

use clap::Parser;
use infergate_adapters_remote::RemoteAdapterConfig;
use infergate_core::CacheConfig;
use infergate_server::{run_server, ServerConfig};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "infergate-server")]
#[command(version)]
#[command(about = "Batch text inference with caching, single-flight and bounded concurrency", long_about = None)]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "INFERGATE_PORT")]
    port: Option<u16>,

    /// Maximum concurrent adapter invocations
    #[arg(long, env = "INFERGATE_MAX_CONCURRENCY")]
    max_concurrency: Option<usize>,

    /// Result cache capacity (0 = unbounded)
    #[arg(long, env = "INFERGATE_CACHE_SIZE")]
    cache_size: Option<usize>,

    /// Result cache TTL in seconds
    #[arg(long, env = "INFERGATE_CACHE_TTL_SECS")]
    cache_ttl: Option<u64>,

    /// Models as name=url pairs, comma separated
    #[arg(short, long, env = "INFERGATE_MODELS")]
    models: Option<String>,

    /// Accepted API keys for /v1/models, comma separated
    #[arg(long, env = "INFERGATE_API_KEYS")]
    api_keys: Option<String>,

    /// Do not print the startup banner
    #[arg(long)]
    no_banner: bool,
}

impl Cli {
    /// Apply command-line overrides on top of the environment config
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(n) = self.max_concurrency {
            config.dispatcher = config.dispatcher.clone().with_max_concurrency(n);
        }
        if let Some(size) = self.cache_size {
            config.dispatcher.cache.capacity = (size > 0).then_some(size);
        }
        if let Some(secs) = self.cache_ttl {
            config.dispatcher.cache.ttl = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(list) = &self.api_keys {
            config.api_keys = infergate_server::auth::parse_api_keys(list);
        }
        if self.no_banner {
            config.print_banner = false;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("infergate_server=info,infergate_core=info,tower_http=info")
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = ServerConfig::from_env();
    cli.apply(&mut config);

    let mut remote = RemoteAdapterConfig::from_env()?;
    if let Some(models) = &cli.models {
        remote.models = RemoteAdapterConfig::parse_models(models)?;
    }

    let registry = remote.build_registry()?;
    info!(models = ?registry.list_models(), "Model registry ready");

    if config.dispatcher.cache == CacheConfig::default() {
        info!("Result cache is unbounded; set --cache-size to cap memory");
    }

    run_server(config, registry).await
}
