//! Remote model adapter
//!
//! Forwards predictions to an external model-serving HTTP endpoint:
//!
//! ```text
//! POST {base_url}/predict  {"inputs": [...], "params": {...}}  ->  {"outputs": [...]}
//! POST {base_url}/embed    {"inputs": [...]}                   ->  {"vectors": [[...], ...]}
//! ```
//!
//! The dispatcher calls adapters on blocking worker threads, so each call
//! drives the async `reqwest` client to completion on the runtime handle
//! captured at construction.

use infergate_core::{Adapter, AdapterError, ModelRegistry, Params};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error, info};

/// Default request timeout for a single remote call
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Errors talking to a remote model endpoint
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Transport-level failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status
    #[error("endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The endpoint returned the wrong number of records
    #[error("expected {expected} records, endpoint returned {got}")]
    LengthMismatch { expected: usize, got: usize },

    /// A `name=url` model entry could not be parsed
    #[error("invalid model entry {0:?}, expected name=url")]
    InvalidModelEntry(String),

    /// Constructed outside a tokio runtime
    #[error("remote adapter must be created inside a tokio runtime")]
    NoRuntime,
}

impl From<RemoteError> for AdapterError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Status { .. } | RemoteError::LengthMismatch { .. } => {
                AdapterError::prediction(err.to_string())
            }
            other => AdapterError::backend(other.to_string()),
        }
    }
}

/// A named model endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEndpoint {
    pub name: String,
    pub url: String,
}

/// Remote adapter configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteAdapterConfig {
    /// Models to register
    pub models: Vec<ModelEndpoint>,

    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for RemoteAdapterConfig {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl RemoteAdapterConfig {
    /// Read `INFERGATE_MODELS` and `INFERGATE_REMOTE_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self, RemoteError> {
        let models = match env::var("INFERGATE_MODELS") {
            Ok(models) => Self::parse_models(&models)?,
            Err(_) => Vec::new(),
        };

        let timeout = env::var("INFERGATE_REMOTE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        Ok(Self { models, timeout })
    }

    /// Parse a comma-separated `name=url` list.
    ///
    /// # Example
    /// ```
    /// use infergate_adapters_remote::RemoteAdapterConfig;
    ///
    /// let models = RemoteAdapterConfig::parse_models("sentiment=http://localhost:9001, ner=http://localhost:9002/").unwrap();
    /// assert_eq!(models.len(), 2);
    /// assert_eq!(models[1].url, "http://localhost:9002");
    /// ```
    pub fn parse_models(list: &str) -> Result<Vec<ModelEndpoint>, RemoteError> {
        list.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let (name, url) = entry
                    .split_once('=')
                    .ok_or_else(|| RemoteError::InvalidModelEntry(entry.to_string()))?;
                let (name, url) = (name.trim(), url.trim().trim_end_matches('/'));
                if name.is_empty() || url.is_empty() {
                    return Err(RemoteError::InvalidModelEntry(entry.to_string()));
                }
                Ok(ModelEndpoint {
                    name: name.to_string(),
                    url: url.to_string(),
                })
            })
            .collect()
    }

    /// Build a registry with one remote adapter per configured model
    pub fn build_registry(&self) -> Result<ModelRegistry, RemoteError> {
        let mut registry = ModelRegistry::new();
        for endpoint in &self.models {
            let adapter =
                RemoteAdapter::with_timeout(endpoint.name.clone(), endpoint.url.clone(), self.timeout)?;
            registry.register(Arc::new(adapter));
        }
        Ok(registry)
    }
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    inputs: &'a [String],
    params: &'a Params,
}

#[derive(Deserialize)]
struct PredictResponse {
    outputs: Vec<Value>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    vectors: Vec<Vec<f32>>,
}

/// Adapter backed by a remote HTTP model server
pub struct RemoteAdapter {
    name: String,
    base_url: String,
    client: Client,
    handle: Handle,
}

impl RemoteAdapter {
    /// Create an adapter with the default timeout. Must be called inside a
    /// tokio runtime.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Result<Self, RemoteError> {
        Self::with_timeout(name, base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(
        name: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let handle = Handle::try_current().map_err(|_| RemoteError::NoRuntime)?;
        let name = name.into();
        let base_url = base_url.into().trim_end_matches('/').to_string();
        info!(model = %name, url = %base_url, "Creating remote adapter");

        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            name,
            base_url,
            handle,
        })
    }

    /// Get the endpoint base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, RemoteError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{}", self.base_url, path);
        debug!(model = %self.name, url = %url, "Calling remote endpoint");

        let response = self.client.post(&url).json(body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            error!(model = %self.name, status, body = %body, "Remote endpoint returned error");
            return Err(RemoteError::Status { status, body });
        }

        Ok(response.json().await?)
    }

    async fn predict_remote(&self, inputs: &[String], params: &Params) -> Result<Vec<Value>, RemoteError> {
        let response: PredictResponse = self.post("predict", &PredictRequest { inputs, params }).await?;
        check_len(inputs.len(), response.outputs.len())?;
        Ok(response.outputs)
    }

    async fn embed_remote(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RemoteError> {
        let response: EmbedResponse = self.post("embed", &EmbedRequest { inputs }).await?;
        check_len(inputs.len(), response.vectors.len())?;
        Ok(response.vectors)
    }
}

fn check_len(expected: usize, got: usize) -> Result<(), RemoteError> {
    if expected == got {
        Ok(())
    } else {
        Err(RemoteError::LengthMismatch { expected, got })
    }
}

impl Adapter for RemoteAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, inputs: &[String], params: &Params) -> Result<Vec<Value>, AdapterError> {
        self.handle
            .block_on(self.predict_remote(inputs, params))
            .map_err(AdapterError::from)
    }

    fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, AdapterError> {
        self.handle
            .block_on(self.embed_remote(inputs))
            .map_err(AdapterError::from)
    }
}
