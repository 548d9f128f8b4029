//! Request and response bodies for the HTTP API.

use infergate_core::{DetailedBatchResult, VectorMatch};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn default_namespace() -> String {
    "default".to_string()
}

fn default_top_k() -> usize {
    5
}

/// Body of `/v1/infer` and `/v1/infer_detail`
#[derive(Debug, Clone, Deserialize)]
pub struct InferRequest {
    pub model: String,
    pub inputs: Vec<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

/// Response of `/v1/infer`
#[derive(Debug, Clone, Serialize)]
pub struct InferResponse {
    pub model: String,
    pub output: Vec<Value>,
}

/// Body of `/v1/embeddings`
#[derive(Debug, Clone, Deserialize)]
pub struct EmbedRequest {
    pub model: String,
    pub inputs: Vec<String>,
}

/// Response of `/v1/embeddings`
#[derive(Debug, Clone, Serialize)]
pub struct EmbedResponse {
    pub model: String,
    pub count: usize,
    /// The first few vectors only
    pub vectors_preview: Vec<Vec<f32>>,
}

/// One document in an upsert
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Body of `/v1/vec/upsert`
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertRequest {
    pub model: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub items: Vec<UpsertItem>,
}

/// Response of `/v1/vec/upsert`
#[derive(Debug, Clone, Serialize)]
pub struct UpsertResponse {
    pub namespace: String,
    pub added: usize,
    pub updated: usize,
    pub size: usize,
}

/// Body of `/v1/vec/query`
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub model: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

/// Response of `/v1/vec/query`
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub namespace: String,
    pub query: String,
    pub top_k: usize,
    pub matches: Vec<VectorMatch>,
}

/// Response of `/v1/models`
#[derive(Debug, Clone, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<String>,
}

/// Format of an uploaded input file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadKind {
    /// First column of each row
    Csv,
    /// An array of strings, or an object with an `inputs` array
    Json,
}

/// Response of `/v1/upload_infer`
#[derive(Debug, Clone, Serialize)]
pub struct UploadInferResponse {
    pub filename: Option<String>,
    pub filetype: UploadKind,
    #[serde(flatten)]
    pub detail: DetailedBatchResult,
}
