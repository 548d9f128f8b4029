//! Inference, embedding and model listing endpoints.

use axum::{extract::State, Json};
use infergate_core::DetailedBatchResult;
use std::sync::Arc;
use tracing::info;

use crate::error::ApiError;
use crate::metrics::{self, RequestTimer};
use crate::state::AppState;
use crate::types::{EmbedRequest, EmbedResponse, InferRequest, InferResponse, ModelsResponse};

/// Number of vectors echoed back by `/v1/embeddings`
const VECTORS_PREVIEW: usize = 2;

/// Reject empty, oversized or blank-item batches
pub fn validate_inputs(inputs: &[String], max: usize) -> Result<(), ApiError> {
    if inputs.is_empty() {
        return Err(ApiError::invalid("inputs must not be empty"));
    }
    if inputs.len() > max {
        return Err(ApiError::invalid(format!(
            "too many inputs: {} (max {})",
            inputs.len(),
            max
        )));
    }
    if let Some(idx) = inputs.iter().position(|t| t.trim().is_empty()) {
        return Err(ApiError::invalid(format!("input {idx} is blank")));
    }
    Ok(())
}

/// List registered models
///
/// GET /v1/models
pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.dispatcher.list_models(),
    })
}

/// Strict batch inference
///
/// POST /v1/infer
pub async fn infer(
    State(state): State<Arc<AppState>>,
    Json(request): Json<InferRequest>,
) -> Result<Json<InferResponse>, ApiError> {
    let timer = RequestTimer::new("infer");
    info!(model = %request.model, inputs = request.inputs.len(), "Handling POST /v1/infer");

    let result: Result<Json<InferResponse>, ApiError> = async {
        validate_inputs(&request.inputs, state.config.max_batch_inputs)?;
        metrics::record_items(&request.model, request.inputs.len());

        let output = state
            .dispatcher
            .infer(&request.model, &request.inputs, request.params.as_ref())
            .await?;

        Ok(Json(InferResponse {
            model: request.model.clone(),
            output,
        }))
    }
    .await;

    timer.record(&result);
    result
}

/// Best-effort batch inference with per-item errors
///
/// POST /v1/infer_detail
pub async fn infer_detail(
    State(state): State<Arc<AppState>>,
    Json(request): Json<InferRequest>,
) -> Result<Json<DetailedBatchResult>, ApiError> {
    let timer = RequestTimer::new("infer_detail");
    info!(model = %request.model, inputs = request.inputs.len(), "Handling POST /v1/infer_detail");

    let result: Result<Json<DetailedBatchResult>, ApiError> = async {
        validate_inputs(&request.inputs, state.config.max_batch_inputs)?;
        metrics::record_items(&request.model, request.inputs.len());

        let detail = state
            .dispatcher
            .infer_detailed(&request.model, &request.inputs, request.params.as_ref())
            .await?;

        metrics::record_item_failures(&request.model, detail.fail);
        Ok(Json(detail))
    }
    .await;

    timer.record(&result);
    result
}

/// Embed inputs with a model
///
/// POST /v1/embeddings
pub async fn embeddings(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EmbedRequest>,
) -> Result<Json<EmbedResponse>, ApiError> {
    let timer = RequestTimer::new("embeddings");
    info!(model = %request.model, inputs = request.inputs.len(), "Handling POST /v1/embeddings");

    let result: Result<Json<EmbedResponse>, ApiError> = async {
        validate_inputs(&request.inputs, state.config.max_batch_inputs)?;

        let mut vectors = state
            .dispatcher
            .embed(&request.model, &request.inputs)
            .await?;

        let count = vectors.len();
        vectors.truncate(VECTORS_PREVIEW);

        Ok(Json(EmbedResponse {
            model: request.model.clone(),
            count,
            vectors_preview: vectors,
        }))
    }
    .await;

    timer.record(&result);
    result
}
