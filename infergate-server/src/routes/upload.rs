//! Batch inference over uploaded files.
//!
//! Both endpoints take a multipart form with `model`, `file` and an optional
//! `params` field holding a JSON object. Inputs are read from the first
//! column of a `.csv` file or from a `.json` file holding either an array of
//! strings or `{"inputs": [...]}`. Blank entries are skipped. Inference runs
//! in detailed mode so one bad row does not fail the upload.

use axum::{
    extract::{Multipart, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use infergate_core::{DetailedBatchResult, DispatchError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::error::ApiError;
use crate::metrics::{self, RequestTimer};
use crate::state::AppState;
use crate::types::{UploadInferResponse, UploadKind};

/// Fields collected from the multipart form
#[derive(Debug, Default)]
struct UploadForm {
    model: Option<String>,
    params: Option<String>,
    filename: Option<String>,
    file: Option<Vec<u8>>,
}

/// Extract non-blank inputs from an uploaded file, chosen by extension
pub fn inputs_from_upload(filename: &str, raw: &[u8]) -> Result<(Vec<String>, UploadKind), ApiError> {
    if raw.is_empty() {
        return Err(ApiError::invalid("uploaded file is empty"));
    }

    let text = String::from_utf8_lossy(raw);
    let name = filename.to_lowercase();

    if name.ends_with(".csv") {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut inputs = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| ApiError::invalid(format!("invalid CSV upload: {e}")))?;
            if let Some(first) = record.get(0).map(str::trim).filter(|t| !t.is_empty()) {
                inputs.push(first.to_string());
            }
        }
        Ok((inputs, UploadKind::Csv))
    } else if name.ends_with(".json") {
        let data: Value = serde_json::from_str(&text)
            .map_err(|e| ApiError::invalid(format!("invalid JSON upload: {e}")))?;

        let items = match data {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("inputs") {
                Some(Value::Array(items)) => items,
                _ => return Err(ApiError::invalid("JSON upload must contain an \"inputs\" array")),
            },
            _ => return Err(ApiError::invalid("unsupported JSON structure")),
        };

        let inputs = items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        Ok((inputs, UploadKind::Json))
    } else {
        Err(ApiError::invalid("unsupported file type, expected .csv or .json"))
    }
}

/// Parse the optional `params` form field
fn parse_params(raw: Option<&str>) -> Result<Option<Value>, ApiError> {
    match raw.map(str::trim).filter(|p| !p.is_empty()) {
        None => Ok(None),
        Some(p) => serde_json::from_str(p)
            .map(Some)
            .map_err(|e| ApiError::invalid(format!("params is not valid JSON: {e}"))),
    }
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::invalid(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "model" | "params" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::invalid(format!("unreadable field {name}: {e}")))?;
                if name == "model" {
                    form.model = Some(value.trim().to_string());
                } else {
                    form.params = Some(value);
                }
            }
            "file" => {
                form.filename = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::invalid(format!("unreadable file: {e}")))?;
                form.file = Some(bytes.to_vec());
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Read the form and run the batch in detailed mode
async fn run_upload(
    state: &AppState,
    multipart: Multipart,
) -> Result<(Option<String>, UploadKind, Vec<String>, DetailedBatchResult), ApiError> {
    let form = read_form(multipart).await?;

    let model = form
        .model
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::invalid("missing form field: model"))?;
    let raw = form
        .file
        .ok_or_else(|| ApiError::invalid("missing form field: file"))?;

    let (inputs, kind) = inputs_from_upload(form.filename.as_deref().unwrap_or_default(), &raw)?;
    if inputs.is_empty() {
        return Err(ApiError::invalid("upload contains no usable inputs"));
    }
    let params = parse_params(form.params.as_deref())?;

    info!(
        model = %model,
        inputs = inputs.len(),
        filetype = ?kind,
        "Handling file upload"
    );
    metrics::record_items(&model, inputs.len());

    let detail = state
        .dispatcher
        .infer_detailed(&model, &inputs, params.as_ref())
        .await?;
    metrics::record_item_failures(&model, detail.fail);

    Ok((form.filename, kind, inputs, detail))
}

/// Render a detailed result as `index,input,output,error` rows
pub fn render_csv(inputs: &[String], detail: &DetailedBatchResult) -> Result<Vec<u8>, ApiError> {
    let to_internal = |e: String| ApiError::from(DispatchError::Internal(format!("CSV encoding failed: {e}")));

    let errors: HashMap<usize, &str> = detail
        .errors
        .iter()
        .map(|e| (e.index, e.error.as_str()))
        .collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["index", "input", "output", "error"])
        .map_err(|e| to_internal(e.to_string()))?;

    for (i, input) in inputs.iter().enumerate() {
        let output = match detail.outputs.get(i) {
            Some(Some(Value::String(s))) => s.clone(),
            Some(Some(value)) => value.to_string(),
            _ => String::new(),
        };
        let error = errors.get(&i).copied().unwrap_or_default();
        writer
            .write_record([i.to_string().as_str(), input.as_str(), output.as_str(), error])
            .map_err(|e| to_internal(e.to_string()))?;
    }

    writer.into_inner().map_err(|e| to_internal(e.to_string()))
}

/// Download name for the CSV result: the upload's stem plus `_result.csv`
fn result_filename(upload: Option<&str>) -> String {
    let name = upload.filter(|n| !n.is_empty()).unwrap_or("result");
    let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    format!("{}_result.csv", stem.replace(['"', '\\'], "_"))
}

/// Detailed inference over an uploaded file, JSON response
///
/// POST /v1/upload_infer
pub async fn upload_infer(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<UploadInferResponse>, ApiError> {
    let timer = RequestTimer::new("upload_infer");

    let result: Result<Json<UploadInferResponse>, ApiError> = async {
        let (filename, filetype, _, detail) = run_upload(&state, multipart).await?;
        Ok(Json(UploadInferResponse {
            filename,
            filetype,
            detail,
        }))
    }
    .await;

    timer.record(&result);
    result
}

/// Detailed inference over an uploaded file, CSV attachment response
///
/// POST /v1/upload_infer_csv
pub async fn upload_infer_csv(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let timer = RequestTimer::new("upload_infer_csv");

    let result: Result<Response, ApiError> = async {
        let (filename, _, inputs, detail) = run_upload(&state, multipart).await?;
        let body = render_csv(&inputs, &detail)?;
        let disposition = format!(
            "attachment; filename=\"{}\"",
            result_filename(filename.as_deref())
        );

        Ok((
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            body,
        )
            .into_response())
    }
    .await;

    timer.record(&result);
    result
}
