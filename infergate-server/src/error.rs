//! Error types for the infergate HTTP API.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use infergate_core::DispatchError;
use serde_json::json;

/// API error types
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Request failed validation before reaching the dispatcher
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or unknown API key
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The dispatcher rejected or failed the request
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl ApiError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Dispatch(e) => match e {
                DispatchError::ModelNotFound(_) => StatusCode::NOT_FOUND,
                DispatchError::InvalidParams(_) => StatusCode::BAD_REQUEST,
                DispatchError::AdapterFailure(_) | DispatchError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                DispatchError::Shutdown => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }

    /// Short machine-readable error type
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "InvalidRequest",
            ApiError::Forbidden(_) => "Forbidden",
            ApiError::Dispatch(e) => match e {
                DispatchError::ModelNotFound(_) => "ModelNotFound",
                DispatchError::InvalidParams(_) => "InvalidParams",
                DispatchError::AdapterFailure(_) => "AdapterFailure",
                DispatchError::Shutdown => "Shutdown",
                DispatchError::Internal(_) => "Internal",
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": self.kind(),
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::invalid("x"), StatusCode::BAD_REQUEST),
            (ApiError::forbidden("no key"), StatusCode::FORBIDDEN),
            (DispatchError::model_not_found("m").into(), StatusCode::NOT_FOUND),
            (DispatchError::invalid_params("p").into(), StatusCode::BAD_REQUEST),
            (DispatchError::adapter("boom").into(), StatusCode::INTERNAL_SERVER_ERROR),
            (DispatchError::Internal("x".into()).into(), StatusCode::INTERNAL_SERVER_ERROR),
            (ApiError::from(DispatchError::Shutdown), StatusCode::SERVICE_UNAVAILABLE),
        ];

        for (err, status) in cases {
            assert_eq!(err.status(), status, "{err}");
        }
    }

    #[test]
    fn test_message_passthrough() {
        let err = ApiError::from(DispatchError::model_not_found("translate"));
        assert_eq!(err.to_string(), "Model not found: translate");
        assert_eq!(err.kind(), "ModelNotFound");
    }
}
