//! Error types for the infergate dispatcher core.
//!
//! # Error Hierarchy
//!
//! ```text
//! DispatchError (returned by the Dispatcher)
//! ├── ModelNotFound   - unknown model identifier (client error)
//! ├── InvalidParams   - options mapping is not a serializable object (client error)
//! ├── AdapterFailure  - the adapter raised during prediction (server error)
//! ├── Shutdown        - the concurrency gate has been closed
//! └── Internal        - worker panics and other unexpected failures
//!
//! AdapterError (returned by Adapter implementations)
//! ```
//!
//! `DispatchError` is `Clone` so a single failed computation can be handed to
//! every caller waiting on the same cache key.

use thiserror::Error;

/// Errors surfaced by the dispatcher to the API layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// No adapter is registered under this name
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// The options mapping could not be canonicalized
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// The adapter failed while predicting
    #[error("Adapter failure: {0}")]
    AdapterFailure(String),

    /// The concurrency gate was closed while waiting for a permit
    #[error("Dispatcher is shutting down")]
    Shutdown,

    /// Unexpected internal failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Create a model-not-found error
    pub fn model_not_found(model: impl Into<String>) -> Self {
        Self::ModelNotFound(model.into())
    }

    /// Create an invalid-params error
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::InvalidParams(msg.into())
    }

    /// Create an adapter failure
    pub fn adapter(msg: impl Into<String>) -> Self {
        Self::AdapterFailure(msg.into())
    }

    /// Whether the caller is at fault (maps to a 4xx at the API layer)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::ModelNotFound(_) | Self::InvalidParams(_))
    }
}

impl From<AdapterError> for DispatchError {
    fn from(err: AdapterError) -> Self {
        Self::AdapterFailure(err.to_string())
    }
}

/// Errors raised by adapter implementations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// The model failed to produce a prediction
    #[error("prediction failed: {0}")]
    Prediction(String),

    /// The adapter rejected the supplied params
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// The adapter does not provide this capability
    #[error("{0} is not supported by this adapter")]
    Unsupported(String),

    /// The model backend could not be reached
    #[error("backend error: {0}")]
    Backend(String),
}

impl AdapterError {
    /// Create a prediction error
    pub fn prediction(msg: impl Into<String>) -> Self {
        Self::Prediction(msg.into())
    }

    /// Create a backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_error_display() {
        let err = DispatchError::model_not_found("translate");
        assert_eq!(err.to_string(), "Model not found: translate");

        let err = DispatchError::invalid_params("params must be a JSON object");
        assert_eq!(err.to_string(), "Invalid params: params must be a JSON object");

        let err = DispatchError::adapter("boom");
        assert_eq!(err.to_string(), "Adapter failure: boom");
    }

    #[test]
    fn test_adapter_error_converts_to_failure() {
        let err: DispatchError = AdapterError::prediction("model exploded").into();
        assert_eq!(
            err,
            DispatchError::AdapterFailure("prediction failed: model exploded".to_string())
        );

        let err: DispatchError = AdapterError::Unsupported("embed".to_string()).into();
        assert!(matches!(err, DispatchError::AdapterFailure(_)));
    }

    #[test]
    fn test_client_errors() {
        assert!(DispatchError::model_not_found("x").is_client_error());
        assert!(DispatchError::invalid_params("x").is_client_error());
        assert!(!DispatchError::adapter("x").is_client_error());
        assert!(!DispatchError::Shutdown.is_client_error());
    }
}
