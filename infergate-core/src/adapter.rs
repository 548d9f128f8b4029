//! Model adapter capability and the name → adapter registry.
//!
//! Adapters are black boxes: a blocking `predict` that maps an ordered list of
//! inputs to one result record per input. The dispatcher always runs them on
//! a blocking worker thread while holding a gate permit.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AdapterError, DispatchError};
use crate::params::Params;

/// A model-serving capability
pub trait Adapter: Send + Sync {
    /// Name the adapter is registered under
    fn name(&self) -> &str;

    /// Predict one result record per input, in input order.
    ///
    /// This call may block for a long time; it is never invoked on an async
    /// executor thread.
    fn predict(&self, inputs: &[String], params: &Params) -> Result<Vec<Value>, AdapterError>;

    /// Embed each input as a dense vector
    fn embed(&self, _inputs: &[String]) -> Result<Vec<Vec<f32>>, AdapterError> {
        Err(AdapterError::Unsupported("embed".to_string()))
    }
}

/// Mapping from model name to adapter
#[derive(Default, Clone)]
pub struct ModelRegistry {
    adapters: HashMap<String, Arc<dyn Adapter>>,
}

impl ModelRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own name, replacing any previous one
    pub fn register(&mut self, adapter: Arc<dyn Adapter>) {
        let name = adapter.name().to_string();
        if self.adapters.insert(name.clone(), adapter).is_some() {
            tracing::warn!(model = %name, "Replaced previously registered adapter");
        } else {
            tracing::debug!(model = %name, "Registered adapter");
        }
    }

    /// Look up the adapter for `model`
    pub fn resolve(&self, model: &str) -> Result<Arc<dyn Adapter>, DispatchError> {
        self.adapters
            .get(model)
            .cloned()
            .ok_or_else(|| DispatchError::model_not_found(model))
    }

    /// Registered model names, sorted
    pub fn list_models(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, model: &str) -> bool {
        self.adapters.contains_key(model)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.list_models())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Upper;

    impl Adapter for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn predict(&self, inputs: &[String], _params: &Params) -> Result<Vec<Value>, AdapterError> {
            Ok(inputs.iter().map(|t| json!({"text": t.to_uppercase()})).collect())
        }
    }

    #[test]
    fn test_resolve_registered() {
        let mut registry = ModelRegistry::new();
        registry.register(Arc::new(Upper));

        let adapter = registry.resolve("upper").unwrap();
        let out = adapter
            .predict(&["abc".to_string()], &Params::new())
            .unwrap();
        assert_eq!(out, vec![json!({"text": "ABC"})]);
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = ModelRegistry::new();
        let err = registry.resolve("translate").err().unwrap();
        assert_eq!(err, DispatchError::ModelNotFound("translate".to_string()));
    }

    #[test]
    fn test_list_models_sorted() {
        struct Named(&'static str);
        impl Adapter for Named {
            fn name(&self) -> &str {
                self.0
            }
            fn predict(&self, inputs: &[String], _: &Params) -> Result<Vec<Value>, AdapterError> {
                Ok(vec![Value::Null; inputs.len()])
            }
        }

        let mut registry = ModelRegistry::new();
        registry.register(Arc::new(Named("translate")));
        registry.register(Arc::new(Named("sentiment")));
        registry.register(Arc::new(Named("summarize")));

        assert_eq!(registry.list_models(), vec!["sentiment", "summarize", "translate"]);
        assert_eq!(registry.len(), 3);
        assert!(registry.contains("sentiment"));
    }

    #[test]
    fn test_embed_unsupported_by_default() {
        let err = Upper.embed(&["x".to_string()]).unwrap_err();
        assert!(matches!(err, AdapterError::Unsupported(_)));
    }
}
