//! infergate core library
//!
//! Batch text-inference dispatching over pluggable, blocking model adapters.
//!
//! The [`Dispatcher`] never recomputes an identical `(model, text, params)`
//! request, bounds concurrent adapter invocations process-wide, and returns
//! results in input order. Two modes are provided:
//!
//! - [`Dispatcher::infer`]: strict, the first failure fails the batch
//! - [`Dispatcher::infer_detailed`]: best-effort, per-item errors are reported
//!
//! ## Example
//!
//! ```no_run
//! use infergate_core::{Adapter, AdapterError, Dispatcher, DispatcherConfig, ModelRegistry, Params};
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//!
//! struct Upper;
//!
//! impl Adapter for Upper {
//!     fn name(&self) -> &str {
//!         "upper"
//!     }
//!
//!     fn predict(&self, inputs: &[String], _params: &Params) -> Result<Vec<Value>, AdapterError> {
//!         Ok(inputs.iter().map(|t| json!(t.to_uppercase())).collect())
//!     }
//! }
//!
//! # async fn run() -> Result<(), infergate_core::DispatchError> {
//! let mut registry = ModelRegistry::new();
//! registry.register(Arc::new(Upper));
//!
//! let dispatcher = Dispatcher::new(registry, DispatcherConfig::default());
//! let out = dispatcher.infer("upper", &["hi".to_string()], None).await?;
//! assert_eq!(out, vec![json!("HI")]);
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod cache;
pub mod dispatcher;
pub mod error;
pub mod flight;
pub mod gate;
pub mod params;
pub mod vector;

pub use adapter::{Adapter, ModelRegistry};
pub use cache::{CacheConfig, CacheCounters, CacheKey, ResultCache};
pub use dispatcher::{
    CacheStats, DetailedBatchResult, DispatchSnapshot, Dispatcher, DispatcherConfig, ItemError,
};
pub use error::{AdapterError, DispatchError};
pub use flight::{Role, SingleFlight};
pub use gate::{ConcurrencyGate, GatePermit};
pub use params::Params;
pub use vector::{UpsertSummary, VectorItem, VectorMatch, VectorStore};
