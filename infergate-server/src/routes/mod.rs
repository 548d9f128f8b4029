//! HTTP route handlers for the infergate server.
//!
//! This module organizes all route handlers:
//! - `health`: health checks, metrics and cache administration
//! - `infer`: batch inference, embeddings and model listing
//! - `upload`: batch inference over uploaded CSV or JSON files
//! - `vectors`: vector store upsert and query

pub mod health;
pub mod infer;
pub mod upload;
pub mod vectors;

// Re-export handlers for convenience
pub use health::{clear_cache, health, live, metrics, metrics_prometheus, ready};
pub use infer::{embeddings, infer, infer_detail, list_models};
pub use upload::{upload_infer, upload_infer_csv};
pub use vectors::{query as vec_query, upsert as vec_upsert};
