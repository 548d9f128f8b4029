//! Metrics module for the infergate server
//!
//! Provides Prometheus metrics for monitoring and observability.

pub mod prometheus;

// Re-export commonly used items
pub use prometheus::{
    encode_metrics, record_item_failures, record_items, refresh_dispatch_gauges,
    register_metrics, RequestTimer,
};
