//! Result types returned by the dispatcher.

use serde::Serialize;
use serde_json::Value;

use crate::cache::CacheCounters;

/// Per-item failure in a detailed batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemError {
    /// Position of the failed input in the batch
    pub index: usize,
    /// The failed input text
    pub text: String,
    /// Failure message
    pub error: String,
}

/// Best-effort batch result: partial outputs plus a per-item error list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedBatchResult {
    pub model: String,
    /// Number of inputs
    pub total: usize,
    pub success: usize,
    pub fail: usize,
    /// One slot per input; `None` where the item failed
    pub outputs: Vec<Option<Value>>,
    pub errors: Vec<ItemError>,
}

impl DetailedBatchResult {
    pub(crate) fn empty(model: &str) -> Self {
        Self {
            model: model.to_string(),
            total: 0,
            success: 0,
            fail: 0,
            outputs: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// True when every item succeeded
    pub fn is_complete(&self) -> bool {
        self.fail == 0
    }
}

/// Read-only view of the result cache
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub item_count: usize,
    pub sample_keys: Vec<String>,
    /// Keys currently being computed
    pub in_flight: usize,
    pub max_concurrency: usize,
    pub available_permits: usize,
    pub counters: CacheCounters,
}
