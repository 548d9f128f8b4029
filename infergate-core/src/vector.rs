//! In-memory vector store with namespaces and linear-scan cosine search.
//!
//! Entries keep insertion order within a namespace. An upsert whose `id`
//! already exists replaces that entry in place; entries without an id are
//! always appended.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Norm floor used when a vector has zero length
const NORM_EPSILON: f32 = 1e-12;

/// An item to store, already embedded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorItem {
    pub id: Option<String>,
    pub text: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone)]
struct StoredVector {
    id: Option<String>,
    text: String,
    vector: Vec<f32>,
    metadata: Map<String, Value>,
    /// Unix seconds of the last write
    updated_at: u64,
}

/// Result of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub added: usize,
    pub updated: usize,
    /// Namespace size after the upsert
    pub size: usize,
}

/// A scored query match
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorMatch {
    pub id: Option<String>,
    pub text: String,
    pub score: f32,
    pub metadata: Map<String, Value>,
}

/// Cosine similarity of two vectors. Zero-norm vectors score 0 instead of NaN.
///
/// Vectors of different lengths are compared over their common prefix.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm = |v: &[f32]| {
        let n = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if n == 0.0 {
            NORM_EPSILON
        } else {
            n
        }
    };
    dot / (norm(a) * norm(b))
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Namespaced vector store
#[derive(Debug, Default)]
pub struct VectorStore {
    namespaces: HashMap<String, Vec<StoredVector>>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace items in `namespace`
    pub fn upsert(&mut self, namespace: &str, items: Vec<VectorItem>) -> UpsertSummary {
        let entries = self.namespaces.entry(namespace.to_string()).or_default();
        let now = now_secs();

        let mut positions: HashMap<String, usize> = entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.id.clone().map(|id| (id, i)))
            .collect();

        let mut added = 0;
        let mut updated = 0;

        for item in items {
            let stored = StoredVector {
                id: item.id,
                text: item.text,
                vector: item.vector,
                metadata: item.metadata,
                updated_at: now,
            };

            match stored.id.as_ref().and_then(|id| positions.get(id)).copied() {
                Some(pos) => {
                    entries[pos] = stored;
                    updated += 1;
                }
                None => {
                    if let Some(id) = &stored.id {
                        positions.insert(id.clone(), entries.len());
                    }
                    entries.push(stored);
                    added += 1;
                }
            }
        }

        debug!(namespace, added, updated, size = entries.len(), "Vector upsert");

        UpsertSummary {
            added,
            updated,
            size: entries.len(),
        }
    }

    /// Top `top_k` entries of `namespace` by descending cosine similarity
    pub fn query(&self, namespace: &str, vector: &[f32], top_k: usize) -> Vec<VectorMatch> {
        let Some(entries) = self.namespaces.get(namespace) else {
            return Vec::new();
        };

        let mut scored: Vec<VectorMatch> = entries
            .iter()
            .map(|e| VectorMatch {
                id: e.id.clone(),
                text: e.text.clone(),
                score: cosine(vector, &e.vector),
                metadata: e.metadata.clone(),
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        scored
    }

    /// Number of entries in `namespace`
    pub fn len(&self, namespace: &str) -> usize {
        self.namespaces.get(namespace).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, namespace: &str) -> bool {
        self.len(namespace) == 0
    }

    /// Namespaces with at least one entry, sorted
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .namespaces
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, _)| k.clone())
            .collect();
        names.sort();
        names
    }

    /// Unix seconds of the most recent write to `namespace`
    pub fn last_updated(&self, namespace: &str) -> Option<u64> {
        self.namespaces
            .get(namespace)?
            .iter()
            .map(|e| e.updated_at)
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: Option<&str>, text: &str, vector: Vec<f32>) -> VectorItem {
        VectorItem {
            id: id.map(str::to_string),
            text: text.to_string(),
            vector,
            metadata: Map::new(),
        }
    }

    #[test]
    fn test_cosine() {
        assert!((cosine(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_upsert_adds_and_replaces() {
        let mut store = VectorStore::new();

        let summary = store.upsert(
            "docs",
            vec![
                item(Some("a"), "apple", vec![1.0, 0.0]),
                item(Some("b"), "banana", vec![0.0, 1.0]),
            ],
        );
        assert_eq!(summary, UpsertSummary { added: 2, updated: 0, size: 2 });

        let summary = store.upsert("docs", vec![item(Some("a"), "apricot", vec![0.5, 0.5])]);
        assert_eq!(summary, UpsertSummary { added: 0, updated: 1, size: 2 });

        let matches = store.query("docs", &[0.5, 0.5], 1);
        assert_eq!(matches[0].text, "apricot");
    }

    #[test]
    fn test_upsert_without_id_appends() {
        let mut store = VectorStore::new();
        store.upsert("docs", vec![item(None, "one", vec![1.0])]);
        let summary = store.upsert("docs", vec![item(None, "two", vec![1.0])]);
        assert_eq!(summary.added, 1);
        assert_eq!(store.len("docs"), 2);
    }

    #[test]
    fn test_duplicate_ids_in_one_upsert() {
        let mut store = VectorStore::new();
        let summary = store.upsert(
            "docs",
            vec![item(Some("x"), "first", vec![1.0]), item(Some("x"), "second", vec![1.0])],
        );
        assert_eq!(summary, UpsertSummary { added: 1, updated: 1, size: 1 });
        assert_eq!(store.query("docs", &[1.0], 5)[0].text, "second");
    }

    #[test]
    fn test_query_orders_by_similarity() {
        let mut store = VectorStore::new();
        store.upsert(
            "docs",
            vec![
                item(Some("far"), "far", vec![-1.0, 0.0]),
                item(Some("near"), "near", vec![1.0, 0.1]),
                item(Some("mid"), "mid", vec![0.0, 1.0]),
            ],
        );

        let matches = store.query("docs", &[1.0, 0.0], 2);
        let ids: Vec<_> = matches.iter().map(|m| m.id.as_deref()).collect();
        assert_eq!(ids, vec![Some("near"), Some("mid")]);
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let mut store = VectorStore::new();
        store.upsert("a", vec![item(Some("1"), "x", vec![1.0])]);

        assert!(store.query("b", &[1.0], 5).is_empty());
        assert!(store.is_empty("b"));
        assert_eq!(store.namespaces(), vec!["a".to_string()]);
        assert!(store.last_updated("a").is_some());
    }
}
