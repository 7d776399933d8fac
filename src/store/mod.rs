//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the contract the indexer needs from a
//! vector database: add records, rank them against a query vector, list ids
//! matching a metadata filter, and delete by id. The wire protocol of any
//! particular database stays behind an implementation of this trait.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

/// Equality filter over record metadata: every key must be present with an
/// equal value.
pub type MetadataFilter = Map<String, Value>;

/// One stored embedding with its metadata and source text.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: Map<String, Value>,
    /// The text that was embedded.
    pub document: String,
}

/// A ranked query result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorMatch {
    pub id: String,
    /// Cosine similarity to the query vector.
    pub score: f32,
    pub metadata: Map<String, Value>,
    pub document: String,
}

/// Abstract vector storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add`](VectorStore::add) | Insert records, replacing any with the same id |
/// | [`query`](VectorStore::query) | Top-`k` records by similarity, optionally filtered |
/// | [`get`](VectorStore::get) | Ids of records matching a filter |
/// | [`delete`](VectorStore::delete) | Remove records by id |
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn add(&self, records: Vec<VectorRecord>) -> Result<()>;

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>>;

    async fn get(&self, filter: Option<&MetadataFilter>) -> Result<Vec<String>>;

    async fn delete(&self, ids: &[String]) -> Result<()>;
}

/// Whether `metadata` satisfies `filter`. No filter matches everything.
pub fn matches_filter(metadata: &Map<String, Value>, filter: Option<&MetadataFilter>) -> bool {
    match filter {
        None => true,
        Some(filter) => filter
            .iter()
            .all(|(key, expected)| metadata.get(key) == Some(expected)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_no_filter_matches() {
        assert!(matches_filter(&map(json!({ "a": 1 })), None));
    }

    #[test]
    fn test_filter_requires_all_keys_equal() {
        let metadata = map(json!({ "template": "lease", "startLine": 1 }));
        assert!(matches_filter(&metadata, Some(&map(json!({ "template": "lease" })))));
        assert!(!matches_filter(&metadata, Some(&map(json!({ "template": "deed" })))));
        assert!(!matches_filter(
            &metadata,
            Some(&map(json!({ "template": "lease", "missing": true })))
        ));
    }
}
