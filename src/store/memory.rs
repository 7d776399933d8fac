//! In-memory [`VectorStore`] implementation.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`. Queries are
//! brute-force cosine similarity over every record that passes the filter.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use async_trait::async_trait;

use super::{matches_filter, MetadataFilter, VectorMatch, VectorRecord, VectorStore};
use crate::embedding::cosine_similarity;

/// In-memory vector store for tests and single-process use.
pub struct InMemoryVectorStore {
    records: RwLock<Vec<VectorRecord>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.is_empty())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<VectorRecord>>> {
        self.records
            .read()
            .map_err(|_| anyhow::anyhow!("vector store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<VectorRecord>>> {
        self.records
            .write()
            .map_err(|_| anyhow::anyhow!("vector store lock poisoned"))
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add(&self, records: Vec<VectorRecord>) -> Result<()> {
        let mut stored = self.write()?;
        for record in records {
            stored.retain(|existing| existing.id != record.id);
            stored.push(record);
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>> {
        let stored = self.read()?;
        let mut matches: Vec<VectorMatch> = stored
            .iter()
            .filter(|record| matches_filter(&record.metadata, filter))
            .map(|record| VectorMatch {
                id: record.id.clone(),
                score: cosine_similarity(vector, &record.vector),
                metadata: record.metadata.clone(),
                document: record.document.clone(),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(k);
        Ok(matches)
    }

    async fn get(&self, filter: Option<&MetadataFilter>) -> Result<Vec<String>> {
        let stored = self.read()?;
        Ok(stored
            .iter()
            .filter(|record| matches_filter(&record.metadata, filter))
            .map(|record| record.id.clone())
            .collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut stored = self.write()?;
        stored.retain(|record| !ids.contains(&record.id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};

    fn record(id: &str, vector: Vec<f32>, template: &str) -> VectorRecord {
        let mut metadata = Map::new();
        metadata.insert("template".to_string(), Value::from(template));
        VectorRecord {
            id: id.to_string(),
            vector,
            metadata,
            document: format!("text of {}", id),
        }
    }

    fn template_filter(name: &str) -> MetadataFilter {
        let mut filter = Map::new();
        filter.insert("template".to_string(), json!(name));
        filter
    }

    #[tokio::test]
    async fn test_query_ranks_by_similarity() {
        let store = InMemoryVectorStore::new();
        store
            .add(vec![
                record("far", vec![0.0, 1.0], "lease"),
                record("near", vec![1.0, 0.1], "lease"),
                record("exact", vec![1.0, 0.0], "lease"),
            ])
            .await
            .unwrap();

        let matches = store.query(&[1.0, 0.0], 2, None).await.unwrap();
        let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "near"]);
        assert!((matches[0].score - 1.0).abs() < 1e-6);
        assert_eq!(matches[0].document, "text of exact");
    }

    #[tokio::test]
    async fn test_query_applies_filter() {
        let store = InMemoryVectorStore::new();
        store
            .add(vec![
                record("a", vec![1.0, 0.0], "lease"),
                record("b", vec![1.0, 0.0], "deed"),
            ])
            .await
            .unwrap();

        let matches = store
            .query(&[1.0, 0.0], 10, Some(&template_filter("deed")))
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "b");
    }

    #[tokio::test]
    async fn test_add_replaces_same_id() {
        let store = InMemoryVectorStore::new();
        store.add(vec![record("a", vec![1.0], "lease")]).await.unwrap();
        store.add(vec![record("a", vec![2.0], "deed")]).await.unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(
            store.get(Some(&template_filter("deed"))).await.unwrap(),
            vec!["a"]
        );
    }

    #[tokio::test]
    async fn test_get_and_delete() {
        let store = InMemoryVectorStore::new();
        store
            .add(vec![
                record("a", vec![1.0], "lease"),
                record("b", vec![1.0], "lease"),
                record("c", vec![1.0], "deed"),
            ])
            .await
            .unwrap();

        let lease_ids = store.get(Some(&template_filter("lease"))).await.unwrap();
        assert_eq!(lease_ids, vec!["a", "b"]);

        store
            .delete(&[lease_ids[0].clone(), "unknown".to_string()])
            .await
            .unwrap();
        assert_eq!(store.get(None).await.unwrap(), vec!["b", "c"]);
        assert!(!store.is_empty().unwrap());
    }
}
