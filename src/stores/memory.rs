//! In-process vector store for tests and offline use.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{PassageRecord, VectorStore};
use crate::embeddings::cosine_similarity;
use crate::types::{ParlorError, Topic};

/// Vector store backed by a process-local map of topic collections.
///
/// Ordering matches the durable backend: cosine similarity, most-similar
/// first. Nothing survives the process; use
/// [`SqlitePassageStore`](super::SqlitePassageStore) for durability.
#[derive(Default)]
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<String, Vec<(PassageRecord, Vec<f32>)>>>,
}

impl MemoryVectorStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn ensure_collection(&self, topic: &Topic) -> Result<(), ParlorError> {
        self.collections
            .write()
            .entry(topic.as_str().to_string())
            .or_default();
        Ok(())
    }

    async fn add(&self, records: Vec<(PassageRecord, Vec<f32>)>) -> Result<(), ParlorError> {
        let mut collections = self.collections.write();
        for (record, vector) in records {
            collections
                .entry(record.topic.clone())
                .or_default()
                .push((record, vector));
        }
        Ok(())
    }

    async fn query(
        &self,
        topic: &Topic,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<(PassageRecord, f32)>, ParlorError> {
        let collections = self.collections.read();
        let Some(rows) = collections.get(topic.as_str()) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<(PassageRecord, f32)> = rows
            .iter()
            .map(|(record, vector)| (record.clone(), cosine_similarity(embedding, vector)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn count(&self, topic: &Topic) -> Result<usize, ParlorError> {
        Ok(self
            .collections
            .read()
            .get(topic.as_str())
            .map_or(0, Vec::len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(topic: &str, content: &str) -> PassageRecord {
        PassageRecord {
            id: uuid::Uuid::new_v4().to_string(),
            topic: topic.to_string(),
            source: "doc.txt".to_string(),
            page: None,
            chunk_index: 0,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn query_ranks_by_similarity() {
        let store = MemoryVectorStore::new();
        let topic = Topic::normalize("t");
        store
            .add(vec![
                (record("t", "far"), vec![0.0, 1.0]),
                (record("t", "near"), vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let results = store.query(&topic, &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(results[0].0.content, "near");
        assert!(results[0].1 > results[1].1);
    }

    #[tokio::test]
    async fn query_respects_k() {
        let store = MemoryVectorStore::new();
        let topic = Topic::normalize("t");
        store
            .add(vec![
                (record("t", "a"), vec![1.0, 0.0]),
                (record("t", "b"), vec![0.9, 0.1]),
                (record("t", "c"), vec![0.0, 1.0]),
            ])
            .await
            .unwrap();
        let results = store.query(&topic, &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let store = MemoryVectorStore::new();
        store
            .add(vec![(record("python", "lists"), vec![1.0])])
            .await
            .unwrap();
        let other = store
            .query(&Topic::normalize("general"), &[1.0], 5)
            .await
            .unwrap();
        assert!(other.is_empty());
    }
}
