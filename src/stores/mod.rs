//! Storage backends for embedded passages, keyed by topic.
//!
//! A [`VectorStore`] holds append-only collections of embedded passages,
//! one collection per [`Topic`]. Two backends are provided:
//!
//! * [`sqlite::SqlitePassageStore`] — durable storage with vector search
//!   via `sqlite-vec`; survives process restarts.
//! * [`memory::MemoryVectorStore`] — in-process storage for tests and
//!   offline use.
//!
//! [`TopicStores`] couples a backend with an [`EmbeddingProvider`] and is
//! what the rest of the crate talks to: it embeds on insert and on query,
//! and treats an absent or empty topic as "no results" rather than an
//! error, so retrieval can degrade gracefully.

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::embeddings::EmbeddingProvider;
use crate::ingestion::Passage;
use crate::types::{ParlorError, Topic};

pub use memory::MemoryVectorStore;
pub use sqlite::SqlitePassageStore;

/// A stored passage row: passage fields plus the owning topic and id.
///
/// Backend-agnostic; each backend maps this onto its own schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PassageRecord {
    /// Unique identifier for this row.
    pub id: String,
    /// Normalized topic the passage belongs to.
    pub topic: String,
    /// Source path of the originating document.
    pub source: String,
    /// Page number within the source, when known.
    pub page: Option<u32>,
    /// Position of the passage within its document.
    pub chunk_index: usize,
    /// The passage text.
    pub content: String,
}

impl PassageRecord {
    /// Builds a record for a passage under a topic, with a fresh id.
    #[must_use]
    pub fn from_passage(topic: &Topic, passage: Passage) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            topic: topic.as_str().to_string(),
            source: passage.source,
            page: passage.page,
            chunk_index: passage.chunk_index,
            content: passage.content,
        }
    }
}

/// Unified trait for passage storage backends.
///
/// Collections are append-only: there is no update or delete in the data
/// model. `query` returns results most-similar first.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection for a topic if it does not exist. Idempotent.
    async fn ensure_collection(&self, topic: &Topic) -> Result<(), ParlorError>;

    /// Append records with their embeddings.
    async fn add(&self, records: Vec<(PassageRecord, Vec<f32>)>) -> Result<(), ParlorError>;

    /// Return up to `k` records nearest to `embedding` within a topic,
    /// most-similar first, each with its similarity score. An absent or
    /// empty collection yields an empty result, not an error.
    async fn query(
        &self,
        topic: &Topic,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<(PassageRecord, f32)>, ParlorError>;

    /// Number of records stored under a topic.
    async fn count(&self, topic: &Topic) -> Result<usize, ParlorError>;
}

/// Per-topic passage collections with embedding on insert and query.
#[derive(Clone)]
pub struct TopicStores {
    backend: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl TopicStores {
    /// Couples a storage backend with an embedding provider.
    #[must_use]
    pub fn new(backend: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { backend, embedder }
    }

    /// Ensure the collection for `topic` exists. Idempotent.
    pub async fn ensure(&self, topic: &Topic) -> Result<(), ParlorError> {
        self.backend.ensure_collection(topic).await
    }

    /// Embed and append passages under a topic.
    ///
    /// Returns the number of records written. No deduplication happens
    /// here: re-ingesting the same document appends duplicate passages.
    /// The store is append-only and has no identity for passage content,
    /// so the duplicates accumulate — a known gap in the data model.
    pub async fn add_passages(
        &self,
        topic: &Topic,
        passages: Vec<Passage>,
    ) -> Result<usize, ParlorError> {
        if passages.is_empty() {
            return Ok(0);
        }
        self.ensure(topic).await?;

        let texts: Vec<String> = passages.iter().map(|p| p.content.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        let records: Vec<(PassageRecord, Vec<f32>)> = passages
            .into_iter()
            .zip(vectors)
            .map(|(passage, vector)| (PassageRecord::from_passage(topic, passage), vector))
            .collect();
        let written = records.len();

        self.backend.add(records).await?;
        tracing::info!(topic = %topic, records = written, "passages stored");
        Ok(written)
    }

    /// Embed `query` and return up to `k` nearest passages, most-similar
    /// first. Absent or empty topics yield an empty result.
    pub async fn similarity_search(
        &self,
        topic: &Topic,
        query: &str,
        k: usize,
    ) -> Result<Vec<PassageRecord>, ParlorError> {
        let embedding = self.embedder.embed(query).await?;
        let ranked = self.backend.query(topic, &embedding, k).await?;
        Ok(ranked.into_iter().map(|(record, _score)| record).collect())
    }

    /// Number of passages stored under a topic.
    pub async fn count(&self, topic: &Topic) -> Result<usize, ParlorError> {
        self.backend.count(topic).await
    }
}
