//! Retrieval and rerank pipeline: candidate passages in, grounding
//! documents and grouped citations out.
//!
//! [`Retriever::retrieve`] never fails the caller: when the store or the
//! embedder is unreachable it logs and returns empty results, so
//! generation proceeds ungrounded rather than blocking the response. A
//! rerank failure likewise falls back to the embedding order.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chat::Reranker;
use crate::stores::{PassageRecord, TopicStores};
use crate::types::Topic;

/// Fixed candidate count fetched from the store per query.
pub const RETRIEVAL_CANDIDATES: usize = 20;

/// Rerank cut-off applied in streaming mode.
pub const STREAMING_RERANK_TOP_N: usize = 5;

/// How the retrieved documents will be consumed, which decides the rerank
/// cut-off: streaming keeps the top few, batch keeps everything.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetrievalMode {
    /// Token-by-token generation; rerank keeps at most
    /// [`STREAMING_RERANK_TOP_N`] documents.
    Streaming,
    /// One-shot generation; rerank reorders without truncating.
    Batch,
}

/// A retrieved passage shaped for the chat prompt: source title plus
/// cleaned snippet. Rerankers rank on both fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptDoc {
    /// Source path of the passage's document.
    pub title: String,
    /// Passage text with line breaks and non-ASCII symbols stripped.
    pub snippet: String,
}

/// Provenance for one source document: the pages retrieved passages came
/// from, sorted, and the file path to link back to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCitation {
    /// Sorted, deduplicated page numbers; empty when no retrieved passage
    /// of this source carried a page.
    pub pages: Vec<u32>,
    /// Representative path for the source document.
    pub file_path: String,
}

/// Citations grouped by source document, recomputed per query.
///
/// Serializes as a JSON object keyed by source, which is exactly the
/// payload emitted after the stream sentinel — `{}` when nothing was
/// retrieved.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Citations(pub BTreeMap<String, SourceCitation>);

impl Citations {
    /// Groups retrieved passages by source document.
    ///
    /// Passages without a page number do not contribute to the page list
    /// but still establish their source's group.
    #[must_use]
    pub fn group(records: &[PassageRecord]) -> Self {
        let mut grouped: BTreeMap<String, SourceCitation> = BTreeMap::new();
        for record in records {
            let entry = grouped
                .entry(record.source.clone())
                .or_insert_with(|| SourceCitation {
                    pages: Vec::new(),
                    file_path: record.source.clone(),
                });
            if let Some(page) = record.page {
                entry.pages.push(page);
            }
        }
        for citation in grouped.values_mut() {
            citation.pages.sort_unstable();
            citation.pages.dedup();
        }
        Citations(grouped)
    }

    /// `true` when no source contributed any passage.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Strip line breaks and non-ASCII symbols from passage text.
///
/// Line breaks become spaces; anything outside ASCII (bullets, smart
/// quotes) is dropped; the result is trimmed.
#[must_use]
pub fn clean_text(text: &str) -> String {
    text.chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .filter(char::is_ascii)
        .collect::<String>()
        .trim()
        .to_string()
}

/// The retrieval + rerank pipeline over topic stores.
#[derive(Clone)]
pub struct Retriever {
    stores: Arc<TopicStores>,
    reranker: Option<Arc<dyn Reranker>>,
    candidates: usize,
    streaming_top_n: usize,
}

impl Retriever {
    /// Creates a pipeline over `stores` with default candidate count and
    /// streaming cut-off, and no reranker.
    #[must_use]
    pub fn new(stores: Arc<TopicStores>) -> Self {
        Self {
            stores,
            reranker: None,
            candidates: RETRIEVAL_CANDIDATES,
            streaming_top_n: STREAMING_RERANK_TOP_N,
        }
    }

    /// Attaches a reranker.
    #[must_use]
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Overrides the store candidate count.
    #[must_use]
    pub fn with_candidates(mut self, candidates: usize) -> Self {
        self.candidates = candidates.max(1);
        self
    }

    /// Overrides the streaming-mode rerank cut-off.
    #[must_use]
    pub fn with_streaming_top_n(mut self, top_n: usize) -> Self {
        self.streaming_top_n = top_n.max(1);
        self
    }

    /// Retrieve grounding documents and citations for a query.
    ///
    /// Infallible by design: store or embedder failure degrades to empty
    /// results, rerank failure degrades to the embedding order. Either
    /// way the caller can proceed with generation.
    pub async fn retrieve(
        &self,
        topic: &Topic,
        query: &str,
        mode: RetrievalMode,
    ) -> (Vec<PromptDoc>, Citations) {
        let records = match self
            .stores
            .similarity_search(topic, query, self.candidates)
            .await
        {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(topic = %topic, error = %err, "retrieval unavailable, proceeding ungrounded");
                return (Vec::new(), Citations::default());
            }
        };

        if records.is_empty() {
            return (Vec::new(), Citations::default());
        }

        for record in &records {
            tracing::debug!(
                topic = %topic,
                source = %record.source,
                page = ?record.page,
                chunk_index = record.chunk_index,
                "retrieved passage"
            );
        }

        let prompt_docs: Vec<PromptDoc> = records
            .iter()
            .map(|record| PromptDoc {
                title: record.source.clone(),
                snippet: clean_text(&record.content),
            })
            .collect();
        let citations = Citations::group(&records);

        let Some(reranker) = &self.reranker else {
            return (prompt_docs, citations);
        };

        let top_n = match mode {
            RetrievalMode::Streaming => Some(self.streaming_top_n),
            RetrievalMode::Batch => None,
        };
        match reranker.rerank(query, prompt_docs.clone(), top_n).await {
            Ok(reordered) => (reordered, citations),
            Err(err) => {
                tracing::warn!(error = %err, "rerank failed, falling back to embedding order");
                (prompt_docs, citations)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbeddingProvider;
    use crate::stores::{MemoryVectorStore, VectorStore};
    use crate::types::ParlorError;
    use async_trait::async_trait;

    fn record(source: &str, page: Option<u32>, content: &str) -> PassageRecord {
        PassageRecord {
            id: uuid::Uuid::new_v4().to_string(),
            topic: "t".to_string(),
            source: source.to_string(),
            page,
            chunk_index: 0,
            content: content.to_string(),
        }
    }

    #[test]
    fn clean_text_strips_breaks_and_non_ascii() {
        assert_eq!(clean_text("line one\nline two\r\nend"), "line one line two  end");
        assert_eq!(clean_text("\u{2022} bullet \u{2014} dash"), "bullet  dash");
        assert_eq!(clean_text("  padded  "), "padded");
    }

    #[test]
    fn citations_group_by_source_with_sorted_pages() {
        let records = vec![
            record("docA", Some(2), "x"),
            record("docA", Some(1), "y"),
            record("docB", None, "z"),
        ];
        let citations = Citations::group(&records);
        assert_eq!(citations.0.len(), 2);
        assert_eq!(citations.0["docA"].pages, vec![1, 2]);
        assert!(citations.0["docB"].pages.is_empty());
        assert_eq!(citations.0["docB"].file_path, "docB");
    }

    #[test]
    fn citations_dedup_repeated_pages() {
        let records = vec![record("docA", Some(3), "x"), record("docA", Some(3), "y")];
        let citations = Citations::group(&records);
        assert_eq!(citations.0["docA"].pages, vec![3]);
    }

    #[test]
    fn citations_serialize_as_plain_object() {
        let citations = Citations::group(&[record("docA", Some(1), "x")]);
        let json = serde_json::to_value(&citations).unwrap();
        assert_eq!(json["docA"]["pages"], serde_json::json!([1]));
        let empty = serde_json::to_value(Citations::default()).unwrap();
        assert_eq!(empty, serde_json::json!({}));
    }

    struct BrokenStore;

    #[async_trait]
    impl VectorStore for BrokenStore {
        async fn ensure_collection(&self, _topic: &Topic) -> Result<(), ParlorError> {
            Err(ParlorError::Storage("down".to_string()))
        }
        async fn add(&self, _records: Vec<(PassageRecord, Vec<f32>)>) -> Result<(), ParlorError> {
            Err(ParlorError::Storage("down".to_string()))
        }
        async fn query(
            &self,
            _topic: &Topic,
            _embedding: &[f32],
            _k: usize,
        ) -> Result<Vec<(PassageRecord, f32)>, ParlorError> {
            Err(ParlorError::Storage("down".to_string()))
        }
        async fn count(&self, _topic: &Topic) -> Result<usize, ParlorError> {
            Err(ParlorError::Storage("down".to_string()))
        }
    }

    #[tokio::test]
    async fn unavailable_store_degrades_to_empty_results() {
        let stores = Arc::new(TopicStores::new(
            Arc::new(BrokenStore),
            Arc::new(HashEmbeddingProvider::new(8)),
        ));
        let retriever = Retriever::new(stores);
        let (docs, citations) = retriever
            .retrieve(&Topic::normalize("t"), "query", RetrievalMode::Streaming)
            .await;
        assert!(docs.is_empty());
        assert!(citations.is_empty());
    }

    struct ReversingReranker;

    #[async_trait]
    impl Reranker for ReversingReranker {
        async fn rerank(
            &self,
            _query: &str,
            mut candidates: Vec<PromptDoc>,
            top_n: Option<usize>,
        ) -> Result<Vec<PromptDoc>, ParlorError> {
            candidates.reverse();
            if let Some(n) = top_n {
                candidates.truncate(n);
            }
            Ok(candidates)
        }
    }

    #[tokio::test]
    async fn streaming_mode_caps_reranked_documents() {
        let stores = Arc::new(TopicStores::new(
            Arc::new(MemoryVectorStore::new()),
            Arc::new(HashEmbeddingProvider::new(32)),
        ));
        let topic = Topic::normalize("t");
        let passages: Vec<crate::ingestion::Passage> = (0..8)
            .map(|i| crate::ingestion::Passage {
                content: format!("passage number {i} about lists"),
                source: "doc.txt".to_string(),
                page: None,
                chunk_index: i,
            })
            .collect();
        stores.add_passages(&topic, passages).await.unwrap();

        let retriever = Retriever::new(stores)
            .with_reranker(Arc::new(ReversingReranker))
            .with_streaming_top_n(3);

        let (streaming_docs, _) = retriever
            .retrieve(&topic, "lists", RetrievalMode::Streaming)
            .await;
        assert_eq!(streaming_docs.len(), 3);

        let (batch_docs, _) = retriever.retrieve(&topic, "lists", RetrievalMode::Batch).await;
        assert_eq!(batch_docs.len(), 8);
    }
}
