//! Integration tests for the retrieval + rerank pipeline over the
//! in-memory store with deterministic embeddings.

use std::sync::Arc;

use parlor::embeddings::HashEmbeddingProvider;
use parlor::ingestion::{Document, TextChunker};
use parlor::providers::MockReranker;
use parlor::retrieval::{RetrievalMode, Retriever};
use parlor::stores::{MemoryVectorStore, TopicStores};
use parlor::types::Topic;

fn topic_stores() -> Arc<TopicStores> {
    Arc::new(TopicStores::new(
        Arc::new(MemoryVectorStore::new()),
        Arc::new(HashEmbeddingProvider::new(128)),
    ))
}

#[tokio::test]
async fn verbatim_content_is_recalled_in_top_k() {
    let stores = topic_stores();
    let topic = Topic::normalize("python");
    let chunker = TextChunker::new(200);

    let documents = vec![
        Document::new(
            "A list is an ordered, mutable collection of items in Python.",
            "lists.txt",
        ),
        Document::new(
            "The global interpreter lock serializes bytecode execution.",
            "gil.txt",
        ),
        Document::new(
            "Decorators wrap callables to extend their behavior.",
            "decorators.txt",
        ),
    ];
    stores
        .add_passages(&topic, chunker.split(&documents))
        .await
        .unwrap();

    // Querying with a document's own verbatim content must surface that
    // document among the top results.
    let results = stores
        .similarity_search(
            &topic,
            "A list is an ordered, mutable collection of items in Python.",
            3,
        )
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].source, "lists.txt");
}

#[tokio::test]
async fn pipeline_groups_citations_by_source() {
    let stores = topic_stores();
    let topic = Topic::normalize("manuals");
    let chunker = TextChunker::new(500);

    let documents = vec![
        Document::with_page("Router setup begins with the admin panel.", "router.pdf", 1),
        Document::with_page("Firmware updates are listed in settings.", "router.pdf", 2),
        Document::new("Warranty terms apply for two years.", "warranty.txt"),
    ];
    stores
        .add_passages(&topic, chunker.split(&documents))
        .await
        .unwrap();

    let retriever = Retriever::new(stores);
    let (docs, citations) = retriever
        .retrieve(&topic, "router setup", RetrievalMode::Batch)
        .await;

    assert!(!docs.is_empty());
    assert_eq!(citations.0.len(), 2);
    assert_eq!(citations.0["router.pdf"].pages, vec![1, 2]);
    assert!(citations.0["warranty.txt"].pages.is_empty());
    assert_eq!(citations.0["warranty.txt"].file_path, "warranty.txt");
}

#[tokio::test]
async fn prompt_docs_are_cleaned_for_the_backend() {
    let stores = topic_stores();
    let topic = Topic::normalize("notes");
    stores
        .add_passages(
            &topic,
            TextChunker::new(500).split(&[Document::new(
                "line one\nline two \u{2022} bullet",
                "notes.txt",
            )]),
        )
        .await
        .unwrap();

    let retriever = Retriever::new(stores);
    let (docs, _) = retriever
        .retrieve(&topic, "line one", RetrievalMode::Batch)
        .await;
    assert_eq!(docs[0].snippet, "line one line two  bullet");
    assert_eq!(docs[0].title, "notes.txt");
}

#[tokio::test]
async fn rerank_output_is_a_permutation_of_its_input() {
    let stores = topic_stores();
    let topic = Topic::normalize("python");
    let chunker = TextChunker::new(200);

    let documents: Vec<Document> = (0..6)
        .map(|i| {
            Document::new(
                format!("Chapter {i} talks about iterators and generators."),
                format!("chapter{i}.txt"),
            )
        })
        .collect();
    stores
        .add_passages(&topic, chunker.split(&documents))
        .await
        .unwrap();

    let plain = Retriever::new(stores.clone());
    let (unranked, _) = plain
        .retrieve(&topic, "iterators", RetrievalMode::Batch)
        .await;

    let reranked_retriever = Retriever::new(stores).with_reranker(Arc::new(MockReranker::new()));
    let (reranked, _) = reranked_retriever
        .retrieve(&topic, "iterators", RetrievalMode::Batch)
        .await;

    // Same candidate set, possibly different order.
    assert_eq!(reranked.len(), unranked.len());
    for doc in &reranked {
        assert!(unranked.contains(doc));
    }

    // Streaming mode caps the reranked set.
    let streaming_retriever =
        Retriever::new(topic_stores()).with_reranker(Arc::new(MockReranker::new()));
    let (empty_docs, _) = streaming_retriever
        .retrieve(&topic, "iterators", RetrievalMode::Streaming)
        .await;
    assert!(empty_docs.is_empty(), "fresh store has nothing to rerank");
}

#[tokio::test]
async fn streaming_rerank_respects_top_n() {
    let stores = topic_stores();
    let topic = Topic::normalize("python");
    let documents: Vec<Document> = (0..8)
        .map(|i| Document::new(format!("Note {i} about slicing."), format!("note{i}.txt")))
        .collect();
    stores
        .add_passages(&topic, TextChunker::new(200).split(&documents))
        .await
        .unwrap();

    let retriever = Retriever::new(stores).with_reranker(Arc::new(MockReranker::new()));
    let (docs, _) = retriever
        .retrieve(&topic, "slicing", RetrievalMode::Streaming)
        .await;
    assert!(docs.len() <= 5);
}

#[tokio::test]
async fn empty_topic_yields_empty_results() {
    let retriever = Retriever::new(topic_stores());
    let (docs, citations) = retriever
        .retrieve(&Topic::normalize("python"), "anything", RetrievalMode::Streaming)
        .await;
    assert!(docs.is_empty());
    assert!(citations.is_empty());
}
