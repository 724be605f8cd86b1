//! Exercises the hosted chat/rerank client against a local mock server.

use futures_util::StreamExt;
use httpmock::prelude::*;
use url::Url;

use parlor::chat::{ChatBackend, ChatEvent, ChatRequest, Reranker};
use parlor::message::ChatTurn;
use parlor::providers::{CohereClient, CohereConfig};
use parlor::retrieval::PromptDoc;
use parlor::types::ParlorError;

fn client_for(server: &MockServer) -> CohereClient {
    let mut config = CohereConfig::new("test-key").unwrap();
    config.base_url = Url::parse(&server.base_url()).unwrap();
    CohereClient::new(config).unwrap()
}

#[tokio::test]
async fn batch_chat_returns_the_response_text() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat");
            then.status(200)
                .json_body(serde_json::json!({"text": "<p>hello</p>"}));
        })
        .await;

    let client = client_for(&server);
    let request = ChatRequest::new("prompt").with_history(vec![
        ChatTurn::user("earlier question"),
        ChatTurn::assistant("earlier answer"),
    ]);
    let text = client.chat(request).await.unwrap();

    assert_eq!(text, "<p>hello</p>");
    mock.assert_async().await;
}

#[tokio::test]
async fn streaming_chat_yields_tokens_then_stream_end() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat");
            then.status(200).body(concat!(
                "{\"event_type\":\"text-generation\",\"text\":\"Hel\"}\n",
                "{\"event_type\":\"text-generation\",\"text\":\"lo\"}\n",
                "{\"event_type\":\"stream-end\"}\n",
            ));
        })
        .await;

    let client = client_for(&server);
    let mut stream = client.chat_stream(ChatRequest::new("prompt")).await.unwrap();

    let mut text = String::new();
    let mut saw_end = false;
    while let Some(event) = stream.next().await {
        match event.unwrap() {
            ChatEvent::Token(token) => text.push_str(&token),
            ChatEvent::StreamEnd => saw_end = true,
        }
    }
    assert_eq!(text, "Hello");
    assert!(saw_end);
}

#[tokio::test]
async fn bad_request_maps_to_invalid_history() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat");
            then.status(400)
                .body("invalid request: chat history is malformed");
        })
        .await;

    let client = client_for(&server);
    let err = match client.chat_stream(ChatRequest::new("prompt")).await {
        Ok(_) => panic!("expected chat_stream to fail"),
        Err(err) => err,
    };
    assert!(matches!(err, ParlorError::InvalidHistory));
}

#[tokio::test]
async fn server_errors_are_terminal_backend_failures() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat");
            then.status(503).body("overloaded");
        })
        .await;

    let client = client_for(&server);
    let err = client.chat(ChatRequest::new("prompt")).await.unwrap_err();
    assert!(matches!(err, ParlorError::Backend(_)));
}

#[tokio::test]
async fn rerank_reorders_by_returned_indices() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/rerank");
            then.status(200).json_body(serde_json::json!({
                "results": [
                    {"index": 2, "relevance_score": 0.9},
                    {"index": 0, "relevance_score": 0.4}
                ]
            }));
        })
        .await;

    let client = client_for(&server);
    let candidates = vec![
        PromptDoc {
            title: "a".to_string(),
            snippet: "first".to_string(),
        },
        PromptDoc {
            title: "b".to_string(),
            snippet: "second".to_string(),
        },
        PromptDoc {
            title: "c".to_string(),
            snippet: "third".to_string(),
        },
    ];

    let reranked = client
        .rerank("query", candidates.clone(), Some(2))
        .await
        .unwrap();
    assert_eq!(reranked.len(), 2);
    assert_eq!(reranked[0].title, "c");
    assert_eq!(reranked[1].title, "a");
    for doc in &reranked {
        assert!(candidates.contains(doc));
    }
}

#[tokio::test]
async fn empty_candidates_skip_the_rerank_call() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/rerank");
            then.status(200).json_body(serde_json::json!({"results": []}));
        })
        .await;

    let client = client_for(&server);
    let reranked = client.rerank("query", Vec::new(), None).await.unwrap();
    assert!(reranked.is_empty());
    assert_eq!(mock.hits_async().await, 0);
}
