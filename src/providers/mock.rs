//! Deterministic in-process providers for tests and offline use.
//!
//! [`MockChatBackend`] streams scripted responses word by word and can be
//! configured to reject conversation histories, which is how the bounded
//! history-repair path is exercised without a live backend.
//! [`MockReranker`] orders candidates by naive term overlap with the
//! query — a permutation of its input, like any real reranker.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;

use crate::chat::{
    ChatBackend, ChatEvent, ChatEventStream, ChatRequest, Reranker, history_is_balanced,
};
use crate::retrieval::PromptDoc;
use crate::types::ParlorError;

const DEFAULT_RESPONSE: &str = "<p>I do not have enough information to answer that.</p>";

/// Scripted chat backend.
///
/// Responses are consumed in order; when the script runs out a fixed
/// fallback answer is produced. `reject_next_histories(n)` makes the next
/// `n` calls fail with [`ParlorError::InvalidHistory`]; `strict_history()`
/// makes every call validate turn alternation the way picky hosted
/// backends do.
#[derive(Default)]
pub struct MockChatBackend {
    responses: Mutex<VecDeque<String>>,
    invalid_history_rejections: AtomicUsize,
    strict_history: bool,
}

impl MockChatBackend {
    /// Creates a backend that always produces the fallback answer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that plays back `responses` in order.
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    /// Rejects the next `count` calls with `InvalidHistory`.
    #[must_use]
    pub fn reject_next_histories(self, count: usize) -> Self {
        self.invalid_history_rejections.store(count, Ordering::SeqCst);
        self
    }

    /// Validates turn alternation on every call.
    #[must_use]
    pub fn strict_history(mut self) -> Self {
        self.strict_history = true;
        self
    }

    fn check(&self, request: &ChatRequest) -> Result<(), ParlorError> {
        let pending = self.invalid_history_rejections.load(Ordering::SeqCst);
        if pending > 0 {
            self.invalid_history_rejections
                .store(pending - 1, Ordering::SeqCst);
            return Err(ParlorError::InvalidHistory);
        }
        if self.strict_history && !history_is_balanced(&request.history) {
            return Err(ParlorError::InvalidHistory);
        }
        Ok(())
    }

    fn next_response(&self) -> String {
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| DEFAULT_RESPONSE.to_string())
    }
}

#[async_trait]
impl ChatBackend for MockChatBackend {
    async fn chat(&self, request: ChatRequest) -> Result<String, ParlorError> {
        self.check(&request)?;
        Ok(self.next_response())
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatEventStream, ParlorError> {
        self.check(&request)?;
        let response = self.next_response();

        // One token per word, delimiters attached, so the concatenation
        // of tokens equals the full response exactly.
        let mut events: Vec<Result<ChatEvent, ParlorError>> = response
            .split_inclusive(' ')
            .map(|token| Ok(ChatEvent::Token(token.to_string())))
            .collect();
        events.push(Ok(ChatEvent::StreamEnd));

        Ok(futures_util::stream::iter(events).boxed())
    }
}

/// Term-overlap reranker: candidates sharing more words with the query
/// rank first; ties keep their original order.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockReranker;

impl MockReranker {
    /// Creates the reranker.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn overlap(query: &str, candidate: &PromptDoc) -> usize {
        let haystack = format!("{} {}", candidate.title, candidate.snippet).to_lowercase();
        query
            .to_lowercase()
            .split_whitespace()
            .filter(|term| haystack.contains(term))
            .count()
    }
}

#[async_trait]
impl Reranker for MockReranker {
    async fn rerank(
        &self,
        query: &str,
        mut candidates: Vec<PromptDoc>,
        top_n: Option<usize>,
    ) -> Result<Vec<PromptDoc>, ParlorError> {
        candidates.sort_by_key(|candidate| std::cmp::Reverse(Self::overlap(query, candidate)));
        if let Some(n) = top_n {
            candidates.truncate(n);
        }
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ChatTurn;

    #[tokio::test]
    async fn scripted_responses_play_in_order() {
        let backend =
            MockChatBackend::with_responses(vec!["first".to_string(), "second".to_string()]);
        assert_eq!(backend.chat(ChatRequest::new("p")).await.unwrap(), "first");
        assert_eq!(backend.chat(ChatRequest::new("p")).await.unwrap(), "second");
        // Script exhausted: fallback answer.
        assert_eq!(
            backend.chat(ChatRequest::new("p")).await.unwrap(),
            DEFAULT_RESPONSE
        );
    }

    #[tokio::test]
    async fn stream_tokens_concatenate_to_the_response() {
        let backend = MockChatBackend::with_responses(vec!["a b c".to_string()]);
        let mut stream = backend.chat_stream(ChatRequest::new("p")).await.unwrap();

        let mut text = String::new();
        let mut saw_end = false;
        while let Some(event) = stream.next().await {
            match event.unwrap() {
                ChatEvent::Token(t) => text.push_str(&t),
                ChatEvent::StreamEnd => saw_end = true,
            }
        }
        assert_eq!(text, "a b c");
        assert!(saw_end);
    }

    #[tokio::test]
    async fn rejections_are_consumed_then_cleared() {
        let backend = MockChatBackend::new().reject_next_histories(1);
        let err = backend.chat(ChatRequest::new("p")).await.unwrap_err();
        assert!(matches!(err, ParlorError::InvalidHistory));
        assert!(backend.chat(ChatRequest::new("p")).await.is_ok());
    }

    #[tokio::test]
    async fn strict_backend_rejects_unbalanced_history() {
        let backend = MockChatBackend::new().strict_history();
        let request =
            ChatRequest::new("p").with_history(vec![ChatTurn::user("unanswered question")]);
        let err = backend.chat(request).await.unwrap_err();
        assert!(matches!(err, ParlorError::InvalidHistory));
    }

    #[tokio::test]
    async fn rerank_is_a_permutation_of_a_subset() {
        let docs = vec![
            PromptDoc {
                title: "a".to_string(),
                snippet: "nothing relevant".to_string(),
            },
            PromptDoc {
                title: "b".to_string(),
                snippet: "lists and slicing in python".to_string(),
            },
        ];
        let reranked = MockReranker::new()
            .rerank("python lists", docs.clone(), Some(2))
            .await
            .unwrap();
        assert_eq!(reranked.len(), 2);
        assert_eq!(reranked[0].title, "b");
        for doc in &reranked {
            assert!(docs.contains(doc));
        }
    }
}
