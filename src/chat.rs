//! Chat and rerank capability traits.
//!
//! [`ChatBackend`] is the seam to the conversational model: a batch call
//! returning the full response text, and a streaming call yielding
//! [`ChatEvent`]s — incremental tokens followed by an end-of-stream
//! marker. A backend signals a malformed turn sequence with the
//! distinguished [`ParlorError::InvalidHistory`], which drives the
//! session's bounded history repair.
//!
//! [`Reranker`] reorders retrieval candidates by relevance; its output is
//! always a permutation of a subset of its input.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::message::{ChatTurn, Role};
use crate::retrieval::PromptDoc;
use crate::types::ParlorError;

/// Sampling temperature used for every generation call.
pub const DEFAULT_TEMPERATURE: f32 = 0.4;

/// Incremental output of a streaming chat call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    /// A fragment of generated text, in order.
    Token(String),
    /// The generation finished; no further tokens follow.
    StreamEnd,
}

/// Web-search augmentation directive, scoped to one external domain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebSearchConnector {
    /// Domain the backend's web search is restricted to.
    pub site: String,
}

/// One generation request: prompt, prior turns, grounding documents.
#[derive(Clone, Debug)]
pub struct ChatRequest {
    /// The fully built prompt, persona and query already substituted.
    pub prompt: String,
    /// Conversation history up to (not including) the current query.
    pub history: Vec<ChatTurn>,
    /// Retrieved passages grounding the response; empty when ungrounded.
    pub documents: Vec<PromptDoc>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Web-search augmentation; replaces local grounding when present.
    pub web_search: Option<WebSearchConnector>,
}

impl ChatRequest {
    /// Creates a request with default temperature and no grounding.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            history: Vec::new(),
            documents: Vec::new(),
            temperature: DEFAULT_TEMPERATURE,
            web_search: None,
        }
    }

    /// Sets the conversation history.
    #[must_use]
    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }

    /// Sets the grounding documents.
    #[must_use]
    pub fn with_documents(mut self, documents: Vec<PromptDoc>) -> Self {
        self.documents = documents;
        self
    }

    /// Overrides the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Enables the web-search connector for this request.
    #[must_use]
    pub fn with_web_search(mut self, connector: WebSearchConnector) -> Self {
        self.web_search = Some(connector);
        self
    }
}

/// Stream of incremental chat output.
pub type ChatEventStream = BoxStream<'static, Result<ChatEvent, ParlorError>>;

/// Capability trait for the conversational model.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Generate the full response in one call.
    ///
    /// # Errors
    ///
    /// [`ParlorError::InvalidHistory`] when the turn sequence is rejected,
    /// [`ParlorError::Backend`] for any other failure.
    async fn chat(&self, request: ChatRequest) -> Result<String, ParlorError>;

    /// Generate the response as a stream of [`ChatEvent`]s.
    ///
    /// A well-formed stream is zero or more `Token`s followed by exactly
    /// one `StreamEnd`. A stream that ends without `StreamEnd` means the
    /// generation failed mid-flight.
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatEventStream, ParlorError>;
}

/// Capability trait for relevance reranking of retrieval candidates.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Reorder `candidates` by relevance to `query`, most relevant first,
    /// keeping at most `top_n` when given. The result is a permutation of
    /// a subset of the input — nothing is invented or rewritten.
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<PromptDoc>,
        top_n: Option<usize>,
    ) -> Result<Vec<PromptDoc>, ParlorError>;
}

/// Whether a history is acceptable to strict chat backends: roles
/// alternate starting with a user turn, and no user turn is left
/// unanswered at the end.
#[must_use]
pub fn history_is_balanced(history: &[ChatTurn]) -> bool {
    for (idx, turn) in history.iter().enumerate() {
        let expected = if idx % 2 == 0 { Role::User } else { Role::Assistant };
        if turn.role != expected {
            return false;
        }
    }
    history.len() % 2 == 0
}
