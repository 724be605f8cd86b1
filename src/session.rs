//! Per-(user, room) conversation state and the query drive loop.
//!
//! A [`ConversationSession`] owns the ordered turn history for one user
//! in one room and moves `Idle → AwaitingResponse → Idle` for every
//! query; joining a room resets it. [`ConversationSession::submit_query`]
//! builds the prompt, runs retrieval (or the web-search bypass), drives
//! the backend stream token by token into the caller's sink, and appends
//! the finalized assistant turn.
//!
//! # History repair
//!
//! Strict backends reject a turn sequence that does not alternate
//! correctly — for example a history ending on an unanswered user turn —
//! with [`ParlorError::InvalidHistory`]. The session recovers by dropping
//! the two turns before the newest one and retrying, at most
//! [`MAX_HISTORY_REPAIRS`] times; a rejection past the bound surfaces as
//! [`ParlorError::HistoryRepairExhausted`] instead of recursing forever.

use std::sync::Arc;

use futures_util::StreamExt;

use crate::chat::{ChatBackend, ChatEvent, ChatEventStream, ChatRequest, WebSearchConnector};
use crate::message::ChatTurn;
use crate::retrieval::{Citations, PromptDoc, RetrievalMode, Retriever};
use crate::types::{ParlorError, Topic};

/// Maximum number of history-repair retries per query.
pub const MAX_HISTORY_REPAIRS: usize = 2;

/// Prompt skeleton; `{expertise}` and `{query}` are substituted per call.
///
/// The formatting contract (constrained HTML subset, minimum length) is
/// enforced by the backend following the prompt, not by code.
const PROMPT_TEMPLATE: &str = "\
You are a conversational AI assistant.
{expertise}
Your purpose is to answer user queries based on the context provided.
Answer what you are asked as detailed as possible. Answer only in HTML format and no other format.
Provide your answer inside a <p> tag, without the enclosing <html>, <body> or <head> tags.
Use <h1> or <h2> tags for titles, <ul> and <li> tags for lists, <b> for bold text, <i> for italic text and <a> tags for links.
Your answer must be at least 100 words long.
Do not use any Markdown syntax or hashtags.
If you don't know the answer, say that you don't have enough information to answer the question and don't improvise.

User Question: {query}
";

/// Per-turn state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No query in flight.
    Idle,
    /// A query is being generated.
    AwaitingResponse,
}

/// One unit of streamed response output, in emission order: zero or more
/// `Token`s, one `End` sentinel, then one `Citations` payload (empty when
/// nothing grounded the response).
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseChunk {
    /// Incremental response text.
    Token(String),
    /// Completion sentinel; the response text is finished.
    End,
    /// Grouped source citations for the finished response.
    Citations(Citations),
}

/// Everything a query needs besides the session itself; passed explicitly
/// per call so sessions hold no provider state and no shared instance is
/// mutated between rooms.
#[derive(Clone)]
pub struct QueryEnv {
    /// Retrieval + rerank pipeline.
    pub retriever: Arc<Retriever>,
    /// Chat backend.
    pub backend: Arc<dyn ChatBackend>,
    /// Persona-expertise fragment for the session's topic, if configured.
    pub persona: Option<String>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Domain the web-search connector is restricted to.
    pub web_search_site: String,
}

/// Conversation state for one user in one room.
pub struct ConversationSession {
    user: String,
    topic: Topic,
    history: Vec<ChatTurn>,
    state: SessionState,
}

impl ConversationSession {
    /// Creates an idle session with empty history bound to `topic`.
    #[must_use]
    pub fn new(user: impl Into<String>, topic: Topic) -> Self {
        Self {
            user: user.into(),
            topic,
            history: Vec::new(),
            state: SessionState::Idle,
        }
    }

    /// Resets the session on room join: clears history and rebinds the
    /// topic.
    pub fn reset(&mut self, topic: Topic) {
        self.topic = topic;
        self.history.clear();
        self.state = SessionState::Idle;
    }

    /// The user this session belongs to.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// The topic this session is bound to.
    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// The ordered turn history.
    #[must_use]
    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    /// Current per-turn state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Submit a query and stream the response into `sink`.
    ///
    /// Appends the USER turn, grounds the prompt through retrieval (or
    /// the web-search connector when `web_search` is set, which skips
    /// local retrieval and citations), streams tokens as they arrive,
    /// emits [`ResponseChunk::End`] then the citations payload, and
    /// appends the full response as the ASSISTANT turn.
    ///
    /// On a terminal backend failure the sink ends without the sentinel,
    /// no assistant turn is appended, and turns appended before the
    /// failure stay in place.
    pub async fn submit_query(
        &mut self,
        env: &QueryEnv,
        query: &str,
        web_search: bool,
        sink: &flume::Sender<ResponseChunk>,
    ) -> Result<String, ParlorError> {
        self.state = SessionState::AwaitingResponse;
        self.history.push(ChatTurn::user(query));

        let result = self.drive_query(env, query, web_search, sink).await;
        self.state = SessionState::Idle;

        match result {
            Ok(text) => {
                self.history.push(ChatTurn::assistant(text.clone()));
                Ok(text)
            }
            Err(err) => {
                tracing::warn!(user = %self.user, topic = %self.topic, error = %err, "query failed");
                Err(err)
            }
        }
    }

    /// Submit a query and return the full response in one call, with the
    /// citations for whatever grounded it.
    ///
    /// The batch path runs retrieval in [`RetrievalMode::Batch`] (rerank
    /// reorders without truncating) and invokes the backend's one-shot
    /// call. History bookkeeping and bounded repair behave exactly as in
    /// [`submit_query`](Self::submit_query).
    pub async fn submit_query_batch(
        &mut self,
        env: &QueryEnv,
        query: &str,
    ) -> Result<(String, Citations), ParlorError> {
        self.state = SessionState::AwaitingResponse;
        self.history.push(ChatTurn::user(query));

        let (documents, citations) = env
            .retriever
            .retrieve(&self.topic, query, RetrievalMode::Batch)
            .await;
        let prompt = build_prompt(env.persona.as_deref(), query);

        let mut repairs = 0usize;
        let result = loop {
            let request = self.build_request(env, &prompt, &documents, false);
            match env.backend.chat(request).await {
                Ok(text) => break Ok(text),
                Err(ParlorError::InvalidHistory) => {
                    if repairs >= MAX_HISTORY_REPAIRS {
                        break Err(ParlorError::HistoryRepairExhausted { attempts: repairs });
                    }
                    repairs += 1;
                    repair_history(&mut self.history);
                    tracing::warn!(attempt = repairs, "invalid history, repaired and retrying");
                }
                Err(err) => break Err(err),
            }
        };
        self.state = SessionState::Idle;

        match result {
            Ok(text) => {
                self.history.push(ChatTurn::assistant(text.clone()));
                Ok((text, citations))
            }
            Err(err) => {
                tracing::warn!(user = %self.user, topic = %self.topic, error = %err, "query failed");
                Err(err)
            }
        }
    }

    async fn drive_query(
        &mut self,
        env: &QueryEnv,
        query: &str,
        web_search: bool,
        sink: &flume::Sender<ResponseChunk>,
    ) -> Result<String, ParlorError> {
        let (documents, citations) = if web_search {
            (Vec::new(), Citations::default())
        } else {
            env.retriever
                .retrieve(&self.topic, query, RetrievalMode::Streaming)
                .await
        };
        let prompt = build_prompt(env.persona.as_deref(), query);

        let mut repairs = 0usize;
        loop {
            let request = self.build_request(env, &prompt, &documents, web_search);
            let stream = match env.backend.chat_stream(request).await {
                Ok(stream) => stream,
                Err(ParlorError::InvalidHistory) => {
                    if repairs >= MAX_HISTORY_REPAIRS {
                        return Err(ParlorError::HistoryRepairExhausted { attempts: repairs });
                    }
                    repairs += 1;
                    repair_history(&mut self.history);
                    tracing::warn!(attempt = repairs, "invalid history, repaired and retrying");
                    continue;
                }
                Err(err) => return Err(err),
            };

            match drive_stream(stream, sink, &citations).await {
                Ok(text) => return Ok(text),
                Err(StreamFailure {
                    error: ParlorError::InvalidHistory,
                    tokens_emitted: false,
                }) => {
                    if repairs >= MAX_HISTORY_REPAIRS {
                        return Err(ParlorError::HistoryRepairExhausted { attempts: repairs });
                    }
                    repairs += 1;
                    repair_history(&mut self.history);
                    tracing::warn!(attempt = repairs, "invalid history, repaired and retrying");
                }
                // Once tokens have reached the caller a retry would
                // duplicate output; any failure is terminal from here.
                Err(StreamFailure { error, .. }) => return Err(error),
            }
        }
    }

    fn build_request(
        &self,
        env: &QueryEnv,
        prompt: &str,
        documents: &[PromptDoc],
        web_search: bool,
    ) -> ChatRequest {
        // The just-appended user turn is the message itself; the backend
        // receives only the turns before it as history.
        let prior = &self.history[..self.history.len().saturating_sub(1)];
        let mut request = ChatRequest::new(prompt)
            .with_history(prior.to_vec())
            .with_documents(documents.to_vec())
            .with_temperature(env.temperature);
        if web_search {
            request = request.with_web_search(WebSearchConnector {
                site: env.web_search_site.clone(),
            });
        }
        request
    }
}

struct StreamFailure {
    error: ParlorError,
    tokens_emitted: bool,
}

async fn drive_stream(
    mut stream: ChatEventStream,
    sink: &flume::Sender<ResponseChunk>,
    citations: &Citations,
) -> Result<String, StreamFailure> {
    let mut full_text = String::new();
    let mut tokens_emitted = false;
    let mut saw_end = false;

    while let Some(event) = stream.next().await {
        match event {
            Ok(ChatEvent::Token(token)) => {
                tokens_emitted = true;
                full_text.push_str(&token);
                let _ = sink.send(ResponseChunk::Token(token));
            }
            Ok(ChatEvent::StreamEnd) => {
                saw_end = true;
                break;
            }
            Err(error) => {
                return Err(StreamFailure {
                    error,
                    tokens_emitted,
                });
            }
        }
    }

    if !saw_end {
        return Err(StreamFailure {
            error: ParlorError::Backend("stream ended without completion".to_string()),
            tokens_emitted,
        });
    }

    let _ = sink.send(ResponseChunk::End);
    let _ = sink.send(ResponseChunk::Citations(citations.clone()));
    Ok(full_text)
}

/// Substitute the persona fragment and query into the prompt template.
#[must_use]
pub fn build_prompt(expertise: Option<&str>, query: &str) -> String {
    PROMPT_TEMPLATE
        .replace("{expertise}", expertise.unwrap_or(""))
        .replace("{query}", query)
}

/// Drop the two turns before the newest one, keeping the newest.
///
/// Mirrors trimming `history[..len-3]` + the last turn: with fewer than
/// three turns everything except the newest is dropped; a single turn is
/// left untouched.
pub(crate) fn repair_history(history: &mut Vec<ChatTurn>) {
    let len = history.len();
    if len < 2 {
        return;
    }
    let start = len.saturating_sub(3);
    history.drain(start..len - 1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    fn turns(specs: &[(Role, &str)]) -> Vec<ChatTurn> {
        specs
            .iter()
            .map(|(role, text)| ChatTurn::new(*role, *text))
            .collect()
    }

    #[test]
    fn repair_drops_the_two_turns_before_the_newest() {
        let mut history = turns(&[
            (Role::User, "q1"),
            (Role::Assistant, "a1"),
            (Role::User, "q2"),
            (Role::User, "q3"),
            (Role::User, "q4"),
        ]);
        repair_history(&mut history);
        let texts: Vec<&str> = history.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["q1", "a1", "q4"]);
    }

    #[test]
    fn repair_on_short_histories() {
        let mut two = turns(&[(Role::User, "q1"), (Role::User, "q2")]);
        repair_history(&mut two);
        assert_eq!(two.len(), 1);
        assert_eq!(two[0].text, "q2");

        let mut one = turns(&[(Role::User, "only")]);
        repair_history(&mut one);
        assert_eq!(one.len(), 1);

        let mut empty: Vec<ChatTurn> = Vec::new();
        repair_history(&mut empty);
        assert!(empty.is_empty());
    }

    #[test]
    fn prompt_substitutes_expertise_and_query() {
        let prompt = build_prompt(Some("You are a Python tutor."), "What is a list?");
        assert!(prompt.contains("You are a Python tutor."));
        assert!(prompt.contains("User Question: What is a list?"));
        assert!(!prompt.contains("{expertise}"));
        assert!(!prompt.contains("{query}"));
    }

    #[test]
    fn prompt_without_persona_has_no_placeholder_residue() {
        let prompt = build_prompt(None, "hello");
        assert!(!prompt.contains("{expertise}"));
        assert!(prompt.contains("User Question: hello"));
    }

    #[test]
    fn reset_clears_history_and_rebinds_topic() {
        let mut session = ConversationSession::new("alice", Topic::normalize("general"));
        session.history.push(ChatTurn::user("old"));
        session.reset(Topic::normalize("python"));
        assert!(session.history().is_empty());
        assert_eq!(session.topic().as_str(), "python");
        assert_eq!(session.state(), SessionState::Idle);
    }
}
