//! Hosted chat, rerank, and streaming client for a Cohere-style HTTP API.
//!
//! The wire contract is the one the orchestration core was designed
//! against: `POST /v1/chat` with message, chat history, grounding
//! documents, temperature, and optional connectors; a streaming variant
//! emitting newline-delimited JSON events (`text-generation` tokens, then
//! `stream-end`); and `POST /v1/rerank` ranking on the `title` and
//! `snippet` fields. An HTTP 400 on the chat route is the backend's
//! malformed-history rejection and is surfaced as
//! [`ParlorError::InvalidHistory`] so the session can repair and retry.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::chat::{ChatBackend, ChatEvent, ChatEventStream, ChatRequest, Reranker};
use crate::message::{ChatTurn, Role};
use crate::retrieval::PromptDoc;
use crate::types::ParlorError;

/// Default chat model.
pub const DEFAULT_CHAT_MODEL: &str = "command-r-plus";
/// Default rerank model.
pub const DEFAULT_RERANK_MODEL: &str = "rerank-multilingual-v3.0";
const DEFAULT_BASE_URL: &str = "https://api.cohere.com/";

/// Connection settings for the hosted API.
#[derive(Clone, Debug)]
pub struct CohereConfig {
    /// Bearer token for the API.
    pub api_key: String,
    /// API base URL; override for self-hosted gateways and tests.
    pub base_url: Url,
    /// Model used for chat calls.
    pub chat_model: String,
    /// Model used for rerank calls.
    pub rerank_model: String,
}

impl CohereConfig {
    /// Settings pointing at the public API with default models.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ParlorError> {
        let base_url = Url::parse(DEFAULT_BASE_URL)
            .map_err(|err| ParlorError::Config(format!("base url: {err}")))?;
        Ok(Self {
            api_key: api_key.into(),
            base_url,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            rerank_model: DEFAULT_RERANK_MODEL.to_string(),
        })
    }
}

/// HTTP client implementing [`ChatBackend`] and [`Reranker`].
#[derive(Clone)]
pub struct CohereClient {
    http: Client,
    config: CohereConfig,
}

impl CohereClient {
    /// Builds the client with a rustls-backed connection pool.
    pub fn new(config: CohereConfig) -> Result<Self, ParlorError> {
        let http = Client::builder()
            .user_agent(concat!("parlor/", env!("CARGO_PKG_VERSION")))
            .use_rustls_tls()
            .build()
            .map_err(|err| ParlorError::Backend(err.to_string()))?;
        Ok(Self { http, config })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ParlorError> {
        self.config
            .base_url
            .join(path)
            .map_err(|err| ParlorError::Backend(format!("endpoint {path}: {err}")))
    }

    fn chat_body<'a>(&'a self, request: &'a ChatRequest, stream: bool) -> ChatBody<'a> {
        let connectors = request
            .web_search
            .as_ref()
            .map(|connector| {
                vec![WireConnector {
                    id: "web-search",
                    options: ConnectorOptions {
                        site: connector.site.clone(),
                    },
                }]
            })
            .unwrap_or_default();

        ChatBody {
            model: &self.config.chat_model,
            message: &request.prompt,
            chat_history: wire_history(&request.history),
            documents: &request.documents,
            temperature: request.temperature,
            connectors,
            stream,
        }
    }

    async fn reject_on_error(response: reqwest::Response) -> Result<reqwest::Response, ParlorError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        // The chat route answers 400 when the turn sequence is malformed;
        // everything else is an ordinary backend failure.
        if status == StatusCode::BAD_REQUEST {
            tracing::debug!(%status, body = %body, "chat backend rejected history");
            return Err(ParlorError::InvalidHistory);
        }
        Err(ParlorError::Backend(format!("{status}: {body}")))
    }
}

fn wire_history(history: &[ChatTurn]) -> Vec<WireTurn<'_>> {
    history
        .iter()
        .map(|turn| WireTurn {
            role: match turn.role {
                Role::User => "USER",
                Role::Assistant => "CHATBOT",
            },
            message: &turn.text,
        })
        .collect()
}

#[derive(Serialize)]
struct WireTurn<'a> {
    role: &'static str,
    message: &'a str,
}

#[derive(Serialize)]
struct ConnectorOptions {
    site: String,
}

#[derive(Serialize)]
struct WireConnector {
    id: &'static str,
    options: ConnectorOptions,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    message: &'a str,
    chat_history: Vec<WireTurn<'a>>,
    documents: &'a [PromptDoc],
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    connectors: Vec<WireConnector>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    text: String,
}

#[derive(Deserialize)]
struct StreamEvent {
    event_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct RerankBody<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [PromptDoc],
    rank_fields: [&'static str; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    top_n: Option<usize>,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
}

#[async_trait]
impl ChatBackend for CohereClient {
    async fn chat(&self, request: ChatRequest) -> Result<String, ParlorError> {
        let url = self.endpoint("v1/chat")?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&self.chat_body(&request, false))
            .send()
            .await
            .map_err(|err| ParlorError::Backend(err.to_string()))?;
        let response = Self::reject_on_error(response).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| ParlorError::Backend(err.to_string()))?;
        Ok(parsed.text)
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatEventStream, ParlorError> {
        let url = self.endpoint("v1/chat")?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&self.chat_body(&request, true))
            .send()
            .await
            .map_err(|err| ParlorError::Backend(err.to_string()))?;
        let response = Self::reject_on_error(response).await?;

        // Bridge the NDJSON byte stream into chat events over a channel,
        // the same shape the event bus uses for per-request streaming.
        let (tx, rx) = flume::unbounded::<Result<ChatEvent, ParlorError>>();
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        let _ = tx.send(Err(ParlorError::Backend(err.to_string())));
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);
                    if line.is_empty() {
                        continue;
                    }
                    if !forward_stream_line(&line, &tx) {
                        return;
                    }
                }
            }
            let tail = buffer.trim().to_string();
            if !tail.is_empty() {
                forward_stream_line(&tail, &tx);
            }
        });

        Ok(rx.into_stream().boxed())
    }
}

/// Parse one NDJSON line and forward the resulting event.
///
/// Returns `false` once the stream is finished and the reader task should
/// stop.
fn forward_stream_line(line: &str, tx: &flume::Sender<Result<ChatEvent, ParlorError>>) -> bool {
    match serde_json::from_str::<StreamEvent>(line) {
        Ok(event) => match event.event_type.as_str() {
            "text-generation" => {
                let _ = tx.send(Ok(ChatEvent::Token(event.text)));
                true
            }
            "stream-end" => {
                let _ = tx.send(Ok(ChatEvent::StreamEnd));
                false
            }
            // Citation and search events from connectors are not part of
            // the core contract; skip them.
            _ => true,
        },
        Err(err) => {
            let _ = tx.send(Err(ParlorError::Backend(format!(
                "malformed stream event: {err}"
            ))));
            false
        }
    }
}

#[async_trait]
impl Reranker for CohereClient {
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<PromptDoc>,
        top_n: Option<usize>,
    ) -> Result<Vec<PromptDoc>, ParlorError> {
        if candidates.is_empty() {
            return Ok(candidates);
        }
        let url = self.endpoint("v1/rerank")?;
        let body = RerankBody {
            model: &self.config.rerank_model,
            query,
            documents: &candidates,
            rank_fields: ["title", "snippet"],
            top_n,
        };
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| ParlorError::Backend(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ParlorError::Backend(format!("{status}: {body}")));
        }
        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|err| ParlorError::Backend(err.to_string()))?;

        let reordered: Vec<PromptDoc> = parsed
            .results
            .into_iter()
            .filter_map(|result| candidates.get(result.index).cloned())
            .collect();
        Ok(reordered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_maps_to_wire_roles() {
        let history = vec![ChatTurn::user("q"), ChatTurn::assistant("a")];
        let wire = wire_history(&history);
        assert_eq!(wire[0].role, "USER");
        assert_eq!(wire[1].role, "CHATBOT");
    }

    #[test]
    fn chat_body_omits_connectors_when_local() {
        let config = CohereConfig::new("key").unwrap();
        let client = CohereClient::new(config).unwrap();
        let request = ChatRequest::new("prompt");
        let body = serde_json::to_value(client.chat_body(&request, true)).unwrap();
        assert!(body.get("connectors").is_none());
        assert_eq!(body["stream"], serde_json::json!(true));
        assert_eq!(body["temperature"], serde_json::json!(0.4));
    }

    #[test]
    fn stream_lines_map_to_events() {
        let (tx, rx) = flume::unbounded();
        assert!(forward_stream_line(
            r#"{"event_type":"text-generation","text":"hi"}"#,
            &tx
        ));
        assert!(!forward_stream_line(r#"{"event_type":"stream-end"}"#, &tx));
        assert_eq!(rx.recv().unwrap().unwrap(), ChatEvent::Token("hi".to_string()));
        assert_eq!(rx.recv().unwrap().unwrap(), ChatEvent::StreamEnd);
    }
}
