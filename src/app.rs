//! The application context: one object owning the channel registry, topic
//! stores, retrieval pipeline, chat backend, transcripts, and sessions.
//!
//! [`ParlorApp`] is constructed once at startup and passed to transport
//! handlers — there is no module-global state and no shared mutable
//! topic/user fields; retrieval and generation receive their parameters
//! explicitly per call, so rooms and users can run concurrently.
//!
//! Each (user, room) session sits behind its own `tokio::sync::Mutex`:
//! at most one query is in flight per session, and concurrent queries on
//! the same session queue up instead of corrupting turn ordering. A slow
//! generation in one room never blocks another room.
//!
//! # Example
//!
//! ```rust,no_run
//! use parlor::app::ParlorApp;
//! use parlor::config::ParlorConfig;
//! use parlor::session::ResponseChunk;
//!
//! async fn run() -> Result<(), parlor::types::ParlorError> {
//!     let app = ParlorApp::builder(ParlorConfig::default()).build().await?;
//!
//!     app.join("alice", "python").await?;
//!     let stream = app
//!         .submit_query("alice", "python", "What is a list?", false, None)
//!         .await?;
//!
//!     while let Ok(chunk) = stream.chunks.recv_async().await {
//!         match chunk {
//!             ResponseChunk::Token(token) => print!("{token}"),
//!             ResponseChunk::End => println!(),
//!             ResponseChunk::Citations(citations) => println!("{citations:?}"),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::chat::{ChatBackend, Reranker};
use crate::config::ParlorConfig;
use crate::embeddings::EmbeddingProvider;
use crate::ingestion::{self, TextChunker};
use crate::message::ChatTurn;
use crate::providers;
use crate::registry::{ChannelCreation, ChannelRegistry};
use crate::retrieval::Retriever;
use crate::session::{ConversationSession, QueryEnv, ResponseChunk};
use crate::stores::{SqlitePassageStore, TopicStores, VectorStore};
use crate::transcripts::{TranscriptMessage, TranscriptStore};
use crate::types::{ParlorError, SessionKey, Topic};

/// Sender name recorded for assistant turns in transcripts.
const ASSISTANT_SENDER: &str = "assistant";

/// Handle for one in-flight query: the streamed chunks plus the
/// conversation id transcripts are recorded under.
pub struct QueryStream {
    /// Conversation the exchange belongs to; generated when the caller
    /// did not supply one.
    pub conversation_id: String,
    /// Streamed response: tokens, then [`ResponseChunk::End`], then the
    /// citations payload. A stream that closes without the sentinel
    /// means the query failed.
    pub chunks: flume::Receiver<ResponseChunk>,
}

/// Builder for [`ParlorApp`]; providers not supplied explicitly are built
/// from the configuration's provider tags.
pub struct ParlorAppBuilder {
    config: ParlorConfig,
    vector_store: Option<Arc<dyn VectorStore>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    chat: Option<Arc<dyn ChatBackend>>,
    reranker: Option<Arc<dyn Reranker>>,
    ephemeral: bool,
}

impl ParlorAppBuilder {
    /// Starts a builder over `config`.
    #[must_use]
    pub fn new(config: ParlorConfig) -> Self {
        Self {
            config,
            vector_store: None,
            embedder: None,
            chat: None,
            reranker: None,
            ephemeral: false,
        }
    }

    /// Overrides the vector store backend.
    #[must_use]
    pub fn with_vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Overrides the embedding provider.
    #[must_use]
    pub fn with_embedding_provider(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Overrides the chat backend.
    #[must_use]
    pub fn with_chat_backend(mut self, backend: Arc<dyn ChatBackend>) -> Self {
        self.chat = Some(backend);
        self
    }

    /// Overrides the reranker.
    #[must_use]
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Skips all durable state files (channel list, transcripts). The
    /// vector store still follows the configuration unless overridden.
    #[must_use]
    pub fn ephemeral(mut self) -> Self {
        self.ephemeral = true;
        self
    }

    /// Builds the application context, opening durable state as needed.
    pub async fn build(self) -> Result<ParlorApp, ParlorError> {
        let config = self.config;

        let embedder = match self.embedder {
            Some(embedder) => embedder,
            None => providers::build_embedding_provider(&config.providers)?,
        };
        let vector_store: Arc<dyn VectorStore> = match self.vector_store {
            Some(store) => store,
            None => Arc::new(SqlitePassageStore::open(&config.storage.passages_db).await?),
        };
        let stores = Arc::new(TopicStores::new(vector_store, embedder));

        let chat = match self.chat {
            Some(chat) => chat,
            None => providers::build_chat_backend(&config.providers)?,
        };
        let reranker = match self.reranker {
            Some(reranker) => Some(reranker),
            None => providers::build_reranker(&config.providers)?,
        };

        let mut retriever = Retriever::new(stores.clone())
            .with_candidates(config.retrieval.candidates)
            .with_streaming_top_n(config.retrieval.streaming_top_n);
        if let Some(reranker) = reranker {
            retriever = retriever.with_reranker(reranker);
        }

        let registry = if self.ephemeral {
            ChannelRegistry::new(config.channels.clone())
        } else {
            ChannelRegistry::load(config.storage.channels_file.clone(), config.channels.clone())
                .await?
        };
        let transcripts = if self.ephemeral {
            Arc::new(TranscriptStore::new())
        } else {
            Arc::new(TranscriptStore::load(config.storage.transcripts_file.clone()).await?)
        };

        // Bind a collection for every known channel up front.
        for channel in registry.list() {
            stores.ensure(&Topic::normalize(&channel)).await?;
        }

        let chunker = TextChunker::new(config.chunking.max_chars);

        Ok(ParlorApp {
            config,
            registry,
            stores,
            retriever: Arc::new(retriever),
            chat,
            chunker,
            transcripts,
            sessions: RwLock::new(HashMap::new()),
        })
    }
}

/// Application context owning all orchestration state.
pub struct ParlorApp {
    config: ParlorConfig,
    registry: ChannelRegistry,
    stores: Arc<TopicStores>,
    retriever: Arc<Retriever>,
    chat: Arc<dyn ChatBackend>,
    chunker: TextChunker,
    transcripts: Arc<TranscriptStore>,
    sessions: RwLock<HashMap<SessionKey, Arc<Mutex<ConversationSession>>>>,
}

impl ParlorApp {
    /// Starts a builder over `config`.
    #[must_use]
    pub fn builder(config: ParlorConfig) -> ParlorAppBuilder {
        ParlorAppBuilder::new(config)
    }

    /// Joins `user` to `room`: binds the room's topic, ensures its
    /// collection exists, and resets the (user, room) session to empty
    /// history. Returns the bound topic.
    pub async fn join(&self, user: &str, room: &str) -> Result<Topic, ParlorError> {
        let topic = self.registry.topic_for(room);
        self.stores.ensure(&topic).await?;

        let key = SessionKey::new(user, room);
        let session = self.session_for(&key);
        session.lock().await.reset(topic.clone());

        tracing::info!(user = %user, room = %room, topic = %topic, "joined room");
        Ok(topic)
    }

    /// The registered channels, in registration order.
    #[must_use]
    pub fn list_channels(&self) -> Vec<String> {
        self.registry.list()
    }

    /// Creates a channel (normalized, idempotent) and binds a topic
    /// collection for it.
    pub async fn create_channel(
        &self,
        user: &str,
        name: &str,
    ) -> Result<ChannelCreation, ParlorError> {
        let outcome = self.registry.create(name).await?;
        if let ChannelCreation::Created(topic) = &outcome {
            self.stores.ensure(topic).await?;
            tracing::info!(user = %user, channel = %topic, "channel created by user");
        }
        Ok(outcome)
    }

    /// Ingests a document into a room's topic collection: load by
    /// extension, chunk, embed, append. Returns the number of passages
    /// stored.
    pub async fn ingest_document(
        &self,
        room: &str,
        path: impl AsRef<Path>,
    ) -> Result<usize, ParlorError> {
        let topic = self.registry.topic_for(room);
        let documents = ingestion::load_document(path).await?;
        let passages = self.chunker.split(&documents);
        self.stores.add_passages(&topic, passages).await
    }

    /// Submits a query for (user, room) and returns the response stream.
    ///
    /// The generation runs on its own task holding the session's lock, so
    /// queries for the same session are serialized while other sessions
    /// proceed. Tokens stream through [`QueryStream::chunks`] followed by
    /// the completion sentinel and the citations payload; when
    /// `web_search` is set, local retrieval is bypassed in favor of the
    /// configured web-search connector and the citations payload is
    /// empty.
    pub async fn submit_query(
        &self,
        user: &str,
        room: &str,
        query: &str,
        web_search: bool,
        conversation_id: Option<String>,
    ) -> Result<QueryStream, ParlorError> {
        let key = SessionKey::new(user, room);
        let session = self.session_for(&key);
        let topic = self.registry.topic_for(room);

        let env = QueryEnv {
            retriever: self.retriever.clone(),
            backend: self.chat.clone(),
            persona: self.config.persona_for(&topic).map(str::to_string),
            temperature: self.config.chat.temperature,
            web_search_site: self.config.chat.web_search_site.clone(),
        };

        let conversation_id =
            conversation_id.unwrap_or_else(|| self.transcripts.begin_conversation(user, room));
        self.transcripts.record(
            user,
            room,
            &conversation_id,
            TranscriptMessage::new(user, query),
        );

        let (tx, rx) = flume::unbounded();
        let transcripts = self.transcripts.clone();
        let task_user = user.to_string();
        let task_room = room.to_string();
        let task_query = query.to_string();
        let task_conversation = conversation_id.clone();

        tokio::spawn(async move {
            let mut session = session.lock().await;
            match session
                .submit_query(&env, &task_query, web_search, &tx)
                .await
            {
                Ok(text) => {
                    transcripts.record(
                        &task_user,
                        &task_room,
                        &task_conversation,
                        TranscriptMessage::new(ASSISTANT_SENDER, text),
                    );
                    if let Err(err) = transcripts.save().await {
                        tracing::warn!(error = %err, "failed to persist transcripts");
                    }
                }
                Err(err) => {
                    // The sink closes without a sentinel; the caller reads
                    // that as failure. Turns appended before the failure
                    // remain.
                    tracing::error!(user = %task_user, room = %task_room, error = %err, "query terminated");
                }
            }
        });

        Ok(QueryStream {
            conversation_id,
            chunks: rx,
        })
    }

    /// Snapshot of the in-session turn history for (user, room).
    pub async fn session_history(&self, user: &str, room: &str) -> Vec<ChatTurn> {
        let key = SessionKey::new(user, room);
        let session = self.session_for(&key);
        let guard = session.lock().await;
        guard.history().to_vec()
    }

    /// Messages of one recorded conversation.
    #[must_use]
    pub fn conversation_history(
        &self,
        user: &str,
        room: &str,
        conversation_id: &str,
    ) -> Vec<TranscriptMessage> {
        self.transcripts.history(user, room, conversation_id)
    }

    /// Conversation ids per room for one user.
    #[must_use]
    pub fn conversations(&self, user: &str) -> BTreeMap<String, Vec<String>> {
        self.transcripts.conversations(user)
    }

    /// Direct access to the topic stores, for ingestion pipelines that
    /// bypass file loading.
    #[must_use]
    pub fn stores(&self) -> &Arc<TopicStores> {
        &self.stores
    }

    fn session_for(&self, key: &SessionKey) -> Arc<Mutex<ConversationSession>> {
        if let Some(session) = self.sessions.read().get(key) {
            return session.clone();
        }
        let mut sessions = self.sessions.write();
        sessions
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(ConversationSession::new(
                    key.user.clone(),
                    key.topic(),
                )))
            })
            .clone()
    }
}
