//! # Parlor: Multi-room Retrieval-Augmented Chat Orchestration
//!
//! Parlor binds chat rooms to topic document collections and orchestrates
//! the conversation loop around them: queries are grounded with retrieved
//! passages, optionally reranked, streamed back token by token, and the
//! finalized turns are appended to per-(user, room) history — while
//! channels, collections, and transcripts persist across restarts.
//!
//! ## Core Concepts
//!
//! - **Topics**: normalized identifiers binding a room to one append-only
//!   collection of embedded passages
//! - **Sessions**: per-(user, room) conversation state with bounded
//!   history repair when a backend rejects the turn sequence
//! - **Retrieval pipeline**: similarity search, text cleaning, citation
//!   grouping, and rerank with graceful degradation
//! - **Capability providers**: embedding, chat, and rerank backends behind
//!   traits, chosen through a closed configuration registry
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use parlor::app::ParlorApp;
//! use parlor::config::ParlorConfig;
//! use parlor::session::ResponseChunk;
//! use parlor::stores::MemoryVectorStore;
//!
//! async fn example() -> Result<(), parlor::types::ParlorError> {
//!     let app = ParlorApp::builder(ParlorConfig::default())
//!         .with_vector_store(Arc::new(MemoryVectorStore::new()))
//!         .ephemeral()
//!         .build()
//!         .await?;
//!
//!     app.create_channel("alice", "Python").await?;
//!     app.join("alice", "python").await?;
//!     app.ingest_document("python", "guides/lists.pdf").await?;
//!
//!     let stream = app
//!         .submit_query("alice", "python", "What is a list?", false, None)
//!         .await?;
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
//!
//! ## Failure Posture
//!
//! Retrieval never fails a query: an unreachable store degrades to an
//! ungrounded response. An invalid conversation history is repaired and
//! retried a bounded number of times. Any other backend failure is
//! terminal for that request — the stream ends without its completion
//! sentinel and session turns appended before the failure stay put.
//!
//! ## Module Guide
//!
//! - [`app`] - Application context and operation surface
//! - [`session`] - Conversation state machine and streaming drive loop
//! - [`retrieval`] - Retrieval + rerank pipeline and citations
//! - [`stores`] - Topic-keyed vector storage backends
//! - [`ingestion`] - Document loading and chunking
//! - [`embeddings`] - Embedding capability providers
//! - [`chat`] - Chat and rerank capability traits
//! - [`providers`] - Provider implementations and the config factory
//! - [`registry`] - Channel registry
//! - [`transcripts`] - Durable conversation transcripts
//! - [`config`] - Application configuration
//! - [`message`] - Conversation turns
//! - [`types`] - Core identifiers and the error taxonomy

pub mod app;
pub mod chat;
pub mod config;
pub mod embeddings;
pub mod ingestion;
pub mod message;
pub mod providers;
pub mod registry;
pub mod retrieval;
pub mod session;
pub mod stores;
pub mod transcripts;
pub mod types;
