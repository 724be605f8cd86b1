//! Capability provider implementations and the factory that builds them
//! from configuration.
//!
//! Provider selection is a closed capability table: each
//! configuration tag (see [`crate::config`]) maps to exactly one
//! constructor here. There is no dynamic, configuration-named class
//! construction — an unknown tag already failed when the configuration
//! was deserialized, and the factories below only add environment checks
//! (the hosted providers need an API key).

pub mod cohere;
pub mod mock;

use std::sync::Arc;

use crate::chat::{ChatBackend, Reranker};
use crate::config::{
    API_KEY_ENV, ChatProviderSpec, EmbeddingProviderSpec, ProvidersConfig, RerankerSpec,
};
use crate::embeddings::{EmbeddingProvider, HashEmbeddingProvider};
use crate::types::ParlorError;

pub use cohere::{CohereClient, CohereConfig};
pub use mock::{MockChatBackend, MockReranker};

fn hosted_client(model_override: impl FnOnce(&mut CohereConfig)) -> Result<CohereClient, ParlorError> {
    let api_key = std::env::var(API_KEY_ENV)
        .map_err(|_| ParlorError::Config(format!("{API_KEY_ENV} is not set")))?;
    let mut config = CohereConfig::new(api_key)?;
    model_override(&mut config);
    CohereClient::new(config)
}

/// Build the chat backend named by configuration.
pub fn build_chat_backend(config: &ProvidersConfig) -> Result<Arc<dyn ChatBackend>, ParlorError> {
    match &config.chat {
        ChatProviderSpec::Cohere { model } => {
            let model = model.clone();
            let client = hosted_client(|c| c.chat_model = model)?;
            Ok(Arc::new(client))
        }
        ChatProviderSpec::Mock => Ok(Arc::new(MockChatBackend::new())),
    }
}

/// Build the embedding provider named by configuration.
pub fn build_embedding_provider(
    config: &ProvidersConfig,
) -> Result<Arc<dyn EmbeddingProvider>, ParlorError> {
    match config.embedding {
        EmbeddingProviderSpec::Hash { dimensions } => {
            Ok(Arc::new(HashEmbeddingProvider::new(dimensions)))
        }
    }
}

/// Build the reranker named by configuration, if any.
pub fn build_reranker(
    config: &ProvidersConfig,
) -> Result<Option<Arc<dyn Reranker>>, ParlorError> {
    match &config.reranker {
        None => Ok(None),
        Some(RerankerSpec::Mock) => Ok(Some(Arc::new(MockReranker::new()))),
        Some(RerankerSpec::Cohere { model }) => {
            let model = model.clone();
            let client = hosted_client(|c| c.rerank_model = model)?;
            Ok(Some(Arc::new(client)))
        }
    }
}
