//! Application configuration.
//!
//! [`ParlorConfig`] collects everything the orchestration core is
//! parameterized by: the seed channel list, the topic→persona-expertise
//! map used in prompt construction, chunking and retrieval tuning, chat
//! tuning, storage paths, and the capability provider selection.
//!
//! Providers are chosen with tagged variants ([`ChatProviderSpec`] and
//! friends): deserialization validates the `kind` tag against the closed
//! set of supported providers, so a typo in configuration fails at load
//! time instead of constructing an arbitrary class by name.
//!
//! Files may be TOML or JSON, dispatched by extension. Secrets (the
//! hosted API key) come from the environment; [`ParlorConfig::load`]
//! runs `dotenvy` first so a local `.env` works in development.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::chat::DEFAULT_TEMPERATURE;
use crate::embeddings::DEFAULT_DIMENSIONS;
use crate::ingestion::chunk::DEFAULT_MAX_CHARS;
use crate::providers::cohere::{DEFAULT_CHAT_MODEL, DEFAULT_RERANK_MODEL};
use crate::retrieval::{RETRIEVAL_CANDIDATES, STREAMING_RERANK_TOP_N};
use crate::types::{ParlorError, Topic};

/// Environment variable holding the hosted API key.
pub const API_KEY_ENV: &str = "COHERE_API_KEY";

/// Top-level configuration for a [`ParlorApp`](crate::app::ParlorApp).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ParlorConfig {
    /// Seed channel list; the registry may grow beyond it at runtime.
    pub channels: Vec<String>,
    /// Topic → persona-expertise fragment substituted into the prompt.
    pub personas: BTreeMap<String, String>,
    /// Chunking tuning.
    pub chunking: ChunkingConfig,
    /// Retrieval tuning.
    pub retrieval: RetrievalConfig,
    /// Chat tuning.
    pub chat: ChatTuning,
    /// Storage locations.
    pub storage: StorageConfig,
    /// Capability provider selection.
    pub providers: ProvidersConfig,
}

impl Default for ParlorConfig {
    fn default() -> Self {
        Self {
            channels: vec![
                "general".to_string(),
                "vrp".to_string(),
                "python".to_string(),
            ],
            personas: BTreeMap::new(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            chat: ChatTuning::default(),
            storage: StorageConfig::default(),
            providers: ProvidersConfig::default(),
        }
    }
}

impl ParlorConfig {
    /// Load configuration from a TOML or JSON file, dispatched by
    /// extension, after loading `.env` into the environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ParlorError> {
        dotenvy::dotenv().ok();
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&raw)
                .map_err(|err| ParlorError::Config(format!("{}: {err}", path.display()))),
            Some("json") => serde_json::from_str(&raw)
                .map_err(|err| ParlorError::Config(format!("{}: {err}", path.display()))),
            other => Err(ParlorError::Config(format!(
                "unsupported config extension {other:?} for {}",
                path.display()
            ))),
        }
    }

    /// Persona-expertise fragment for a topic, if configured.
    #[must_use]
    pub fn persona_for(&self, topic: &Topic) -> Option<&str> {
        self.personas.get(topic.as_str()).map(String::as_str)
    }
}

/// Chunking tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Character budget per passage.
    pub max_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
        }
    }
}

/// Retrieval tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Candidate count fetched from the store per query.
    pub candidates: usize,
    /// Rerank cut-off in streaming mode.
    pub streaming_top_n: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidates: RETRIEVAL_CANDIDATES,
            streaming_top_n: STREAMING_RERANK_TOP_N,
        }
    }
}

/// Chat tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatTuning {
    /// Sampling temperature for every generation call.
    pub temperature: f32,
    /// Domain the web-search connector is restricted to.
    pub web_search_site: String,
}

impl Default for ChatTuning {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            web_search_site: "arxiv.org".to_string(),
        }
    }
}

/// Storage locations for durable state.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database holding the topic passage collections.
    pub passages_db: PathBuf,
    /// JSON file the channel registry persists to.
    pub channels_file: PathBuf,
    /// JSON file conversation transcripts persist to.
    pub transcripts_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            passages_db: PathBuf::from("parlor_passages.sqlite"),
            channels_file: PathBuf::from("channels.json"),
            transcripts_file: PathBuf::from("chat_history.json"),
        }
    }
}

/// Capability provider selection, all tags validated at load time.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Chat backend.
    pub chat: ChatProviderSpec,
    /// Embedding provider.
    pub embedding: EmbeddingProviderSpec,
    /// Reranker; `None` disables reranking.
    pub reranker: Option<RerankerSpec>,
}

/// Chat backend selection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatProviderSpec {
    /// Hosted Cohere-style API; requires [`API_KEY_ENV`] in the
    /// environment.
    Cohere {
        /// Chat model name.
        #[serde(default = "default_chat_model")]
        model: String,
    },
    /// Scripted in-process backend for tests and offline runs.
    Mock,
}

impl Default for ChatProviderSpec {
    fn default() -> Self {
        Self::Mock
    }
}

/// Embedding provider selection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmbeddingProviderSpec {
    /// Deterministic local token-hashing embedder.
    Hash {
        /// Vector dimensionality.
        #[serde(default = "default_dimensions")]
        dimensions: usize,
    },
}

impl Default for EmbeddingProviderSpec {
    fn default() -> Self {
        Self::Hash {
            dimensions: DEFAULT_DIMENSIONS,
        }
    }
}

/// Reranker selection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RerankerSpec {
    /// Hosted Cohere-style rerank endpoint.
    Cohere {
        /// Rerank model name.
        #[serde(default = "default_rerank_model")]
        model: String,
    },
    /// Term-overlap reranker for tests and offline runs.
    Mock,
}

fn default_chat_model() -> String {
    DEFAULT_CHAT_MODEL.to_string()
}

fn default_rerank_model() -> String {
    DEFAULT_RERANK_MODEL.to_string()
}

fn default_dimensions() -> usize {
    DEFAULT_DIMENSIONS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_tuning() {
        let config = ParlorConfig::default();
        assert_eq!(config.channels, vec!["general", "vrp", "python"]);
        assert_eq!(config.chunking.max_chars, 3000);
        assert_eq!(config.retrieval.candidates, 20);
        assert_eq!(config.retrieval.streaming_top_n, 5);
        assert!((config.chat.temperature - 0.4).abs() < f32::EPSILON);
        assert_eq!(config.chat.web_search_site, "arxiv.org");
    }

    #[test]
    fn toml_round_trip_with_provider_tags() {
        let toml_src = r#"
            channels = ["general", "rust"]

            [personas]
            rust = "You are an expert Rust mentor."

            [providers.chat]
            kind = "cohere"
            model = "command-r"

            [providers.embedding]
            kind = "hash"
            dimensions = 128

            [providers.reranker]
            kind = "mock"
        "#;
        let config: ParlorConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.channels, vec!["general", "rust"]);
        assert_eq!(
            config.persona_for(&Topic::normalize("rust")),
            Some("You are an expert Rust mentor.")
        );
        match config.providers.chat {
            ChatProviderSpec::Cohere { ref model } => assert_eq!(model, "command-r"),
            ref other => panic!("unexpected chat provider {other:?}"),
        }
        assert!(matches!(
            config.providers.embedding,
            EmbeddingProviderSpec::Hash { dimensions: 128 }
        ));
        assert!(matches!(config.providers.reranker, Some(RerankerSpec::Mock)));
    }

    #[test]
    fn unknown_provider_kind_fails_at_load() {
        let toml_src = r#"
            [providers.chat]
            kind = "mystery_vendor"
        "#;
        assert!(toml::from_str::<ParlorConfig>(toml_src).is_err());
    }

    #[test]
    fn load_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("parlor.json");
        std::fs::write(&json_path, r#"{"channels": ["only"]}"#).unwrap();
        let config = ParlorConfig::load(&json_path).unwrap();
        assert_eq!(config.channels, vec!["only"]);

        let bad_path = dir.path().join("parlor.yaml");
        std::fs::write(&bad_path, "channels: [a]").unwrap();
        assert!(matches!(
            ParlorConfig::load(&bad_path),
            Err(ParlorError::Config(_))
        ));
    }
}
