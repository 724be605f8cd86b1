//! Channel registry: room names mapped to topics.
//!
//! Channel names are stored normalized (lowercase, spaces and special
//! characters to underscores) and are unique. Creation is idempotent and
//! persists the list to a small JSON state file so channels survive
//! restarts; topics are never deleted in-process.

use std::path::PathBuf;

use parking_lot::RwLock;

use crate::types::{ParlorError, Topic};

/// Outcome of [`ChannelRegistry::create`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelCreation {
    /// The channel did not exist and was added and persisted.
    Created(Topic),
    /// The normalized name was already registered; nothing changed.
    AlreadyExists(Topic),
}

impl ChannelCreation {
    /// The topic the channel binds to, either way.
    #[must_use]
    pub fn topic(&self) -> &Topic {
        match self {
            Self::Created(topic) | Self::AlreadyExists(topic) => topic,
        }
    }
}

/// Ordered, unique list of channels with durable persistence.
pub struct ChannelRegistry {
    channels: RwLock<Vec<String>>,
    state_path: Option<PathBuf>,
}

impl ChannelRegistry {
    /// Creates a registry seeded with `seed` channel names, normalized
    /// and deduplicated in order. No persistence until
    /// [`with_state_path`](Self::with_state_path) is set.
    #[must_use]
    pub fn new(seed: Vec<String>) -> Self {
        let mut channels: Vec<String> = Vec::with_capacity(seed.len());
        for name in seed {
            let normalized = Topic::normalize(&name).as_str().to_string();
            if !channels.contains(&normalized) {
                channels.push(normalized);
            }
        }
        Self {
            channels: RwLock::new(channels),
            state_path: None,
        }
    }

    /// Persist the channel list to `path` on every change.
    #[must_use]
    pub fn with_state_path(mut self, path: PathBuf) -> Self {
        self.state_path = Some(path);
        self
    }

    /// Loads the registry from `path` when the file exists, otherwise
    /// seeds it with `seed`; either way future changes persist to `path`.
    pub async fn load(path: PathBuf, seed: Vec<String>) -> Result<Self, ParlorError> {
        let channels = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let raw = tokio::fs::read_to_string(&path).await?;
            let stored: Vec<String> = serde_json::from_str(&raw)
                .map_err(|err| ParlorError::Config(format!("{}: {err}", path.display())))?;
            stored
        } else {
            seed
        };
        Ok(Self::new(channels).with_state_path(path))
    }

    /// The channel list, in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.channels.read().clone()
    }

    /// Whether a channel exists, comparing normalized names.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        let normalized = Topic::normalize(name);
        self.channels
            .read()
            .iter()
            .any(|channel| channel == normalized.as_str())
    }

    /// Topic a room name binds to.
    #[must_use]
    pub fn topic_for(&self, room: &str) -> Topic {
        Topic::normalize(room)
    }

    /// Registers a channel, normalizing the name first.
    ///
    /// Idempotent: an already-registered name is a no-op reported as
    /// [`ChannelCreation::AlreadyExists`]. New channels are appended and
    /// the list is persisted before returning.
    pub async fn create(&self, name: &str) -> Result<ChannelCreation, ParlorError> {
        let topic = Topic::normalize(name);
        {
            let mut channels = self.channels.write();
            if channels.iter().any(|channel| channel == topic.as_str()) {
                return Ok(ChannelCreation::AlreadyExists(topic));
            }
            channels.push(topic.as_str().to_string());
        }
        self.persist().await?;
        tracing::info!(channel = %topic, "channel created");
        Ok(ChannelCreation::Created(topic))
    }

    async fn persist(&self) -> Result<(), ParlorError> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };
        let snapshot = self.list();
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|err| ParlorError::Storage(err.to_string()))?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_normalizes_and_is_idempotent() {
        let registry = ChannelRegistry::new(vec!["general".to_string()]);

        let first = registry.create("New Topic!").await.unwrap();
        assert_eq!(first, ChannelCreation::Created(Topic::normalize("new_topic_")));

        // Same name after normalization: no second entry.
        let second = registry.create("new topic!").await.unwrap();
        assert!(matches!(second, ChannelCreation::AlreadyExists(_)));

        let list = registry.list();
        assert_eq!(list, vec!["general", "new_topic_"]);
        assert_eq!(
            list.iter().filter(|c| c.as_str() == "new_topic_").count(),
            1
        );
    }

    #[test]
    fn seed_is_normalized_and_deduplicated() {
        let registry = ChannelRegistry::new(vec![
            "General".to_string(),
            "general".to_string(),
            "Vehicle Routing".to_string(),
        ]);
        assert_eq!(registry.list(), vec!["general", "vehicle_routing"]);
        assert!(registry.contains("GENERAL"));
    }

    #[tokio::test]
    async fn persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("channels.json");

        {
            let registry = ChannelRegistry::load(path.clone(), vec!["general".to_string()])
                .await
                .unwrap();
            registry.create("rust").await.unwrap();
        }

        let reloaded = ChannelRegistry::load(path, vec![]).await.unwrap();
        assert_eq!(reloaded.list(), vec!["general", "rust"]);
    }

    #[test]
    fn topic_for_normalizes_room_names() {
        let registry = ChannelRegistry::new(vec![]);
        assert_eq!(registry.topic_for("Python").as_str(), "python");
    }
}
