//! Durable conversation transcripts.
//!
//! Every user/assistant exchange is recorded per user, per room, per
//! conversation id and persisted as one JSON document, so transcripts
//! survive restarts and can be read back by the transport layer
//! (`conversation history` and `conversation list` views). This is
//! process-wide state distinct from the in-session turn history the chat
//! backend sees: sessions reset when a room is joined, transcripts do
//! not.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::ParlorError;

/// One recorded transcript entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    /// Display name of the author (a user, or the assistant).
    pub sender: String,
    /// Message text.
    pub text: String,
    /// When the message was recorded, UTC.
    pub timestamp: DateTime<Utc>,
}

impl TranscriptMessage {
    /// Creates an entry timestamped now.
    #[must_use]
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

type TranscriptMap = BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<TranscriptMessage>>>>;

/// Process-wide transcript state with JSON persistence.
pub struct TranscriptStore {
    state: RwLock<TranscriptMap>,
    state_path: Option<PathBuf>,
}

impl TranscriptStore {
    /// Creates an empty, non-persisting store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(TranscriptMap::new()),
            state_path: None,
        }
    }

    /// Loads transcripts from `path` when the file exists; future saves
    /// write back there.
    pub async fn load(path: PathBuf) -> Result<Self, ParlorError> {
        let state = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let raw = tokio::fs::read_to_string(&path).await?;
            serde_json::from_str(&raw)
                .map_err(|err| ParlorError::Storage(format!("{}: {err}", path.display())))?
        } else {
            TranscriptMap::new()
        };
        Ok(Self {
            state: RwLock::new(state),
            state_path: Some(path),
        })
    }

    /// Starts a new conversation for (user, room) and returns its id.
    #[must_use]
    pub fn begin_conversation(&self, user: &str, room: &str) -> String {
        let conversation_id = Uuid::new_v4().to_string();
        self.state
            .write()
            .entry(user.to_string())
            .or_default()
            .entry(room.to_string())
            .or_default()
            .entry(conversation_id.clone())
            .or_default();
        conversation_id
    }

    /// Appends a message to a conversation, creating missing levels.
    pub fn record(
        &self,
        user: &str,
        room: &str,
        conversation_id: &str,
        message: TranscriptMessage,
    ) {
        self.state
            .write()
            .entry(user.to_string())
            .or_default()
            .entry(room.to_string())
            .or_default()
            .entry(conversation_id.to_string())
            .or_default()
            .push(message);
    }

    /// Messages of one conversation, empty when unknown.
    #[must_use]
    pub fn history(&self, user: &str, room: &str, conversation_id: &str) -> Vec<TranscriptMessage> {
        self.state
            .read()
            .get(user)
            .and_then(|rooms| rooms.get(room))
            .and_then(|conversations| conversations.get(conversation_id))
            .cloned()
            .unwrap_or_default()
    }

    /// Conversation ids per room for one user.
    #[must_use]
    pub fn conversations(&self, user: &str) -> BTreeMap<String, Vec<String>> {
        self.state
            .read()
            .get(user)
            .map(|rooms| {
                rooms
                    .iter()
                    .map(|(room, conversations)| {
                        (room.clone(), conversations.keys().cloned().collect())
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Persist the whole transcript map to the state file, if configured.
    pub async fn save(&self) -> Result<(), ParlorError> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };
        let json = {
            let state = self.state.read();
            serde_json::to_string_pretty(&*state)
                .map_err(|err| ParlorError::Storage(err.to_string()))?
        };
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

impl Default for TranscriptStore {
    fn default() -> Self {
        Self::new()
    }
}
