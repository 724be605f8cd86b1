//! Core domain types for the parlor orchestration crate.
//!
//! This module defines the fundamental identifiers used throughout the
//! system — [`Topic`] for document collections and [`SessionKey`] for
//! per-user-per-room conversation state — together with the crate-wide
//! error taxonomy [`ParlorError`].
//!
//! # Examples
//!
//! ```rust
//! use parlor::types::{SessionKey, Topic};
//!
//! let topic = Topic::normalize("New Topic!");
//! assert_eq!(topic.as_str(), "new_topic_");
//!
//! let key = SessionKey::new("alice", "python");
//! assert_eq!(key.room, "python");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Normalized subject identifier bound to one document collection.
///
/// A topic names both a chat room ("channel") and the vector collection
/// backing it. The identifier is always stored in normalized form:
/// lowercase, with spaces and any other non-alphanumeric character
/// replaced by underscores. Construct topics through
/// [`normalize`](Self::normalize) so the invariant holds everywhere a
/// topic travels.
///
/// # Examples
///
/// ```rust
/// use parlor::types::Topic;
///
/// assert_eq!(Topic::normalize("Python").as_str(), "python");
/// assert_eq!(Topic::normalize("vehicle routing").as_str(), "vehicle_routing");
/// assert_eq!(Topic::normalize("New Topic!").as_str(), "new_topic_");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    /// Normalize a raw room or channel name into a topic identifier.
    ///
    /// Lowercases the input, then maps every character that is not
    /// alphanumeric to an underscore. Idempotent: normalizing an already
    /// normalized topic yields the same value.
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        let normalized = raw
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        Topic(normalized)
    }

    /// The normalized identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key identifying one conversation session: a user inside a room.
///
/// Each (user, room) pair owns exactly one [`ConversationSession`]
/// (see [`crate::session`]); joining the room again resets that session.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    /// Display name of the user driving the conversation.
    pub user: String,
    /// Raw room name as the transport layer knows it.
    pub room: String,
}

impl SessionKey {
    /// Create a session key for a user in a room.
    #[must_use]
    pub fn new(user: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            room: room.into(),
        }
    }

    /// The topic this session's room binds to.
    #[must_use]
    pub fn topic(&self) -> Topic {
        Topic::normalize(&self.room)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.room)
    }
}

/// Error taxonomy for the orchestration core.
///
/// The variants mirror how each failure is handled:
///
/// - [`UnsupportedFormat`](Self::UnsupportedFormat) aborts ingestion of one
///   file and is surfaced to the uploading caller.
/// - [`InvalidHistory`](Self::InvalidHistory) is recovered locally through
///   the bounded history-repair retry; past the bound it becomes
///   [`HistoryRepairExhausted`](Self::HistoryRepairExhausted).
/// - [`Backend`](Self::Backend) is terminal for the request that hit it;
///   session turns appended before the failure remain in place.
/// - Storage and parsing failures carry the backend's message as a string,
///   keeping vendor error types out of the public API.
#[derive(Debug, Error)]
pub enum ParlorError {
    /// Document extension is not in the supported parser registry.
    #[error("unsupported document format: .{extension}")]
    UnsupportedFormat {
        /// The unrecognized file extension (without the dot).
        extension: String,
    },

    /// The chat backend rejected the request because the turn sequence is
    /// malformed (for example, history ending on an unanswered user turn).
    #[error("chat backend rejected the conversation history")]
    InvalidHistory,

    /// History repair was attempted the maximum number of times and the
    /// backend still rejected the conversation.
    #[error("history repair exhausted after {attempts} attempts")]
    HistoryRepairExhausted {
        /// Number of repair attempts made before giving up.
        attempts: usize,
    },

    /// A chat, embedding, or rerank backend failed for reasons other than
    /// invalid history (network failure, server error).
    #[error("backend failure: {0}")]
    Backend(String),

    /// Vector store or persistence failure.
    #[error("storage failure: {0}")]
    Storage(String),

    /// Document content could not be extracted.
    #[error("parse failure: {0}")]
    Parse(String),

    /// Configuration could not be loaded or validated.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem error reading or writing crate state.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
