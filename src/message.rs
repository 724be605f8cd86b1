//! Conversation turns exchanged between a user and the assistant.
//!
//! [`ChatTurn`] is the unit of conversation history: a role, the text of
//! the turn, and the moment it was recorded. Sessions own an append-only,
//! ordered sequence of turns (see [`crate::session`]).
//!
//! # Examples
//!
//! ```rust
//! use parlor::message::{ChatTurn, Role};
//!
//! let question = ChatTurn::user("What is a list?");
//! let answer = ChatTurn::assistant("<p>A list is an ordered collection.</p>");
//!
//! assert_eq!(question.role, Role::User);
//! assert!(answer.is_assistant());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    /// A query submitted by the user.
    User,
    /// A response generated by the assistant.
    Assistant,
}

/// One turn in a conversation: role, text, and timestamp.
///
/// Turns are immutable once appended to a session's history. Equality for
/// test assertions usually compares `role` and `text` directly, since the
/// timestamp is set at construction time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// The role of the turn's author.
    pub role: Role,
    /// The text content of the turn.
    pub text: String,
    /// When the turn was recorded, UTC.
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    /// Creates a turn with the given role and text, timestamped now.
    #[must_use]
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Creates a user turn.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Creates an assistant turn.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Returns `true` for turns authored by the user.
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    /// Returns `true` for turns authored by the assistant.
    #[must_use]
    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}
