//! Chat message records and client-side content validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::user::UserId;

/// Maximum message length in characters accepted by the client.
pub const MAX_CONTENT_CHARS: usize = 4096;

/// Server-assigned message identifier.
///
/// Ids grow with send order inside a conversation, so they are the
/// ordering key for a conversation's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(i64);

impl MessageId {
    /// Wraps a raw server identifier.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw server identifier.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A server-confirmed chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned id.
    pub id: MessageId,
    /// Author of the message.
    pub sender: UserId,
    /// Addressee of the message.
    pub receiver: UserId,
    /// Text body.
    pub content: String,
    /// When the server accepted the message.
    pub timestamp: DateTime<Utc>,
    /// Whether the receiver has read it.
    #[serde(default)]
    pub is_read: bool,
}

impl Message {
    /// Returns `true` if this message belongs to the conversation between
    /// `a` and `b`, in either direction.
    #[must_use]
    pub fn is_between(&self, a: UserId, b: UserId) -> bool {
        (self.sender == a && self.receiver == b) || (self.sender == b && self.receiver == a)
    }
}

/// Body of a send request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    /// Who the message is for.
    pub receiver: UserId,
    /// Text body.
    pub content: String,
}

/// Reasons a message body is refused before it is sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The body is empty or only whitespace.
    #[error("message is empty")]
    Empty,

    /// The body exceeds [`MAX_CONTENT_CHARS`].
    #[error("message too long: {chars} characters (max {max})")]
    TooLong {
        /// Actual length in characters.
        chars: usize,
        /// Maximum allowed length.
        max: usize,
    },
}

/// Checks that `content` is worth sending.
///
/// # Errors
///
/// Returns [`ValidationError::Empty`] for blank input and
/// [`ValidationError::TooLong`] past [`MAX_CONTENT_CHARS`].
pub fn validate_content(content: &str) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::Empty);
    }
    let chars = content.chars().count();
    if chars > MAX_CONTENT_CHARS {
        return Err(ValidationError::TooLong {
            chars,
            max: MAX_CONTENT_CHARS,
        });
    }
    Ok(())
}

/// Puts a fetched history into conversation order: ascending id, one entry
/// per id. The last copy of a repeated id wins.
#[must_use]
pub fn conversation_order(mut messages: Vec<Message>) -> Vec<Message> {
    messages.reverse();
    messages.sort_by_key(|m| m.id);
    messages.dedup_by_key(|m| m.id);
    messages
}
