//! User identity records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-assigned, stable identifier of a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
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

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chat user. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable identifier.
    pub id: UserId,
    /// Display name.
    pub username: String,
}

/// A directory entry returned by the user listing, with a preview of the
/// most recent message exchanged with the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    /// The listed user.
    #[serde(flatten)]
    pub user: User,
    /// Content of the last message in the conversation, if any.
    #[serde(default)]
    pub last_message: Option<String>,
    /// When the last message was sent, if any.
    #[serde(default)]
    pub last_message_time: Option<DateTime<Utc>>,
}
