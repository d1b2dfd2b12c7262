//! Aggregate unread-message counters.

use serde::{Deserialize, Serialize};

use crate::user::UserId;

/// Number of unread messages the caller has from one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadEntry {
    /// The peer who sent the unread messages.
    pub user_id: UserId,
    /// How many are unread.
    pub count: u32,
}
