//! Block relationship between the caller and one peer.

use serde::{Deserialize, Serialize};

use crate::user::UserId;

/// Block state of the pair (caller, peer). The two directions are
/// independent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRelation {
    /// The caller has blocked the peer.
    #[serde(default)]
    pub blocked_by_me: bool,
    /// The peer has blocked the caller.
    #[serde(default)]
    pub blocked_me: bool,
}

impl BlockRelation {
    /// Returns `true` if either direction is blocked.
    #[must_use]
    pub const fn is_blocked(self) -> bool {
        self.blocked_by_me || self.blocked_me
    }
}

/// Body of a block request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRequest {
    /// The peer to block.
    pub user_id: UserId,
}
