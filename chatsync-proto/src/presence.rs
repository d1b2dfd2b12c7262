//! Online / last-seen presence records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::user::UserId;

/// One user's presence as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    /// Whose presence this is. Sent as `id` by the service.
    #[serde(rename = "id")]
    pub user_id: UserId,
    /// Whether the user is currently online.
    #[serde(default)]
    pub online: bool,
    /// Last activity, if the service has ever seen the user.
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}
