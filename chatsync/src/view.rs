//! Display state derived from client snapshots.
//!
//! Pure functions: no I/O and no locking beyond the snapshot accessors of
//! [`ChatClient`].

use chrono::{DateTime, TimeZone, Timelike, Utc};

use chatsync_proto::block::BlockRelation;
use chatsync_proto::user::{UserId, UserSummary};

use crate::api::ChatApi;
use crate::sync::ChatClient;
use crate::sync::messages::{LocalMessage, PendingState};
use crate::sync::presence::{Presence, PresenceMap};

/// Sidebar preview for a conversation with no messages.
pub const NO_MESSAGES: &str = "No messages yet";

/// Relative age of a last-seen time, e.g. `"5 min ago"`.
#[must_use]
pub fn format_last_seen(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds();
    if secs < 60 {
        return "a few seconds ago".to_string();
    }
    let mins = secs / 60;
    if mins < 60 {
        return format!("{mins} min ago");
    }
    let hours = mins / 60;
    if hours < 24 {
        return format!("{hours} hr{} ago", plural(hours));
    }
    let days = hours / 24;
    format!("{days} day{} ago", plural(days))
}

const fn plural(n: i64) -> &'static str {
    if n > 1 { "s" } else { "" }
}

/// 12-hour clock text, e.g. `"10:45 AM"`.
#[must_use]
pub fn format_clock<Tz: TimeZone>(at: &DateTime<Tz>) -> String {
    let (pm, hour) = at.hour12();
    format!(
        "{hour}:{:02} {}",
        at.minute(),
        if pm { "PM" } else { "AM" }
    )
}

/// Conversation header status line, `None` while presence is unknown.
#[must_use]
pub fn header_status(
    relation: BlockRelation,
    presence: Presence,
    now: DateTime<Utc>,
) -> Option<String> {
    if relation.blocked_by_me {
        return Some("You blocked this user".to_string());
    }
    if relation.blocked_me {
        return Some("This user has blocked you".to_string());
    }
    match presence {
        Presence::Online => Some("Online".to_string()),
        Presence::LastSeen(at) => Some(format!("Last seen {}", format_last_seen(at, now))),
        Presence::Offline => Some("Offline".to_string()),
        Presence::Unknown => None,
    }
}

/// Composer placeholder text.
#[must_use]
pub const fn input_placeholder(relation: BlockRelation) -> &'static str {
    if relation.is_blocked() {
        "You can't send messages in this chat"
    } else {
        "Type a message"
    }
}

/// Block button label, or `None` when the button is hidden.
#[must_use]
pub const fn block_button(relation: BlockRelation) -> Option<&'static str> {
    if relation.blocked_me {
        None
    } else if relation.blocked_by_me {
        Some("Unblock")
    } else {
        Some("Block")
    }
}

/// Delivery marker on the user's own messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Send request in flight.
    Sending,
    /// Send request failed.
    Failed,
    /// Stored, not read yet.
    Delivered,
    /// Read by the peer.
    Seen,
}

/// Marker for `entry`, or `None` for incoming messages.
#[must_use]
pub fn tick(entry: &LocalMessage, me: UserId) -> Option<Tick> {
    match entry {
        LocalMessage::Pending(p) => Some(match p.state {
            PendingState::Sending => Tick::Sending,
            PendingState::Failed => Tick::Failed,
        }),
        LocalMessage::Confirmed(m) if m.sender == me => {
            Some(if m.is_read { Tick::Seen } else { Tick::Delivered })
        }
        LocalMessage::Confirmed(_) => None,
    }
}

/// One row of the conversation list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidebarRow {
    /// The other user.
    pub user: UserId,
    /// Their username.
    pub username: String,
    /// Last message text, or [`NO_MESSAGES`].
    pub preview: String,
    /// When the last message was sent.
    pub last_message_time: Option<DateTime<Utc>>,
    /// Online dot.
    pub online: bool,
    /// Unread badge, only when nonzero.
    pub unread: Option<u32>,
    /// Whether this is the open conversation.
    pub active: bool,
}

/// Build sidebar rows for users whose name contains `filter`, ignoring
/// case.
#[must_use]
pub fn sidebar_rows(
    users: &[UserSummary],
    filter: &str,
    presence: &PresenceMap,
    unread: impl Fn(UserId) -> u32,
    active: Option<UserId>,
) -> Vec<SidebarRow> {
    let needle = filter.to_lowercase();
    users
        .iter()
        .filter(|s| s.user.username.to_lowercase().contains(&needle))
        .map(|s| {
            let id = s.user.id;
            let count = unread(id);
            SidebarRow {
                user: id,
                username: s.user.username.clone(),
                preview: s
                    .last_message
                    .as_deref()
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or(NO_MESSAGES)
                    .to_string(),
                last_message_time: s.last_message_time,
                online: presence.get(id).is_online(),
                unread: (count > 0).then_some(count),
                active: active == Some(id),
            }
        })
        .collect()
}

impl<A: ChatApi + 'static> ChatClient<A> {
    /// Sidebar rows from the current snapshots.
    #[must_use]
    pub fn sidebar(&self, filter: &str) -> Vec<SidebarRow> {
        sidebar_rows(
            &self.users(),
            filter,
            &self.sidebar_presence(),
            |user| self.unread(user),
            self.active_peer(),
        )
    }

    /// Header status line for the open conversation, `None` if none is open
    /// or nothing is known about the peer yet.
    #[must_use]
    pub fn header_status(&self, now: DateTime<Utc>) -> Option<String> {
        self.active_peer()?;
        header_status(self.block_relation(), self.peer_presence(), now)
    }
}
