//! Presence snapshots.
//!
//! Two independent loops poll the same endpoint: the sidebar loop for the
//! whole session and the conversation loop for the active peer. Each keeps
//! its own [`PresenceMap`], replaced wholesale on every successful poll.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use chatsync_proto::presence::PresenceRecord;
use chatsync_proto::user::UserId;

use super::selection::Selection;
use super::{Shared, SyncEvent};
use crate::api::ChatApi;

/// What is known about one user's presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// The user was not in the last snapshot, or no snapshot exists yet.
    Unknown,
    /// Online now.
    Online,
    /// Offline, last seen at the given time.
    LastSeen(DateTime<Utc>),
    /// Offline, never seen.
    Offline,
}

impl Presence {
    /// Whether the user is online.
    #[must_use]
    pub const fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

impl From<&PresenceRecord> for Presence {
    fn from(record: &PresenceRecord) -> Self {
        match (record.online, record.last_seen) {
            (true, _) => Self::Online,
            (false, Some(at)) => Self::LastSeen(at),
            (false, None) => Self::Offline,
        }
    }
}

/// One presence snapshot keyed by user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceMap {
    users: HashMap<UserId, Presence>,
}

impl PresenceMap {
    /// Build a snapshot from polled records. A repeated user keeps its last
    /// record.
    #[must_use]
    pub fn from_records(records: &[PresenceRecord]) -> Self {
        Self {
            users: records
                .iter()
                .map(|r| (r.user_id, Presence::from(r)))
                .collect(),
        }
    }

    /// Presence of `user`, [`Presence::Unknown`] if absent.
    #[must_use]
    pub fn get(&self, user: UserId) -> Presence {
        self.users.get(&user).copied().unwrap_or(Presence::Unknown)
    }

    /// Number of users in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Swap in `next` and report whether anything changed.
    fn replace(&mut self, next: Self) -> bool {
        if *self == next {
            return false;
        }
        *self = next;
        true
    }
}

/// Conversation presence tick. Discarded if `selection` is no longer
/// current; a failure keeps the previous snapshot.
pub(crate) async fn poll_peer<A: ChatApi>(shared: &Shared<A>, selection: Selection, peer: UserId) {
    match shared.api.presence(shared.credential()).await {
        Ok(records) => {
            let next = PresenceMap::from_records(&records);
            let changed = {
                let mut map = shared.peer_presence.lock();
                if !shared.accepts(selection.epoch) {
                    tracing::debug!(peer = %peer, epoch = selection.epoch, "discarding stale presence poll");
                    return;
                }
                map.replace(next)
            };
            if changed {
                shared.emit(SyncEvent::PeerPresenceChanged { peer });
            }
        }
        Err(e) => {
            tracing::warn!(peer = %peer, error = %e, "conversation presence poll failed, keeping last snapshot");
        }
    }
}

/// Sidebar presence tick. Runs for the whole session.
pub(crate) async fn poll_sidebar<A: ChatApi>(shared: &Shared<A>) {
    match shared.api.presence(shared.credential()).await {
        Ok(records) => {
            let next = PresenceMap::from_records(&records);
            let changed = {
                let mut map = shared.sidebar_presence.lock();
                if shared.is_closed() {
                    return;
                }
                map.replace(next)
            };
            if changed {
                shared.emit(SyncEvent::SidebarPresenceChanged);
            }
        }
        Err(e) => tracing::warn!(error = %e, "sidebar presence poll failed, keeping last snapshot"),
    }
}
