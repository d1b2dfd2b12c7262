//! Unread counters with the selection override.
//!
//! Opening a conversation shows its unread count as zero right away, but the
//! service only learns about it when the history is fetched, so the next
//! poll may still report the old count. The selected peer's zero therefore
//! overrides polled values until a poll reports zero for that peer or the
//! peer is deselected.

use std::collections::HashMap;

use chatsync_proto::unread::UnreadEntry;
use chatsync_proto::user::UserId;

use super::{Shared, SyncEvent};
use crate::api::ChatApi;

#[derive(Debug, Default)]
pub(crate) struct UnreadCounts {
    polled: HashMap<UserId, u32>,
    /// Peer shown as zero regardless of `polled`.
    zeroed: Option<UserId>,
}

impl UnreadCounts {
    /// Show `peer` as read. Any previous override is dropped.
    pub(crate) fn zero(&mut self, peer: Option<UserId>) {
        self.zeroed = peer;
    }

    pub(crate) fn count(&self, user: UserId) -> u32 {
        if self.zeroed == Some(user) {
            return 0;
        }
        self.polled.get(&user).copied().unwrap_or(0)
    }

    /// Replace the polled counts. A peer missing from `entries` has zero
    /// unread. Returns whether any displayed count changed.
    pub(crate) fn apply_poll(&mut self, entries: Vec<UnreadEntry>) -> bool {
        let next: HashMap<UserId, u32> = entries
            .into_iter()
            .filter(|e| e.count > 0)
            .map(|e| (e.user_id, e.count))
            .collect();
        let before = self.displayed();
        if let Some(peer) = self.zeroed
            && !next.contains_key(&peer)
        {
            self.zeroed = None;
        }
        self.polled = next;
        before != self.displayed()
    }

    fn displayed(&self) -> HashMap<UserId, u32> {
        self.polled
            .iter()
            .filter(|(user, _)| self.zeroed != Some(**user))
            .map(|(&user, &count)| (user, count))
            .collect()
    }
}

/// Unread tick. The selection is read when the request is issued and the
/// response is dropped if it changed meanwhile.
pub(crate) async fn poll<A: ChatApi>(shared: &Shared<A>) {
    let selection = shared.selection.current();
    match shared.api.unread_counts(shared.credential()).await {
        Ok(entries) => {
            let changed = {
                let mut unread = shared.unread.lock();
                if !shared.accepts(selection.epoch) {
                    tracing::debug!(epoch = selection.epoch, "discarding stale unread poll");
                    return;
                }
                unread.apply_poll(entries)
            };
            if changed {
                shared.emit(SyncEvent::UnreadChanged);
            }
        }
        Err(e) => tracing::warn!(error = %e, "unread poll failed, keeping last counts"),
    }
}
