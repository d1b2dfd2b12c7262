//! Block gate for the active conversation.
//!
//! The relation is loaded with the conversation and on explicit refresh,
//! never polled. Until the first load for a selection succeeds the gate is
//! closed: nothing can be sent and the toggle does nothing. Toggling flips `blocked_by_me` locally before the request
//! is issued and keeps the new value even if the request fails.
//! `blocked_me` only ever changes through a load.

use chatsync_proto::block::BlockRelation;
use chatsync_proto::user::UserId;

use super::selection::Selection;
use super::{ChatClient, Shared, SyncEvent};
use crate::api::ChatApi;

/// Fetch the relation with `peer` and apply it if `selection` is current.
pub(crate) async fn load<A: ChatApi>(shared: &Shared<A>, selection: Selection, peer: UserId) {
    match shared.api.block_status(shared.credential(), peer).await {
        Ok(fetched) => {
            let changed = {
                let mut relation = shared.block.lock();
                if !shared.accepts(selection.epoch) {
                    tracing::debug!(peer = %peer, epoch = selection.epoch, "discarding stale block status");
                    return;
                }
                relation.replace(fetched) != Some(fetched)
            };
            if changed {
                shared.emit(SyncEvent::BlockChanged {
                    peer,
                    relation: fetched,
                });
            }
        }
        Err(e) => tracing::warn!(peer = %peer, error = %e, "block status fetch failed"),
    }
}

impl<A: ChatApi + 'static> ChatClient<A> {
    /// Re-read the block relation with the active peer.
    pub async fn refresh_block(&self) {
        let selection = self.shared.selection.current();
        if let Some(peer) = selection.peer {
            load(&self.shared, selection, peer).await;
        }
    }

    /// Block the active peer if not blocked by me, unblock otherwise.
    ///
    /// The local flag flips at once. A failed request is logged and the
    /// flag is not rolled back. Returns the relation now in effect, or
    /// `None` if no peer is selected or its relation has not loaded yet.
    pub async fn toggle_block(&self) -> Option<BlockRelation> {
        let shared = &self.shared;
        let selection = shared.selection.current();
        let Some(peer) = selection.peer else {
            tracing::debug!("block toggle ignored, no conversation selected");
            return None;
        };
        let relation = {
            let mut slot = shared.block.lock();
            if !shared.accepts(selection.epoch) {
                return None;
            }
            let Some(relation) = slot.as_mut() else {
                tracing::debug!(peer = %peer, "block toggle ignored, relation not loaded yet");
                return None;
            };
            relation.blocked_by_me = !relation.blocked_by_me;
            *relation
        };
        shared.emit(SyncEvent::BlockChanged { peer, relation });

        let result = if relation.blocked_by_me {
            shared.api.set_block(shared.credential(), peer).await
        } else {
            shared.api.clear_block(shared.credential(), peer).await
        };
        match result {
            Ok(()) => {
                tracing::info!(peer = %peer, blocked = relation.blocked_by_me, "block relation updated");
            }
            Err(e) => {
                tracing::warn!(peer = %peer, blocked = relation.blocked_by_me, error = %e, "block toggle failed, keeping local state");
            }
        }
        Some(relation)
    }
}
