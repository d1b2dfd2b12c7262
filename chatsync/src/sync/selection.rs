//! Conversation selection lifecycle.
//!
//! Selecting a peer bumps the selection epoch before anything else, so every
//! response issued for an earlier selection is recognizably stale. It then
//! tears down the previous conversation loops, resets the per-conversation
//! slices, runs the initial load (messages, then block status, then
//! presence) and only then starts the new conversation loops.

use std::sync::Arc;

use parking_lot::RwLock;

use chatsync_proto::user::UserId;

use super::poller::{self, FirstTick};
use super::presence::PresenceMap;
use super::{ChatClient, Shared, SyncEvent, block, messages, presence};
use crate::api::ChatApi;

/// The active peer together with the epoch it was selected in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    /// Bumped on every selection change, including logout.
    pub epoch: u64,
    /// The active peer, if any.
    pub peer: Option<UserId>,
}

/// Atomically readable current selection.
#[derive(Debug, Default)]
pub(crate) struct SelectionCell(RwLock<Selection>);

impl SelectionCell {
    /// Start a new selection and return it.
    pub(crate) fn begin(&self, peer: Option<UserId>) -> Selection {
        let mut current = self.0.write();
        current.epoch += 1;
        current.peer = peer;
        *current
    }

    pub(crate) fn current(&self) -> Selection {
        *self.0.read()
    }

    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        self.0.read().epoch == epoch
    }
}

impl<A: ChatApi + 'static> ChatClient<A> {
    /// Make `peer` the active conversation, or clear it with `None`.
    ///
    /// Returns once the initial load has finished and the conversation
    /// loops are running. If another `select` overtakes this one, this call
    /// returns without starting any loops. Initial load failures are logged
    /// and the load carries on with the next step.
    pub async fn select(&self, peer: Option<UserId>) {
        let shared = &self.shared;
        if shared.is_closed() {
            return;
        }
        let selection = shared.selection.begin(peer);
        self.loops.lock().conversation.abort_all();
        reset_conversation(shared, selection);
        tracing::info!(epoch = selection.epoch, peer = ?peer, "conversation selected");
        shared.emit(SyncEvent::SelectionChanged { peer });
        shared.emit(SyncEvent::UnreadChanged);

        let Some(peer) = peer else {
            return;
        };

        messages::poll(shared, selection, peer).await;
        if !shared.accepts(selection.epoch) {
            return;
        }
        block::load(shared, selection, peer).await;
        if !shared.accepts(selection.epoch) {
            return;
        }
        presence::poll_peer(shared, selection, peer).await;

        let mut loops = self.loops.lock();
        if !shared.accepts(selection.epoch) {
            tracing::debug!(epoch = selection.epoch, "selection superseded during initial load");
            return;
        }
        loops
            .conversation
            .push(spawn_message_loop(shared, selection, peer));
        loops
            .conversation
            .push(spawn_peer_presence_loop(shared, selection, peer));
    }
}

/// Reset every per-conversation slice, unless a newer selection already
/// owns it.
fn reset_conversation<A: ChatApi>(shared: &Shared<A>, selection: Selection) {
    {
        let mut log = shared.messages.lock();
        if shared.selection.is_current(selection.epoch) {
            log.clear();
        }
    }
    {
        let mut relation = shared.block.lock();
        if shared.selection.is_current(selection.epoch) {
            *relation = None;
        }
    }
    {
        let mut map = shared.peer_presence.lock();
        if shared.selection.is_current(selection.epoch) {
            *map = PresenceMap::default();
        }
    }
    {
        let mut unread = shared.unread.lock();
        if shared.selection.is_current(selection.epoch) {
            unread.zero(selection.peer);
        }
    }
}

fn spawn_message_loop<A: ChatApi + 'static>(
    shared: &Arc<Shared<A>>,
    selection: Selection,
    peer: UserId,
) -> tokio::task::JoinHandle<()> {
    let shared = Arc::clone(shared);
    poller::spawn(
        "messages",
        shared.config.message_interval,
        FirstTick::AfterPeriod,
        move || {
            let shared = Arc::clone(&shared);
            async move {
                messages::poll(&shared, selection, peer).await;
                // A failed initial block load leaves the gate closed; retry it.
                let unknown = shared.block.lock().is_none();
                if unknown {
                    block::load(&shared, selection, peer).await;
                }
            }
        },
    )
}

fn spawn_peer_presence_loop<A: ChatApi + 'static>(
    shared: &Arc<Shared<A>>,
    selection: Selection,
    peer: UserId,
) -> tokio::task::JoinHandle<()> {
    let shared = Arc::clone(shared);
    poller::spawn(
        "peer-presence",
        shared.config.peer_presence_interval,
        FirstTick::AfterPeriod,
        move || {
            let shared = Arc::clone(&shared);
            async move { presence::poll_peer(&shared, selection, peer).await }
        },
    )
}
