//! Message history of the active conversation.
//!
//! Every poll returns the full history, which replaces the local sequence.
//! Messages the user has sent but no poll has confirmed yet are kept as
//! [`LocalMessage::Pending`] entries after the polled set. A pending entry is
//! reconciled away when a poll brings a message from the user with the same
//! receiver and content, a timestamp close to the entry's creation time, and
//! an id that was not in the sequence before that poll.

use std::collections::HashSet;

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use chatsync_proto::message::{Message, MessageId, conversation_order};
use chatsync_proto::user::UserId;

use super::selection::Selection;
use super::{Shared, SyncConfig, SyncEvent};
use crate::api::ChatApi;

/// Delivery state of a message the server has not confirmed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    /// The send request is in flight.
    Sending,
    /// The send request failed. The entry stays until it expires.
    Failed,
}

/// A locally created message awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    /// Client-side identity of the entry.
    pub local_id: Uuid,
    /// Who the message is for.
    pub receiver: UserId,
    /// Text body as sent.
    pub content: String,
    /// When the entry was created.
    pub created_at: DateTime<Utc>,
    /// Delivery state.
    pub state: PendingState,
}

/// One entry of the local conversation sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalMessage {
    /// Known to the server.
    Confirmed(Message),
    /// Sent from this client, not yet seen in a poll.
    Pending(PendingMessage),
}

impl LocalMessage {
    /// Text body.
    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            Self::Confirmed(m) => &m.content,
            Self::Pending(p) => &p.content,
        }
    }

    /// Server id, for confirmed entries.
    #[must_use]
    pub const fn id(&self) -> Option<MessageId> {
        match self {
            Self::Confirmed(m) => Some(m.id),
            Self::Pending(_) => None,
        }
    }
}

/// Rules for matching and expiring pending entries.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PendingRules {
    pub(crate) match_window: TimeDelta,
    pub(crate) expiry: TimeDelta,
}

impl From<&SyncConfig> for PendingRules {
    fn from(config: &SyncConfig) -> Self {
        Self {
            match_window: TimeDelta::from_std(config.pending_match_window)
                .unwrap_or(TimeDelta::MAX),
            expiry: TimeDelta::from_std(config.pending_expiry).unwrap_or(TimeDelta::MAX),
        }
    }
}

/// Local sequence of the active conversation.
#[derive(Debug, Default)]
pub(crate) struct MessageLog {
    confirmed: Vec<Message>,
    pending: Vec<PendingMessage>,
    /// Confirmed from a send response but not yet seen in a poll.
    unpolled: HashSet<MessageId>,
    /// `confirmed` followed by `pending`, as exposed to readers.
    entries: Vec<LocalMessage>,
}

impl MessageLog {
    pub(crate) fn entries(&self) -> &[LocalMessage] {
        &self.entries
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }

    /// Append a pending entry and return its local id.
    pub(crate) fn push_pending(
        &mut self,
        receiver: UserId,
        content: &str,
        now: DateTime<Utc>,
    ) -> Uuid {
        let local_id = Uuid::now_v7();
        self.pending.push(PendingMessage {
            local_id,
            receiver,
            content: content.to_string(),
            created_at: now,
            state: PendingState::Sending,
        });
        self.rebuild();
        local_id
    }

    /// Replace the pending entry `local_id` with the server's copy. If a poll
    /// already brought that message, the pending entry is simply gone.
    pub(crate) fn confirm(&mut self, local_id: Uuid, message: Message) {
        self.pending.retain(|p| p.local_id != local_id);
        if !self.confirmed.iter().any(|m| m.id == message.id) {
            self.unpolled.insert(message.id);
            let at = self.confirmed.partition_point(|m| m.id < message.id);
            self.confirmed.insert(at, message);
        }
        self.rebuild();
    }

    pub(crate) fn mark_failed(&mut self, local_id: Uuid) {
        if let Some(entry) = self.pending.iter_mut().find(|p| p.local_id == local_id) {
            entry.state = PendingState::Failed;
            self.rebuild();
        }
    }

    /// Replace the sequence with a polled history and reconcile pending
    /// entries against it. Returns whether the visible sequence changed.
    pub(crate) fn apply_poll(
        &mut self,
        polled: Vec<Message>,
        me: UserId,
        rules: PendingRules,
        now: DateTime<Utc>,
    ) -> bool {
        let mut polled = conversation_order(polled);
        let known: HashSet<MessageId> = self.confirmed.iter().map(|m| m.id).collect();
        let polled_ids: HashSet<MessageId> = polled.iter().map(|m| m.id).collect();

        // A poll issued before our send landed does not contain it yet.
        self.unpolled.retain(|id| !polled_ids.contains(id));
        let carried: Vec<Message> = self
            .confirmed
            .iter()
            .filter(|m| self.unpolled.contains(&m.id))
            .cloned()
            .collect();
        if !carried.is_empty() {
            polled.extend(carried);
            polled = conversation_order(polled);
        }

        let mut claimed: HashSet<MessageId> = HashSet::new();
        self.pending.retain(|pending| {
            let confirmation = polled.iter().find(|m| {
                m.sender == me
                    && m.receiver == pending.receiver
                    && m.content == pending.content
                    && !known.contains(&m.id)
                    && !claimed.contains(&m.id)
                    && (m.timestamp - pending.created_at).abs() <= rules.match_window
            });
            if let Some(message) = confirmation {
                claimed.insert(message.id);
                return false;
            }
            if now - pending.created_at > rules.expiry {
                tracing::warn!(
                    local_id = %pending.local_id,
                    receiver = %pending.receiver,
                    "pending message never confirmed, dropping"
                );
                return false;
            }
            true
        });

        self.confirmed = polled;
        let before = std::mem::take(&mut self.entries);
        self.rebuild();
        before != self.entries
    }

    fn rebuild(&mut self) {
        self.entries = self
            .confirmed
            .iter()
            .cloned()
            .map(LocalMessage::Confirmed)
            .chain(self.pending.iter().cloned().map(LocalMessage::Pending))
            .collect();
    }
}

/// Fetch the history with `peer` and apply it if `selection` is still
/// current. A failure keeps the last known-good sequence.
pub(crate) async fn poll<A: ChatApi>(shared: &Shared<A>, selection: Selection, peer: UserId) {
    match shared.api.list_messages(shared.credential(), peer).await {
        Ok(polled) => {
            let changed = {
                let mut log = shared.messages.lock();
                if !shared.accepts(selection.epoch) {
                    tracing::debug!(peer = %peer, epoch = selection.epoch, "discarding stale message poll");
                    return;
                }
                log.apply_poll(
                    polled,
                    shared.session.user_id(),
                    PendingRules::from(&shared.config),
                    Utc::now(),
                )
            };
            if changed {
                shared.emit(SyncEvent::MessagesChanged { peer });
            }
        }
        Err(e) => {
            tracing::warn!(peer = %peer, error = %e, "message poll failed, keeping last history");
        }
    }
}
