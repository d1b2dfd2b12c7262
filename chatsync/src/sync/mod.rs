//! Polling sync engine.
//!
//! [`ChatClient`] keeps local state eventually consistent with the chat
//! service without a push channel. It runs two groups of loops:
//!
//! - session loops (sidebar presence, unread counts) that live from login
//!   to logout, and
//! - conversation loops (message history, conversation presence) that are
//!   bound to the active peer and restarted on every [`ChatClient::select`].
//!
//! Each loop owns one slice of state behind a short-lived lock. Responses
//! are tagged with the [`Selection`] they were issued for and discarded on
//! arrival if the selection has moved on.

pub mod block;
pub mod messages;
mod poller;
pub mod presence;
pub mod selection;
pub mod send;
pub mod unread;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use chatsync_proto::block::BlockRelation;
use chatsync_proto::user::{User, UserId, UserSummary};

use crate::api::{ChatApi, Credential};
use crate::session::{Session, SessionError};

use messages::{LocalMessage, MessageLog};
use poller::{FirstTick, LoopSet};
use presence::{Presence, PresenceMap};
use selection::{Selection, SelectionCell};
use unread::UnreadCounts;

pub use send::{SendError, SendOutcome, SkipReason};

/// Cadences and limits of the sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Message history poll period for the active conversation.
    pub message_interval: Duration,
    /// Presence poll period for the active conversation header.
    pub peer_presence_interval: Duration,
    /// Presence poll period for the sidebar.
    pub sidebar_presence_interval: Duration,
    /// Unread counts poll period.
    pub unread_interval: Duration,
    /// How far a polled message's timestamp may sit from a pending entry's
    /// creation time and still be its confirmation.
    pub pending_match_window: Duration,
    /// How long an unmatched pending entry is kept.
    pub pending_expiry: Duration,
    /// Capacity of the [`SyncEvent`] channel.
    pub event_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            message_interval: Duration::from_secs(1),
            peer_presence_interval: Duration::from_secs(5),
            sidebar_presence_interval: Duration::from_secs(3),
            unread_interval: Duration::from_secs(2),
            pending_match_window: Duration::from_secs(120),
            pending_expiry: Duration::from_secs(30),
            event_buffer: 64,
        }
    }
}

/// Notifications emitted whenever a slice of client state changes.
///
/// Events carry no state; read the new values through the [`ChatClient`]
/// accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The active peer changed.
    SelectionChanged {
        /// The new active peer, if any.
        peer: Option<UserId>,
    },
    /// The active conversation's message sequence changed.
    MessagesChanged {
        /// The conversation's peer.
        peer: UserId,
    },
    /// The conversation presence snapshot changed.
    PeerPresenceChanged {
        /// The conversation's peer.
        peer: UserId,
    },
    /// The sidebar presence snapshot changed.
    SidebarPresenceChanged,
    /// Displayed unread counts changed.
    UnreadChanged,
    /// The block relation with the active peer changed.
    BlockChanged {
        /// The conversation's peer.
        peer: UserId,
        /// The relation now in effect locally.
        relation: BlockRelation,
    },
    /// The user directory was reloaded.
    UsersChanged,
    /// A send request failed. The draft was kept.
    SendFailed {
        /// Who the message was for.
        peer: UserId,
        /// Human-readable cause.
        reason: String,
    },
    /// The session ended.
    LoggedOut,
}

/// State shared between the client handle and its loops.
pub(crate) struct Shared<A> {
    pub(crate) api: A,
    pub(crate) session: Session,
    pub(crate) config: SyncConfig,
    pub(crate) selection: SelectionCell,
    pub(crate) messages: Mutex<MessageLog>,
    /// `None` until the active conversation's relation has loaded.
    pub(crate) block: Mutex<Option<BlockRelation>>,
    pub(crate) peer_presence: Mutex<PresenceMap>,
    pub(crate) sidebar_presence: Mutex<PresenceMap>,
    pub(crate) unread: Mutex<UnreadCounts>,
    pub(crate) users: Mutex<Vec<UserSummary>>,
    pub(crate) composer: Mutex<String>,
    closed: AtomicBool,
    events: mpsc::Sender<SyncEvent>,
}

impl<A: ChatApi> Shared<A> {
    pub(crate) fn credential(&self) -> &Credential {
        self.session.credential()
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        let _ = self.events.try_send(event);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether a response issued under `epoch` may still be applied.
    pub(crate) fn accepts(&self, epoch: u64) -> bool {
        !self.is_closed() && self.selection.is_current(epoch)
    }
}

#[derive(Default)]
struct Loops {
    session: LoopSet,
    conversation: LoopSet,
}

/// Handle to a signed-in chat session and its sync loops.
///
/// Dropping the client stops every loop.
pub struct ChatClient<A: ChatApi + 'static> {
    shared: Arc<Shared<A>>,
    loops: Mutex<Loops>,
}

impl<A: ChatApi + 'static> ChatClient<A> {
    /// Sign in with `credential` and start the session loops.
    ///
    /// The user directory is loaded once before returning. Returns the client
    /// and the receiving end of its event channel.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Rejected`] if the service does not accept the
    /// credential. No loops are started in that case.
    pub async fn login(
        api: A,
        credential: Credential,
        config: SyncConfig,
    ) -> Result<(Self, mpsc::Receiver<SyncEvent>), SessionError> {
        let session = Session::establish(&api, credential).await?;
        let (events, event_rx) = mpsc::channel(config.event_buffer.max(1));
        let shared = Arc::new(Shared {
            api,
            session,
            config,
            selection: SelectionCell::default(),
            messages: Mutex::new(MessageLog::default()),
            block: Mutex::new(None),
            peer_presence: Mutex::new(PresenceMap::default()),
            sidebar_presence: Mutex::new(PresenceMap::default()),
            unread: Mutex::new(UnreadCounts::default()),
            users: Mutex::new(Vec::new()),
            composer: Mutex::new(String::new()),
            closed: AtomicBool::new(false),
            events,
        });
        let client = Self {
            shared,
            loops: Mutex::new(Loops::default()),
        };
        client.refresh_users().await;
        client.start_session_loops();
        Ok((client, event_rx))
    }

    fn start_session_loops(&self) {
        let sidebar = {
            let shared = Arc::clone(&self.shared);
            poller::spawn(
                "sidebar-presence",
                shared.config.sidebar_presence_interval,
                FirstTick::Immediate,
                move || {
                    let shared = Arc::clone(&shared);
                    async move { presence::poll_sidebar(&shared).await }
                },
            )
        };
        let unread = {
            let shared = Arc::clone(&self.shared);
            poller::spawn(
                "unread",
                shared.config.unread_interval,
                FirstTick::Immediate,
                move || {
                    let shared = Arc::clone(&shared);
                    async move { unread::poll(&shared).await }
                },
            )
        };
        let mut loops = self.loops.lock();
        loops.session.push(sidebar);
        loops.session.push(unread);
    }

    /// End the session: stop every loop, discard in-flight responses and
    /// clear all local state.
    pub fn logout(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.selection.begin(None);
        {
            let mut loops = self.loops.lock();
            loops.conversation.abort_all();
            loops.session.abort_all();
        }
        let shared = &self.shared;
        shared.messages.lock().clear();
        *shared.block.lock() = None;
        *shared.peer_presence.lock() = PresenceMap::default();
        *shared.sidebar_presence.lock() = PresenceMap::default();
        *shared.unread.lock() = UnreadCounts::default();
        shared.users.lock().clear();
        shared.composer.lock().clear();
        tracing::info!(user = %shared.session.user_id(), "logged out");
        shared.emit(SyncEvent::LoggedOut);
    }

    /// Reload the user directory.
    ///
    /// A failure keeps the previous directory.
    pub async fn refresh_users(&self) {
        let shared = &self.shared;
        match shared.api.list_users(shared.credential()).await {
            Ok(users) => {
                if shared.is_closed() {
                    return;
                }
                *shared.users.lock() = users;
                shared.emit(SyncEvent::UsersChanged);
            }
            Err(e) => tracing::warn!(error = %e, "user directory fetch failed"),
        }
    }

    /// The signed-in user.
    #[must_use]
    pub fn me(&self) -> &User {
        self.shared.session.user()
    }

    /// Whether [`logout`](Self::logout) has been called.
    #[must_use]
    pub fn is_logged_out(&self) -> bool {
        self.shared.is_closed()
    }

    /// The current selection.
    #[must_use]
    pub fn selection(&self) -> Selection {
        self.shared.selection.current()
    }

    /// The active peer, if any.
    #[must_use]
    pub fn active_peer(&self) -> Option<UserId> {
        self.shared.selection.current().peer
    }

    /// The active conversation: confirmed messages in id order, then
    /// pending entries in send order.
    #[must_use]
    pub fn messages(&self) -> Vec<LocalMessage> {
        self.shared.messages.lock().entries().to_vec()
    }

    /// Block relation with the active peer. Both flags read false until
    /// the relation has loaded; see [`block_known`](Self::block_known).
    #[must_use]
    pub fn block_relation(&self) -> BlockRelation {
        self.shared.block.lock().unwrap_or_default()
    }

    /// Whether the block relation with the active peer has loaded.
    #[must_use]
    pub fn block_known(&self) -> bool {
        self.shared.block.lock().is_some()
    }

    /// Whether a send would currently be issued: a peer is selected, its
    /// block relation has loaded and neither side blocks the other.
    #[must_use]
    pub fn can_send(&self) -> bool {
        self.active_peer().is_some()
            && self.shared.block.lock().is_some_and(|relation| !relation.is_blocked())
    }

    /// Presence of the active peer from the conversation loop.
    #[must_use]
    pub fn peer_presence(&self) -> Presence {
        self.active_peer()
            .map_or(Presence::Unknown, |peer| self.shared.peer_presence.lock().get(peer))
    }

    /// Snapshot of the sidebar presence loop.
    #[must_use]
    pub fn sidebar_presence(&self) -> PresenceMap {
        self.shared.sidebar_presence.lock().clone()
    }

    /// Displayed unread count for `user`.
    #[must_use]
    pub fn unread(&self, user: UserId) -> u32 {
        self.shared.unread.lock().count(user)
    }

    /// The user directory as last loaded.
    #[must_use]
    pub fn users(&self) -> Vec<UserSummary> {
        self.shared.users.lock().clone()
    }

    /// Replace the composer contents.
    pub fn set_draft(&self, text: impl Into<String>) {
        *self.shared.composer.lock() = text.into();
    }

    /// Current composer contents.
    #[must_use]
    pub fn draft(&self) -> String {
        self.shared.composer.lock().clone()
    }
}

impl<A: ChatApi + 'static> Drop for ChatClient<A> {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
    }
}
