//! In-process service double for testing.
//!
//! [`MemoryApi`] answers [`ChatApi`] calls from in-memory state seen from
//! one signed-in user. Tests can script the other side of the conversation
//! (incoming messages, presence, unread counters, the peer's block), inject
//! failures per endpoint, and hold responses back to deliver them late.
//!
//! Clones share the same state, so a test keeps one handle while the
//! client under test owns another.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use chatsync_proto::block::BlockRelation;
use chatsync_proto::message::{Message, MessageId};
use chatsync_proto::presence::PresenceRecord;
use chatsync_proto::unread::UnreadEntry;
use chatsync_proto::user::{User, UserId, UserSummary};

use super::{ApiError, ChatApi, Credential};

/// The remote operations, used to address faults and holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `current_user`
    CurrentUser,
    /// `list_users`
    ListUsers,
    /// `list_messages`
    ListMessages,
    /// `send_message`
    SendMessage,
    /// `block_status`
    BlockStatus,
    /// `set_block`
    SetBlock,
    /// `clear_block`
    ClearBlock,
    /// `presence`
    Presence,
    /// `unread_counts`
    UnreadCounts,
}

/// One recorded call, in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Call {
    /// Which operation was called.
    pub endpoint: Endpoint,
    /// The peer argument, for peer-scoped operations.
    pub peer: Option<UserId>,
}

struct ServiceState {
    me: User,
    token: String,
    users: Vec<User>,
    messages: Vec<Message>,
    next_id: i64,
    presence: Vec<PresenceRecord>,
    unread: BTreeMap<UserId, u32>,
    blocked_by_me: HashSet<UserId>,
    blocked_me: HashSet<UserId>,
}

impl ServiceState {
    fn conversation(&self, peer: UserId) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| m.is_between(self.me.id, peer))
            .cloned()
            .collect()
    }

    fn store(&mut self, sender: UserId, receiver: UserId, content: &str) -> Message {
        self.next_id += 1;
        let message = Message {
            id: MessageId::new(self.next_id),
            sender,
            receiver,
            content: content.to_string(),
            timestamp: Utc::now(),
            is_read: false,
        };
        self.messages.push(message.clone());
        message
    }
}

struct Hold {
    gate: Arc<Semaphore>,
    active: bool,
}

struct Inner {
    state: Mutex<ServiceState>,
    failing: Mutex<HashSet<Endpoint>>,
    holds: Mutex<HashMap<Endpoint, Hold>>,
    calls: Mutex<Vec<Call>>,
}

/// Scriptable in-memory chat service.
#[derive(Clone)]
pub struct MemoryApi {
    inner: Arc<Inner>,
}

impl MemoryApi {
    /// Create a service where `me` is signed in with `token`.
    pub fn new(me: User, token: impl Into<String>) -> Self {
        let state = ServiceState {
            me,
            token: token.into(),
            users: Vec::new(),
            messages: Vec::new(),
            next_id: 0,
            presence: Vec::new(),
            unread: BTreeMap::new(),
            blocked_by_me: HashSet::new(),
            blocked_me: HashSet::new(),
        };
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                failing: Mutex::new(HashSet::new()),
                holds: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Add a user to the directory.
    pub fn add_user(&self, user: User) {
        self.inner.state.lock().users.push(user);
    }

    /// Store a message from `from` to the signed-in user and bump the
    /// unread counter for `from`.
    pub fn deliver(&self, from: UserId, content: &str) -> Message {
        let mut state = self.inner.state.lock();
        let me = state.me.id;
        let message = state.store(from, me, content);
        *state.unread.entry(from).or_default() += 1;
        message
    }

    /// Replace the presence snapshot.
    pub fn set_presence(&self, records: Vec<PresenceRecord>) {
        self.inner.state.lock().presence = records;
    }

    /// Set the unread counter for `peer`. Zero removes the entry.
    pub fn set_unread(&self, peer: UserId, count: u32) {
        let mut state = self.inner.state.lock();
        if count == 0 {
            state.unread.remove(&peer);
        } else {
            state.unread.insert(peer, count);
        }
    }

    /// Set whether `peer` has blocked the signed-in user.
    pub fn set_blocked_me(&self, peer: UserId, blocked: bool) {
        let mut state = self.inner.state.lock();
        if blocked {
            state.blocked_me.insert(peer);
        } else {
            state.blocked_me.remove(&peer);
        }
    }

    /// Whether the signed-in user currently blocks `peer`, server side.
    #[must_use]
    pub fn is_blocked_by_me(&self, peer: UserId) -> bool {
        self.inner.state.lock().blocked_by_me.contains(&peer)
    }

    /// Server-side history between the signed-in user and `peer`.
    #[must_use]
    pub fn messages_with(&self, peer: UserId) -> Vec<Message> {
        self.inner.state.lock().conversation(peer)
    }

    /// Make every call to `endpoint` fail until [`recover`](Self::recover).
    pub fn fail(&self, endpoint: Endpoint) {
        self.inner.failing.lock().insert(endpoint);
    }

    /// Stop injecting failures on `endpoint`.
    pub fn recover(&self, endpoint: Endpoint) {
        self.inner.failing.lock().remove(&endpoint);
    }

    /// Hold back responses on `endpoint` until [`release`](Self::release)
    /// hands out permits, one response per permit.
    pub fn hold(&self, endpoint: Endpoint) {
        self.inner.holds.lock().insert(
            endpoint,
            Hold {
                gate: Arc::new(Semaphore::new(0)),
                active: true,
            },
        );
    }

    /// Let new calls on `endpoint` through immediately. Responses already
    /// waiting stay held until released.
    pub fn pass_through(&self, endpoint: Endpoint) {
        if let Some(hold) = self.inner.holds.lock().get_mut(&endpoint) {
            hold.active = false;
        }
    }

    /// Release `n` held responses on `endpoint`, oldest first.
    pub fn release(&self, endpoint: Endpoint, n: usize) {
        if let Some(hold) = self.inner.holds.lock().get(&endpoint) {
            hold.gate.add_permits(n);
        }
    }

    /// Every call received so far, in arrival order.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.inner.calls.lock().clone()
    }

    /// Number of calls received on `endpoint`.
    #[must_use]
    pub fn call_count(&self, endpoint: Endpoint) -> usize {
        self.inner
            .calls
            .lock()
            .iter()
            .filter(|c| c.endpoint == endpoint)
            .count()
    }

    /// Record the call, check faults and the credential, then compute the
    /// answer from the current state.
    fn answer<T>(
        &self,
        endpoint: Endpoint,
        peer: Option<UserId>,
        credential: &Credential,
        f: impl FnOnce(&mut ServiceState) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        self.inner.calls.lock().push(Call { endpoint, peer });
        if self.inner.failing.lock().contains(&endpoint) {
            return Err(ApiError::Unavailable(format!(
                "injected failure on {endpoint:?}"
            )));
        }
        let mut state = self.inner.state.lock();
        if credential.token() != state.token {
            return Err(ApiError::Unauthorized);
        }
        f(&mut state)
    }

    /// Wait for a permit if `endpoint` is held.
    async fn gate(&self, endpoint: Endpoint) {
        let gate = self
            .inner
            .holds
            .lock()
            .get(&endpoint)
            .filter(|hold| hold.active)
            .map(|hold| Arc::clone(&hold.gate));
        if let Some(gate) = gate
            && let Ok(permit) = gate.acquire().await
        {
            permit.forget();
        }
    }
}

impl ChatApi for MemoryApi {
    async fn current_user(&self, credential: &Credential) -> Result<User, ApiError> {
        let result = self.answer(Endpoint::CurrentUser, None, credential, |s| Ok(s.me.clone()));
        self.gate(Endpoint::CurrentUser).await;
        result
    }

    async fn list_users(&self, credential: &Credential) -> Result<Vec<UserSummary>, ApiError> {
        let result = self.answer(Endpoint::ListUsers, None, credential, |s| {
            Ok(s.users
                .iter()
                .map(|user| {
                    let last = s.conversation(user.id).pop();
                    UserSummary {
                        user: user.clone(),
                        last_message_time: last.as_ref().map(|m| m.timestamp),
                        last_message: last.map(|m| m.content),
                    }
                })
                .collect())
        });
        self.gate(Endpoint::ListUsers).await;
        result
    }

    async fn list_messages(
        &self,
        credential: &Credential,
        peer: UserId,
    ) -> Result<Vec<Message>, ApiError> {
        let result = self.answer(Endpoint::ListMessages, Some(peer), credential, |s| {
            Ok(s.conversation(peer))
        });
        self.gate(Endpoint::ListMessages).await;
        result
    }

    async fn send_message(
        &self,
        credential: &Credential,
        peer: UserId,
        content: &str,
    ) -> Result<Message, ApiError> {
        let result = self.answer(Endpoint::SendMessage, Some(peer), credential, |s| {
            if s.blocked_by_me.contains(&peer) || s.blocked_me.contains(&peer) {
                return Err(ApiError::Status {
                    status: 403,
                    body: "conversation is blocked".into(),
                });
            }
            let me = s.me.id;
            Ok(s.store(me, peer, content))
        });
        self.gate(Endpoint::SendMessage).await;
        result
    }

    async fn block_status(
        &self,
        credential: &Credential,
        peer: UserId,
    ) -> Result<BlockRelation, ApiError> {
        let result = self.answer(Endpoint::BlockStatus, Some(peer), credential, |s| {
            Ok(BlockRelation {
                blocked_by_me: s.blocked_by_me.contains(&peer),
                blocked_me: s.blocked_me.contains(&peer),
            })
        });
        self.gate(Endpoint::BlockStatus).await;
        result
    }

    async fn set_block(&self, credential: &Credential, peer: UserId) -> Result<(), ApiError> {
        let result = self.answer(Endpoint::SetBlock, Some(peer), credential, |s| {
            s.blocked_by_me.insert(peer);
            Ok(())
        });
        self.gate(Endpoint::SetBlock).await;
        result
    }

    async fn clear_block(&self, credential: &Credential, peer: UserId) -> Result<(), ApiError> {
        let result = self.answer(Endpoint::ClearBlock, Some(peer), credential, |s| {
            s.blocked_by_me.remove(&peer);
            Ok(())
        });
        self.gate(Endpoint::ClearBlock).await;
        result
    }

    async fn presence(&self, credential: &Credential) -> Result<Vec<PresenceRecord>, ApiError> {
        let result = self.answer(Endpoint::Presence, None, credential, |s| Ok(s.presence.clone()));
        self.gate(Endpoint::Presence).await;
        result
    }

    async fn unread_counts(&self, credential: &Credential) -> Result<Vec<UnreadEntry>, ApiError> {
        let result = self.answer(Endpoint::UnreadCounts, None, credential, |s| {
            Ok(s.unread
                .iter()
                .map(|(&user_id, &count)| UnreadEntry { user_id, count })
                .collect())
        });
        self.gate(Endpoint::UnreadCounts).await;
        result
    }
}
