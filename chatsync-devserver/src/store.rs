//! In-memory chat store behind the development server.
//!
//! The [`ChatStore`] keeps accounts, messages, block pairs and last-activity
//! times. Nothing is persisted; a restart starts from the seeded accounts.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::RwLock;

use chatsync_proto::block::BlockRelation;
use chatsync_proto::message::{Message, MessageId, ValidationError, validate_content};
use chatsync_proto::presence::PresenceRecord;
use chatsync_proto::unread::UnreadEntry;
use chatsync_proto::user::{User, UserId, UserSummary};

/// Default window after the last request during which a user counts as
/// online.
const DEFAULT_ONLINE_WINDOW: Duration = Duration::from_secs(10);

/// Errors returned by store mutations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// One side of the conversation blocks the other.
    #[error("conversation is blocked")]
    Blocked,

    /// The addressed user does not exist.
    #[error("unknown user {0}")]
    UnknownUser(UserId),

    /// The message body was refused.
    #[error("invalid message: {0}")]
    Invalid(#[from] ValidationError),
}

#[derive(Debug)]
struct Account {
    user: User,
    token: String,
}

#[derive(Debug, Default)]
struct Inner {
    accounts: Vec<Account>,
    messages: Vec<Message>,
    next_message_id: i64,
    /// `(blocker, blocked)` pairs.
    blocks: HashSet<(UserId, UserId)>,
    last_seen: HashMap<UserId, DateTime<Utc>>,
}

impl Inner {
    fn user(&self, id: UserId) -> Option<&User> {
        self.accounts.iter().map(|a| &a.user).find(|u| u.id == id)
    }

    fn conversation(&self, a: UserId, b: UserId) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(move |m| m.is_between(a, b))
    }

    fn relation(&self, me: UserId, peer: UserId) -> BlockRelation {
        BlockRelation {
            blocked_by_me: self.blocks.contains(&(me, peer)),
            blocked_me: self.blocks.contains(&(peer, me)),
        }
    }
}

/// Shared in-memory state of the development server.
pub struct ChatStore {
    inner: RwLock<Inner>,
    online_window: TimeDelta,
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatStore {
    /// Creates an empty store with the default online window.
    #[must_use]
    pub fn new() -> Self {
        Self::with_online_window(DEFAULT_ONLINE_WINDOW)
    }

    /// Creates an empty store where a user stays online for `window` after
    /// their last request.
    #[must_use]
    pub fn with_online_window(window: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            online_window: TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Registers an account and returns its user record.
    #[allow(clippy::cast_possible_wrap)]
    pub async fn add_user(&self, username: &str, token: &str) -> User {
        let mut inner = self.inner.write().await;
        // Account counts stay far below i64::MAX.
        let user = User {
            id: UserId::new(inner.accounts.len() as i64 + 1),
            username: username.to_string(),
        };
        inner.accounts.push(Account {
            user: user.clone(),
            token: token.to_string(),
        });
        user
    }

    /// Resolves a bearer token and records the caller as active.
    pub async fn authenticate(&self, token: &str) -> Option<User> {
        let mut inner = self.inner.write().await;
        let user = inner
            .accounts
            .iter()
            .find(|a| a.token == token)
            .map(|a| a.user.clone())?;
        inner.last_seen.insert(user.id, Utc::now());
        Some(user)
    }

    /// Every user except `me`, with the last message exchanged with `me`.
    pub async fn users_for(&self, me: UserId) -> Vec<UserSummary> {
        let inner = self.inner.read().await;
        inner
            .accounts
            .iter()
            .filter(|a| a.user.id != me)
            .map(|a| {
                let last = inner.conversation(me, a.user.id).last();
                UserSummary {
                    user: a.user.clone(),
                    last_message: last.map(|m| m.content.clone()),
                    last_message_time: last.map(|m| m.timestamp),
                }
            })
            .collect()
    }

    /// Full history between `me` and `peer`, ascending by id. Messages from
    /// `peer` to `me` are marked read.
    pub async fn conversation(&self, me: UserId, peer: UserId) -> Vec<Message> {
        let mut inner = self.inner.write().await;
        for m in &mut inner.messages {
            if m.sender == peer && m.receiver == me {
                m.is_read = true;
            }
        }
        inner.conversation(me, peer).cloned().collect()
    }

    /// Stores a message from `me` to `receiver`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for a blank or oversized body,
    /// [`StoreError::UnknownUser`] if `receiver` does not exist, and
    /// [`StoreError::Blocked`] if either side blocks the other.
    pub async fn send(
        &self,
        me: UserId,
        receiver: UserId,
        content: &str,
    ) -> Result<Message, StoreError> {
        validate_content(content)?;
        let mut inner = self.inner.write().await;
        if inner.user(receiver).is_none() {
            return Err(StoreError::UnknownUser(receiver));
        }
        if inner.relation(me, receiver).is_blocked() {
            return Err(StoreError::Blocked);
        }
        inner.next_message_id += 1;
        let message = Message {
            id: MessageId::new(inner.next_message_id),
            sender: me,
            receiver,
            content: content.to_string(),
            timestamp: Utc::now(),
            is_read: false,
        };
        inner.messages.push(message.clone());
        drop(inner);
        Ok(message)
    }

    /// Block relation between `me` and `peer`.
    pub async fn block_status(&self, me: UserId, peer: UserId) -> BlockRelation {
        self.inner.read().await.relation(me, peer)
    }

    /// Records that `me` blocks `peer`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownUser`] if `peer` does not exist.
    pub async fn block(&self, me: UserId, peer: UserId) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.user(peer).is_none() {
            return Err(StoreError::UnknownUser(peer));
        }
        inner.blocks.insert((me, peer));
        Ok(())
    }

    /// Removes `me`'s block on `peer`, if any.
    pub async fn unblock(&self, me: UserId, peer: UserId) {
        self.inner.write().await.blocks.remove(&(me, peer));
    }

    /// Presence of every account.
    pub async fn presence(&self) -> Vec<PresenceRecord> {
        let now = Utc::now();
        let inner = self.inner.read().await;
        inner
            .accounts
            .iter()
            .map(|a| {
                let last_seen = inner.last_seen.get(&a.user.id).copied();
                PresenceRecord {
                    user_id: a.user.id,
                    online: last_seen.is_some_and(|at| now - at <= self.online_window),
                    last_seen,
                }
            })
            .collect()
    }

    /// Unread messages addressed to `me`, counted per sender. Senders with
    /// nothing unread are omitted.
    pub async fn unread_counts(&self, me: UserId) -> Vec<UnreadEntry> {
        let inner = self.inner.read().await;
        let mut counts: BTreeMap<UserId, u32> = BTreeMap::new();
        for m in inner.messages.iter().filter(|m| m.receiver == me && !m.is_read) {
            *counts.entry(m.sender).or_default() += 1;
        }
        counts
            .into_iter()
            .map(|(user_id, count)| UnreadEntry { user_id, count })
            .collect()
    }
}
