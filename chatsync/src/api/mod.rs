//! Remote chat service abstraction.
//!
//! Defines the [`ChatApi`] trait that the sync engine drives. Concrete
//! implementations include:
//! - [`http::HttpApi`] — the JSON-over-HTTP service binding
//! - [`memory::MemoryApi`] — in-process service double for tests

pub mod http;
pub mod memory;

use std::fmt;

use chatsync_proto::block::BlockRelation;
use chatsync_proto::message::Message;
use chatsync_proto::presence::PresenceRecord;
use chatsync_proto::unread::UnreadEntry;
use chatsync_proto::user::{User, UserId, UserSummary};

/// Bearer credential presented on every call.
///
/// The token never appears in `Debug` output so it cannot leak into logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap an access token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Return the raw token for the transport layer.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Errors that can occur when calling the chat service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The credential was rejected.
    #[error("credential rejected by service")]
    Unauthorized,

    /// The service answered with an unexpected status.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The request never completed (connect, timeout, I/O).
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body did not match the expected record.
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The service could not be reached for a reason other than HTTP.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

/// Async interface to the chat service.
///
/// Every call carries the session [`Credential`]. Implementations perform a
/// single attempt per call; the sync engine never retries.
pub trait ChatApi: Send + Sync {
    /// Identify the owner of `credential`.
    fn current_user(
        &self,
        credential: &Credential,
    ) -> impl std::future::Future<Output = Result<User, ApiError>> + Send;

    /// List every other user with a preview of the last exchanged message.
    fn list_users(
        &self,
        credential: &Credential,
    ) -> impl std::future::Future<Output = Result<Vec<UserSummary>, ApiError>> + Send;

    /// Full message history with `peer`, ascending by id.
    fn list_messages(
        &self,
        credential: &Credential,
        peer: UserId,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, ApiError>> + Send;

    /// Send `content` to `peer`, returning the stored message.
    fn send_message(
        &self,
        credential: &Credential,
        peer: UserId,
        content: &str,
    ) -> impl std::future::Future<Output = Result<Message, ApiError>> + Send;

    /// Block relation between the caller and `peer`.
    fn block_status(
        &self,
        credential: &Credential,
        peer: UserId,
    ) -> impl std::future::Future<Output = Result<BlockRelation, ApiError>> + Send;

    /// Block `peer`.
    fn set_block(
        &self,
        credential: &Credential,
        peer: UserId,
    ) -> impl std::future::Future<Output = Result<(), ApiError>> + Send;

    /// Unblock `peer`.
    fn clear_block(
        &self,
        credential: &Credential,
        peer: UserId,
    ) -> impl std::future::Future<Output = Result<(), ApiError>> + Send;

    /// Presence snapshot for all users.
    fn presence(
        &self,
        credential: &Credential,
    ) -> impl std::future::Future<Output = Result<Vec<PresenceRecord>, ApiError>> + Send;

    /// Unread counts keyed by sending peer.
    fn unread_counts(
        &self,
        credential: &Credential,
    ) -> impl std::future::Future<Output = Result<Vec<UnreadEntry>, ApiError>> + Send;
}
