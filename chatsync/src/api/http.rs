//! JSON-over-HTTP binding of [`ChatApi`].
//!
//! Every request carries the credential as a bearer token. A `401` maps to
//! [`ApiError::Unauthorized`], any other non-2xx status to
//! [`ApiError::Status`], and a body that does not decode to
//! [`ApiError::Decode`].

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use chatsync_proto::block::{BlockRelation, BlockRequest};
use chatsync_proto::message::{Message, SendMessageRequest};
use chatsync_proto::presence::PresenceRecord;
use chatsync_proto::unread::UnreadEntry;
use chatsync_proto::user::{User, UserId, UserSummary};

use super::{ApiError, ChatApi, Credential};

const ME: &str = "api/me/";
const USERS: &str = "api/users/";
const MESSAGES: &str = "api/chat/messages/";
const BLOCK: &str = "api/chat/block/";
const BLOCK_STATUS: &str = "api/chat/block/status/";
const PRESENCE: &str = "api/presence/";
const UNREAD: &str = "api/chat/unread_counts/";

/// HTTP client for the chat service.
#[derive(Debug, Clone)]
pub struct HttpApi {
    http: Client,
    base_url: Url,
}

impl HttpApi {
    /// Create a client rooted at `base_url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] if the underlying HTTP client cannot
    /// be built.
    pub fn new(mut base_url: Url, timeout: Duration) -> Result<Self, ApiError> {
        // Relative joins drop the last path segment unless it ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    /// The root every endpoint is resolved against.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::Unavailable(format!("bad endpoint {path}: {e}")))
    }

    fn peer_endpoint(&self, path: &str, peer: UserId) -> Result<Url, ApiError> {
        let mut url = self.endpoint(path)?;
        url.query_pairs_mut()
            .append_pair("user_id", &peer.to_string());
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        credential: &Credential,
        url: Url,
    ) -> Result<T, ApiError> {
        let res = self
            .http
            .get(url)
            .bearer_auth(credential.token())
            .send()
            .await?;
        decode(res).await
    }
}

/// Map a response to a decoded record or the matching [`ApiError`].
async fn decode<T: DeserializeOwned>(res: Response) -> Result<T, ApiError> {
    let body = checked_body(res).await?;
    Ok(serde_json::from_str(&body)?)
}

async fn checked_body(res: Response) -> Result<String, ApiError> {
    let status = res.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized);
    }
    let body = res.text().await?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

impl ChatApi for HttpApi {
    async fn current_user(&self, credential: &Credential) -> Result<User, ApiError> {
        self.get(credential, self.endpoint(ME)?).await
    }

    async fn list_users(&self, credential: &Credential) -> Result<Vec<UserSummary>, ApiError> {
        self.get(credential, self.endpoint(USERS)?).await
    }

    async fn list_messages(
        &self,
        credential: &Credential,
        peer: UserId,
    ) -> Result<Vec<Message>, ApiError> {
        self.get(credential, self.peer_endpoint(MESSAGES, peer)?)
            .await
    }

    async fn send_message(
        &self,
        credential: &Credential,
        peer: UserId,
        content: &str,
    ) -> Result<Message, ApiError> {
        let body = SendMessageRequest {
            receiver: peer,
            content: content.to_string(),
        };
        let res = self
            .http
            .post(self.endpoint(MESSAGES)?)
            .bearer_auth(credential.token())
            .json(&body)
            .send()
            .await?;
        decode(res).await
    }

    async fn block_status(
        &self,
        credential: &Credential,
        peer: UserId,
    ) -> Result<BlockRelation, ApiError> {
        self.get(credential, self.peer_endpoint(BLOCK_STATUS, peer)?)
            .await
    }

    async fn set_block(&self, credential: &Credential, peer: UserId) -> Result<(), ApiError> {
        let res = self
            .http
            .post(self.endpoint(BLOCK)?)
            .bearer_auth(credential.token())
            .json(&BlockRequest { user_id: peer })
            .send()
            .await?;
        checked_body(res).await.map(drop)
    }

    async fn clear_block(&self, credential: &Credential, peer: UserId) -> Result<(), ApiError> {
        let res = self
            .http
            .delete(self.peer_endpoint(BLOCK, peer)?)
            .bearer_auth(credential.token())
            .send()
            .await?;
        checked_body(res).await.map(drop)
    }

    async fn presence(&self, credential: &Credential) -> Result<Vec<PresenceRecord>, ApiError> {
        self.get(credential, self.endpoint(PRESENCE)?).await
    }

    async fn unread_counts(&self, credential: &Credential) -> Result<Vec<UnreadEntry>, ApiError> {
        self.get(credential, self.endpoint(UNREAD)?).await
    }
}
