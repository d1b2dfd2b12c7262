//! HTTP routes of the development server.
//!
//! Every route requires `Authorization: Bearer <token>`. An unknown token
//! answers `401`; a send or block request touching a blocked pair answers
//! `403`.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use chatsync_proto::block::{BlockRelation, BlockRequest};
use chatsync_proto::message::{Message, SendMessageRequest};
use chatsync_proto::presence::PresenceRecord;
use chatsync_proto::unread::UnreadEntry;
use chatsync_proto::user::{User, UserId, UserSummary};

use crate::store::{ChatStore, StoreError};

/// Failure responses of the API.
#[derive(Debug)]
enum ApiFailure {
    Unauthorized,
    Store(StoreError),
}

impl From<StoreError> for ApiFailure {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "invalid token").into_response(),
            Self::Store(e) => {
                let status = match e {
                    StoreError::Blocked => StatusCode::FORBIDDEN,
                    StoreError::UnknownUser(_) => StatusCode::NOT_FOUND,
                    StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
                };
                (status, e.to_string()).into_response()
            }
        }
    }
}

/// `?user_id=<peer>` query parameter.
#[derive(Debug, Deserialize)]
struct PeerQuery {
    user_id: UserId,
}

/// Resolve the bearer token to the calling user.
async fn caller(store: &ChatStore, headers: &HeaderMap) -> Result<User, ApiFailure> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiFailure::Unauthorized)?;
    store
        .authenticate(token)
        .await
        .ok_or(ApiFailure::Unauthorized)
}

async fn me(
    State(store): State<Arc<ChatStore>>,
    headers: HeaderMap,
) -> Result<Json<User>, ApiFailure> {
    Ok(Json(caller(&store, &headers).await?))
}

async fn users(
    State(store): State<Arc<ChatStore>>,
    headers: HeaderMap,
) -> Result<Json<Vec<UserSummary>>, ApiFailure> {
    let me = caller(&store, &headers).await?;
    Ok(Json(store.users_for(me.id).await))
}

async fn list_messages(
    State(store): State<Arc<ChatStore>>,
    headers: HeaderMap,
    Query(query): Query<PeerQuery>,
) -> Result<Json<Vec<Message>>, ApiFailure> {
    let me = caller(&store, &headers).await?;
    Ok(Json(store.conversation(me.id, query.user_id).await))
}

async fn send_message(
    State(store): State<Arc<ChatStore>>,
    headers: HeaderMap,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiFailure> {
    let me = caller(&store, &headers).await?;
    let message = store.send(me.id, body.receiver, &body.content).await?;
    tracing::debug!(from = %me.id, to = %message.receiver, id = %message.id, "message stored");
    Ok((StatusCode::CREATED, Json(message)))
}

async fn block_status(
    State(store): State<Arc<ChatStore>>,
    headers: HeaderMap,
    Query(query): Query<PeerQuery>,
) -> Result<Json<BlockRelation>, ApiFailure> {
    let me = caller(&store, &headers).await?;
    Ok(Json(store.block_status(me.id, query.user_id).await))
}

async fn set_block(
    State(store): State<Arc<ChatStore>>,
    headers: HeaderMap,
    Json(body): Json<BlockRequest>,
) -> Result<StatusCode, ApiFailure> {
    let me = caller(&store, &headers).await?;
    store.block(me.id, body.user_id).await?;
    tracing::debug!(user = %me.id, blocked = %body.user_id, "block added");
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_block(
    State(store): State<Arc<ChatStore>>,
    headers: HeaderMap,
    Query(query): Query<PeerQuery>,
) -> Result<StatusCode, ApiFailure> {
    let me = caller(&store, &headers).await?;
    store.unblock(me.id, query.user_id).await;
    tracing::debug!(user = %me.id, unblocked = %query.user_id, "block removed");
    Ok(StatusCode::NO_CONTENT)
}

async fn presence(
    State(store): State<Arc<ChatStore>>,
    headers: HeaderMap,
) -> Result<Json<Vec<PresenceRecord>>, ApiFailure> {
    caller(&store, &headers).await?;
    Ok(Json(store.presence().await))
}

async fn unread_counts(
    State(store): State<Arc<ChatStore>>,
    headers: HeaderMap,
) -> Result<Json<Vec<UnreadEntry>>, ApiFailure> {
    let me = caller(&store, &headers).await?;
    Ok(Json(store.unread_counts(me.id).await))
}

/// Build the API router over `store`.
pub fn router(store: Arc<ChatStore>) -> Router {
    Router::new()
        .route("/api/me/", get(me))
        .route("/api/users/", get(users))
        .route("/api/chat/messages/", get(list_messages).post(send_message))
        .route("/api/chat/block/status/", get(block_status))
        .route("/api/chat/block/", axum::routing::post(set_block).delete(clear_block))
        .route("/api/presence/", get(presence))
        .route("/api/chat/unread_counts/", get(unread_counts))
        .with_state(store)
}

/// Starts the development server on the given address.
///
/// Returns the bound address and a [`tokio::task::JoinHandle`] for the
/// server task.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to `addr`.
pub async fn start_server_with_state(
    addr: &str,
    store: Arc<ChatStore>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(store);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "dev server error");
        }
    });

    Ok((bound_addr, handle))
}
