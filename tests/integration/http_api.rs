//! Integration tests for the HTTP binding against the development server.
//!
//! Verifies:
//! 1. Bearer authentication: a good token identifies the user, a bad one is
//!    `Unauthorized`.
//! 2. Messages round-trip, listing marks incoming messages read, and unread
//!    counts follow.
//! 3. `set_block` / `clear_block` are reflected by `block_status`, and a
//!    blocked pair cannot exchange messages.
//! 4. A full `ChatClient` over HTTP sends and sees its message exactly once.

use std::sync::Arc;
use std::time::Duration;

use chatsync::api::http::HttpApi;
use chatsync::api::{ApiError, ChatApi, Credential};
use chatsync::sync::messages::LocalMessage;
use chatsync::sync::{ChatClient, SendOutcome, SyncConfig};
use chatsync_devserver::server::start_server_with_state;
use chatsync_devserver::store::ChatStore;
use chatsync_proto::user::User;
use url::Url;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Fixture {
    api: HttpApi,
    alice: User,
    bob: User,
    _server: tokio::task::JoinHandle<()>,
}

/// Start a dev server with alice and bob and an `HttpApi` pointed at it.
async fn start() -> Fixture {
    let store = Arc::new(ChatStore::new());
    let alice = store.add_user("alice", "alice-token").await;
    let bob = store.add_user("bob", "bob-token").await;
    let (addr, handle) = start_server_with_state("127.0.0.1:0", store)
        .await
        .unwrap();
    let base = Url::parse(&format!("http://{addr}/")).unwrap();
    Fixture {
        api: HttpApi::new(base, Duration::from_secs(5)).unwrap(),
        alice,
        bob,
        _server: handle,
    }
}

fn alice_cred() -> Credential {
    Credential::new("alice-token")
}

fn bob_cred() -> Credential {
    Credential::new("bob-token")
}

/// Poll `check` every 10 ms until it holds or `timeout` elapses.
async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn current_user_resolves_token() {
    let f = start().await;
    let me = f.api.current_user(&alice_cred()).await.unwrap();
    assert_eq!(me, f.alice);
}

#[tokio::test]
async fn bad_token_is_unauthorized() {
    let f = start().await;
    let result = f.api.current_user(&Credential::new("forged")).await;
    assert!(matches!(result, Err(ApiError::Unauthorized)));
}

#[tokio::test]
async fn directory_excludes_caller() {
    let f = start().await;
    let users = f.api.list_users(&alice_cred()).await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].user, f.bob);
    assert!(users[0].last_message.is_none());
}

// ---------------------------------------------------------------------------
// Messages and unread counts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_list_and_read_receipts() {
    let f = start().await;
    let sent = f
        .api
        .send_message(&alice_cred(), f.bob.id, "hello bob")
        .await
        .unwrap();
    assert_eq!(sent.sender, f.alice.id);
    assert!(!sent.is_read);

    let unread = f.api.unread_counts(&bob_cred()).await.unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].user_id, f.alice.id);
    assert_eq!(unread[0].count, 1);

    let history = f.api.list_messages(&bob_cred(), f.alice.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].is_read);
    assert!(f.api.unread_counts(&bob_cred()).await.unwrap().is_empty());

    let from_alice_side = f.api.list_messages(&alice_cred(), f.bob.id).await.unwrap();
    assert!(from_alice_side[0].is_read);
}

#[tokio::test]
async fn blank_message_is_rejected_by_server() {
    let f = start().await;
    let result = f.api.send_message(&alice_cred(), f.bob.id, "   ").await;
    assert!(matches!(result, Err(ApiError::Status { status: 400, .. })));
}

// ---------------------------------------------------------------------------
// Block relation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn block_round_trip() {
    let f = start().await;
    f.api.set_block(&alice_cred(), f.bob.id).await.unwrap();

    let mine = f.api.block_status(&alice_cred(), f.bob.id).await.unwrap();
    assert!(mine.blocked_by_me);
    assert!(!mine.blocked_me);
    let theirs = f.api.block_status(&bob_cred(), f.alice.id).await.unwrap();
    assert!(theirs.blocked_me);

    let result = f.api.send_message(&bob_cred(), f.alice.id, "hi").await;
    assert!(matches!(result, Err(ApiError::Status { status: 403, .. })));

    f.api.clear_block(&alice_cred(), f.bob.id).await.unwrap();
    let mine = f.api.block_status(&alice_cred(), f.bob.id).await.unwrap();
    assert!(!mine.blocked_by_me);
    assert!(f.api.send_message(&bob_cred(), f.alice.id, "hi").await.is_ok());
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn requests_mark_caller_online() {
    let f = start().await;
    let presence = f.api.presence(&alice_cred()).await.unwrap();
    let alice = presence.iter().find(|r| r.user_id == f.alice.id).unwrap();
    let bob = presence.iter().find(|r| r.user_id == f.bob.id).unwrap();
    assert!(alice.online);
    assert!(!bob.online);
    assert!(bob.last_seen.is_none());
}

// ---------------------------------------------------------------------------
// Full client over HTTP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn client_sends_and_sees_message_once() {
    let f = start().await;
    let config = SyncConfig {
        message_interval: Duration::from_millis(50),
        ..SyncConfig::default()
    };
    let (client, _events) = ChatClient::login(f.api.clone(), alice_cred(), config)
        .await
        .unwrap();
    assert_eq!(client.users().len(), 1);

    client.select(Some(f.bob.id)).await;
    let outcome = client.send("hi over http").await.unwrap();
    assert!(matches!(outcome, SendOutcome::Sent(_)));

    // Let a few polls land.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let copies = client
        .messages()
        .iter()
        .filter(|m| m.content() == "hi over http")
        .count();
    assert_eq!(copies, 1);
    assert!(matches!(client.messages()[0], LocalMessage::Confirmed(_)));

    // Bob answers; alice's message loop picks it up.
    f.api
        .send_message(&bob_cred(), f.alice.id, "hi alice")
        .await
        .unwrap();
    assert!(eventually(Duration::from_secs(2), || client.messages().len() == 2).await);
}
