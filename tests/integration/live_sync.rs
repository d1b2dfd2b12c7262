//! Integration tests for the background loops of a live session.
//!
//! Verifies:
//! 1. Opening a conversation zeroes its unread badge at once, and the badge
//!    stays zero while the service still reports the old count.
//! 2. Presence polling failures keep the last known presence.
//! 3. Unblocking takes effect locally before the service answers, and a
//!    failed block status load keeps sending disabled until a retry lands.
//! 4. Messages from the peer show up through the history loop.
//! 5. Logout stops every loop.

use std::time::Duration;

use chrono::Utc;

use chatsync::api::memory::{Endpoint, MemoryApi};
use chatsync::api::{ChatApi, Credential};
use chatsync::sync::presence::Presence;
use chatsync::sync::{ChatClient, SendOutcome, SyncConfig, SyncEvent};
use chatsync_proto::presence::PresenceRecord;
use chatsync_proto::user::{User, UserId};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const ME: UserId = UserId::new(1);
const PEER: UserId = UserId::new(2);

fn service() -> MemoryApi {
    let api = MemoryApi::new(
        User {
            id: ME,
            username: "me".into(),
        },
        "token",
    );
    api.add_user(User {
        id: PEER,
        username: "peer".into(),
    });
    api
}

fn fast_config() -> SyncConfig {
    SyncConfig {
        message_interval: Duration::from_millis(40),
        peer_presence_interval: Duration::from_millis(40),
        sidebar_presence_interval: Duration::from_millis(40),
        unread_interval: Duration::from_millis(40),
        ..SyncConfig::default()
    }
}

async fn login(api: &MemoryApi) -> (ChatClient<MemoryApi>, tokio::sync::mpsc::Receiver<SyncEvent>) {
    ChatClient::login(api.clone(), Credential::new("token"), fast_config())
        .await
        .unwrap()
}

fn online(user_id: UserId) -> PresenceRecord {
    PresenceRecord {
        user_id,
        online: true,
        last_seen: Some(Utc::now()),
    }
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
// Unread counts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn opening_conversation_zeroes_unread_until_service_catches_up() {
    let api = service();
    api.set_unread(PEER, 3);
    let (client, _events) = login(&api).await;
    assert!(eventually(Duration::from_secs(1), || client.unread(PEER) == 3).await);

    client.select(Some(PEER)).await;
    assert_eq!(client.unread(PEER), 0);

    // The service keeps reporting 3 for a while; the badge stays at zero.
    let polls = api.call_count(Endpoint::UnreadCounts);
    assert!(eventually(Duration::from_secs(1), || api.call_count(Endpoint::UnreadCounts) > polls + 2).await);
    assert_eq!(client.unread(PEER), 0);

    // Once the service reports zero, later counts are trusted again.
    api.set_unread(PEER, 0);
    let polls = api.call_count(Endpoint::UnreadCounts);
    assert!(eventually(Duration::from_secs(1), || api.call_count(Endpoint::UnreadCounts) > polls + 1).await);
    api.set_unread(PEER, 2);
    assert!(eventually(Duration::from_secs(1), || client.unread(PEER) == 2).await);
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn presence_failures_keep_last_value() {
    let api = service();
    api.set_presence(vec![online(PEER)]);
    let (client, _events) = login(&api).await;
    client.select(Some(PEER)).await;
    assert_eq!(client.peer_presence(), Presence::Online);
    assert!(eventually(Duration::from_secs(1), || client.sidebar_presence().get(PEER).is_online()).await);

    api.fail(Endpoint::Presence);
    let calls = api.call_count(Endpoint::Presence);
    assert!(eventually(Duration::from_secs(1), || api.call_count(Endpoint::Presence) >= calls + 3).await);
    assert_eq!(client.peer_presence(), Presence::Online);
    assert!(client.sidebar_presence().get(PEER).is_online());

    api.recover(Endpoint::Presence);
    api.set_presence(vec![PresenceRecord {
        user_id: PEER,
        online: false,
        last_seen: None,
    }]);
    assert!(eventually(Duration::from_secs(1), || client.peer_presence() == Presence::Offline).await);
}

// ---------------------------------------------------------------------------
// Block toggle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unblock_enables_send_before_service_answers() {
    let api = service();
    api.set_block(&Credential::new("token"), PEER).await.unwrap();
    let (client, _events) = login(&api).await;
    client.select(Some(PEER)).await;
    assert!(client.block_relation().blocked_by_me);
    assert!(!client.can_send());

    api.hold(Endpoint::ClearBlock);
    let toggle = client.toggle_block();
    tokio::pin!(toggle);
    // Drive the toggle until it is parked on the held request.
    let relation = tokio::select! {
        relation = &mut toggle => relation,
        () = tokio::time::sleep(Duration::from_millis(50)) => None,
    };
    assert!(relation.is_none(), "toggle should be waiting on the service");
    assert!(client.can_send());
    assert!(!client.block_relation().blocked_by_me);

    api.release(Endpoint::ClearBlock, 1);
    let relation = toggle.await.unwrap();
    assert!(!relation.blocked_by_me);
    assert!(!api.is_blocked_by_me(PEER));

    let outcome = client.send("hello again").await.unwrap();
    assert!(matches!(outcome, SendOutcome::Sent(_)));
}

#[tokio::test]
async fn failed_block_load_keeps_gate_closed_until_retry() {
    let api = service();
    api.fail(Endpoint::BlockStatus);
    let (client, _events) = login(&api).await;
    client.select(Some(PEER)).await;
    assert!(!client.block_known());
    assert!(!client.can_send());

    api.recover(Endpoint::BlockStatus);
    // The message loop retries the load on its next tick.
    assert!(eventually(Duration::from_secs(1), || client.can_send()).await);
    assert!(client.block_known());
}

// ---------------------------------------------------------------------------
// History and logout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn incoming_message_arrives_via_history_loop() {
    let api = service();
    let (client, mut events) = login(&api).await;
    client.select(Some(PEER)).await;
    assert!(client.messages().is_empty());
    while events.try_recv().is_ok() {}

    api.deliver(PEER, "ping");
    assert!(eventually(Duration::from_secs(1), || client.messages().len() == 1).await);
    assert_eq!(client.messages()[0].content(), "ping");

    let mut saw_change = false;
    while let Ok(event) = events.try_recv() {
        saw_change |= event == SyncEvent::MessagesChanged { peer: PEER };
    }
    assert!(saw_change);
}

#[tokio::test]
async fn logout_stops_all_loops() {
    let api = service();
    let (client, _events) = login(&api).await;
    client.select(Some(PEER)).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    client.logout();
    // Let any in-flight tick finish.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let calls = api.calls().len();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(api.calls().len(), calls);
    assert!(client.messages().is_empty());
    assert_eq!(client.active_peer(), None);

    // A second logout is a no-op.
    client.logout();
    assert!(client.is_logged_out());
}
