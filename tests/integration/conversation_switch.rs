//! Integration tests for switching the active conversation.
//!
//! Verifies:
//! 1. A history response for a previous peer that arrives after a switch is
//!    discarded, and no loops are started for that peer.
//! 2. Rapid switching ends in the last selection's state only.
//! 3. Closing the conversation stops its loops.
//! 4. An unread response issued before a selection change is discarded.
//! 5. Late presence and block status responses for a previous peer, from an
//!    initial load or from `refresh_block`, are discarded.
//! 6. A send confirmed after switching away never lands in the new
//!    conversation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use chatsync::api::Credential;
use chatsync::api::memory::{Endpoint, MemoryApi};
use chatsync::sync::presence::Presence;
use chatsync::sync::{ChatClient, SendOutcome, SyncConfig};
use chatsync_proto::presence::PresenceRecord;
use chatsync_proto::user::{User, UserId};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const ME: UserId = UserId::new(1);
const ANNA: UserId = UserId::new(2);
const BORIS: UserId = UserId::new(3);

fn service() -> MemoryApi {
    let api = MemoryApi::new(
        User {
            id: ME,
            username: "me".into(),
        },
        "token",
    );
    for (id, name) in [(ANNA, "anna"), (BORIS, "boris")] {
        api.add_user(User {
            id,
            username: name.into(),
        });
    }
    api
}

fn fast_config() -> SyncConfig {
    SyncConfig {
        message_interval: Duration::from_millis(40),
        peer_presence_interval: Duration::from_millis(40),
        sidebar_presence_interval: Duration::from_millis(40),
        unread_interval: Duration::from_millis(300),
        ..SyncConfig::default()
    }
}

/// Like [`fast_config`], but the sidebar polls once at login and then stays
/// quiet, so every later presence call comes from the conversation.
fn quiet_sidebar_config() -> SyncConfig {
    SyncConfig {
        sidebar_presence_interval: Duration::from_secs(60),
        ..fast_config()
    }
}

fn presence(user_id: UserId, online: bool) -> PresenceRecord {
    PresenceRecord {
        user_id,
        online,
        last_seen: None,
    }
}

fn contents(client: &ChatClient<MemoryApi>) -> Vec<String> {
    client.messages().iter().map(|m| m.content().to_string()).collect()
}

async fn login(api: &MemoryApi, config: SyncConfig) -> ChatClient<MemoryApi> {
    let (client, _events) = ChatClient::login(api.clone(), Credential::new("token"), config)
        .await
        .unwrap();
    client
}

/// Number of history requests issued for `peer`.
fn history_calls(api: &MemoryApi, peer: UserId) -> usize {
    api.calls()
        .iter()
        .filter(|c| c.endpoint == Endpoint::ListMessages && c.peer == Some(peer))
        .count()
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
// Late responses
// ---------------------------------------------------------------------------

#[tokio::test]
async fn late_history_for_previous_peer_is_discarded() {
    let api = service();
    api.deliver(ANNA, "from anna");
    api.deliver(BORIS, "from boris");
    let client = Arc::new(login(&api, fast_config()).await);

    api.hold(Endpoint::ListMessages);
    let select_anna = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.select(Some(ANNA)).await })
    };
    assert!(eventually(Duration::from_secs(1), || history_calls(&api, ANNA) == 1).await);

    api.pass_through(Endpoint::ListMessages);
    client.select(Some(BORIS)).await;
    assert_eq!(client.active_peer(), Some(BORIS));
    assert_eq!(contents(&client), vec!["from boris".to_string()]);

    // Anna's response lands now, long after the switch.
    api.release(Endpoint::ListMessages, 1);
    select_anna.await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(contents(&client), vec!["from boris".to_string()]);
    assert_eq!(client.active_peer(), Some(BORIS));

    // No block load and no history loop ever ran for anna.
    assert_eq!(history_calls(&api, ANNA), 1);
    assert!(
        !api
            .calls()
            .iter()
            .any(|c| c.endpoint == Endpoint::BlockStatus && c.peer == Some(ANNA))
    );
    // Boris's history loop keeps polling.
    assert!(history_calls(&api, BORIS) > 1);
}

#[tokio::test]
async fn rapid_switching_settles_on_last_selection() {
    let api = service();
    api.deliver(ANNA, "from anna");
    api.deliver(BORIS, "from boris");
    let client = login(&api, fast_config()).await;

    client.select(Some(ANNA)).await;
    client.select(Some(BORIS)).await;
    client.select(Some(ANNA)).await;

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(contents(&client), vec!["from anna".to_string()]);

    // Only anna's loop is alive: boris gets no further history polls.
    let boris_calls = history_calls(&api, BORIS);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(history_calls(&api, BORIS), boris_calls);
}

#[tokio::test]
async fn closing_conversation_stops_its_loops() {
    let api = service();
    api.deliver(ANNA, "from anna");
    let client = login(&api, fast_config()).await;

    client.select(Some(ANNA)).await;
    client.select(None).await;
    assert_eq!(client.active_peer(), None);
    assert!(client.messages().is_empty());
    assert!(!client.can_send());

    let before = api.call_count(Endpoint::ListMessages);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(api.call_count(Endpoint::ListMessages), before);
}

// ---------------------------------------------------------------------------
// Unread counts across a switch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unread_response_issued_before_switch_is_discarded() {
    let api = service();
    api.set_unread(BORIS, 5);
    api.hold(Endpoint::UnreadCounts);
    let client = login(&api, fast_config()).await;
    assert!(eventually(Duration::from_secs(1), || api.call_count(Endpoint::UnreadCounts) == 1).await);

    // The held response carries boris = 5 but was issued with no selection.
    api.pass_through(Endpoint::UnreadCounts);
    client.select(Some(ANNA)).await;
    api.release(Endpoint::UnreadCounts, 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.unread(BORIS), 0);

    // The next tick is issued under the current selection and applies.
    assert!(eventually(Duration::from_secs(2), || client.unread(BORIS) == 5).await);
    assert_eq!(client.unread(ANNA), 0);
}

// ---------------------------------------------------------------------------
// Presence and block status across a switch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn late_presence_for_previous_peer_is_discarded() {
    let api = service();
    api.set_presence(vec![presence(ANNA, true), presence(BORIS, true)]);
    let client = Arc::new(login(&api, quiet_sidebar_config()).await);
    assert!(eventually(Duration::from_secs(1), || !client.sidebar_presence().is_empty()).await);

    // Anna's initial presence load is held with boris still online.
    api.hold(Endpoint::Presence);
    let before = api.call_count(Endpoint::Presence);
    let select_anna = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.select(Some(ANNA)).await })
    };
    assert!(eventually(Duration::from_secs(1), || api.call_count(Endpoint::Presence) == before + 1).await);
    // Block status is in, presence is not: no status line yet.
    assert!(client.block_known());
    assert_eq!(client.header_status(Utc::now()), None);

    api.set_presence(vec![presence(ANNA, true), presence(BORIS, false)]);
    api.pass_through(Endpoint::Presence);
    client.select(Some(BORIS)).await;
    assert_eq!(client.peer_presence(), Presence::Offline);

    api.release(Endpoint::Presence, 1);
    select_anna.await.unwrap();
    assert_eq!(client.peer_presence(), Presence::Offline);
    assert_eq!(client.header_status(Utc::now()).as_deref(), Some("Offline"));
    assert_eq!(history_calls(&api, ANNA), 1);
}

#[tokio::test]
async fn late_presence_tick_from_previous_loop_is_discarded() {
    let api = service();
    api.set_presence(vec![presence(BORIS, true)]);
    let client = login(&api, quiet_sidebar_config()).await;
    assert!(eventually(Duration::from_secs(1), || !client.sidebar_presence().is_empty()).await);
    client.select(Some(ANNA)).await;

    // Anna's presence loop ticks and its response is held.
    api.hold(Endpoint::Presence);
    let before = api.call_count(Endpoint::Presence);
    assert!(eventually(Duration::from_secs(1), || api.call_count(Endpoint::Presence) > before).await);

    api.set_presence(vec![presence(BORIS, false)]);
    api.pass_through(Endpoint::Presence);
    client.select(Some(BORIS)).await;
    api.release(Endpoint::Presence, 8);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(client.peer_presence(), Presence::Offline);
}

#[tokio::test]
async fn late_block_status_from_initial_load_is_discarded() {
    let api = service();
    api.set_blocked_me(ANNA, true);
    let client = Arc::new(login(&api, fast_config()).await);

    api.hold(Endpoint::BlockStatus);
    let select_anna = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.select(Some(ANNA)).await })
    };
    assert!(eventually(Duration::from_secs(1), || api.call_count(Endpoint::BlockStatus) == 1).await);
    assert!(!client.can_send());

    api.pass_through(Endpoint::BlockStatus);
    client.select(Some(BORIS)).await;
    assert!(client.can_send());

    // Anna's relation says she blocks us; it must not gate boris.
    api.release(Endpoint::BlockStatus, 1);
    select_anna.await.unwrap();
    assert!(!client.block_relation().blocked_me);
    assert!(client.can_send());
    assert_eq!(history_calls(&api, ANNA), 1);
}

#[tokio::test]
async fn late_block_refresh_for_previous_peer_is_discarded() {
    let api = service();
    let client = Arc::new(login(&api, fast_config()).await);
    client.select(Some(ANNA)).await;
    assert!(client.can_send());

    api.set_blocked_me(ANNA, true);
    api.hold(Endpoint::BlockStatus);
    let before = api.call_count(Endpoint::BlockStatus);
    let refresh = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.refresh_block().await })
    };
    assert!(eventually(Duration::from_secs(1), || api.call_count(Endpoint::BlockStatus) == before + 1).await);

    api.pass_through(Endpoint::BlockStatus);
    client.select(Some(BORIS)).await;
    api.release(Endpoint::BlockStatus, 1);
    refresh.await.unwrap();

    assert_eq!(client.active_peer(), Some(BORIS));
    assert!(!client.block_relation().blocked_me);
    assert!(client.can_send());
}

// ---------------------------------------------------------------------------
// Sends across a switch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_confirmed_after_switch_stays_out_of_new_conversation() {
    let api = service();
    api.deliver(BORIS, "from boris");
    let client = Arc::new(login(&api, fast_config()).await);
    client.select(Some(ANNA)).await;

    api.hold(Endpoint::SendMessage);
    let send = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.send("for anna").await })
    };
    assert!(eventually(Duration::from_secs(1), || api.call_count(Endpoint::SendMessage) == 1).await);

    client.select(Some(BORIS)).await;
    assert_eq!(contents(&client), vec!["from boris".to_string()]);

    api.release(Endpoint::SendMessage, 1);
    let outcome = send.await.unwrap().unwrap();
    assert!(matches!(outcome, SendOutcome::Sent(_)));
    assert_eq!(contents(&client), vec!["from boris".to_string()]);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(contents(&client), vec!["from boris".to_string()]);
    assert_eq!(api.messages_with(ANNA).len(), 1);
}
