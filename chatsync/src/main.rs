//! `chatsync` — line-oriented terminal client for a polling chat service.
//!
//! Signs in with an access token, keeps the conversation list and the open
//! conversation in sync, and sends every non-command line as a message.
//! Configuration via CLI flags, environment variables, or config file
//! (`~/.config/chatsync/config.toml`).
//!
//! ```bash
//! # Against a local dev server
//! cargo run --bin chatsync -- --base-url http://127.0.0.1:8000/ --token alice-token
//!
//! # Open a conversation right away
//! CHATSYNC_TOKEN=alice-token cargo run --bin chatsync -- --peer bob
//! ```
//!
//! Commands: `/users`, `/open <username>`, `/close`, `/block`, `/quit`.

use std::collections::HashSet;
use std::path::Path;
use std::process::ExitCode;

use chrono::{Local, Utc};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

use chatsync::api::ChatApi;
use chatsync::api::http::HttpApi;
use chatsync::config::{CliArgs, ClientConfig};
use chatsync::sync::messages::LocalMessage;
use chatsync::sync::{ChatClient, SendError, SendOutcome, SkipReason, SyncEvent};
use chatsync::view::{self, Tick};
use chatsync_proto::message::MessageId;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Logs go to a file so stdout stays readable.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!(base_url = %config.base_url, "chatsync starting");

    let Some(credential) = config.credential.clone() else {
        eprintln!("error: no access token (use --token or CHATSYNC_TOKEN)");
        return ExitCode::FAILURE;
    };

    let api = match HttpApi::new(config.base_url.clone(), config.request_timeout) {
        Ok(api) => api,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let (client, events) = match ChatClient::login(api, credential, config.sync.clone()).await {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    println!("signed in as {}", client.me().username);

    if let Some(name) = &config.peer {
        open(&client, name).await;
    }

    run(&client, events).await;

    client.logout();
    tracing::info!("chatsync exiting");
    ExitCode::SUCCESS
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("chatsync.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Whether the input loop keeps going.
enum Flow {
    Continue,
    Quit,
}

/// Read commands from stdin and print state changes until `/quit` or EOF.
async fn run<A: ChatApi + 'static>(client: &ChatClient<A>, mut events: mpsc::Receiver<SyncEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut printed: HashSet<MessageId> = HashSet::new();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if matches!(handle_line(client, line.trim()).await, Flow::Quit) {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    break;
                }
            },
            Some(event) = events.recv() => render(client, &event, &mut printed),
        }
    }
}

async fn handle_line<A: ChatApi + 'static>(client: &ChatClient<A>, line: &str) -> Flow {
    match line.split_once(' ').map_or((line, ""), |(cmd, rest)| (cmd, rest.trim())) {
        ("/quit", _) => return Flow::Quit,
        ("/users", filter) => {
            for row in client.sidebar(filter) {
                let dot = if row.online { "●" } else { " " };
                let badge = row.unread.map(|n| format!(" ({n})")).unwrap_or_default();
                let marker = if row.active { ">" } else { " " };
                println!("{marker}{dot} {}{badge}: {}", row.username, row.preview);
            }
        }
        ("/open", "") => println!("usage: /open <username>"),
        ("/open", name) => open(client, name).await,
        ("/close", _) => client.select(None).await,
        ("/block", _) => {
            if client.toggle_block().await.is_none() {
                if client.active_peer().is_none() {
                    println!("no conversation open");
                } else {
                    println!("conversation still loading");
                }
            }
        }
        ("", _) => {}
        _ => {
            client.set_draft(line);
            match client.send_draft().await {
                Ok(SendOutcome::Sent(_)) => {}
                Ok(SendOutcome::Skipped(SkipReason::NoPeer)) => {
                    println!("open a conversation first: /open <username>");
                }
                Ok(SendOutcome::Skipped(SkipReason::Blocked)) if !client.block_known() => {
                    println!("conversation still loading");
                }
                Ok(SendOutcome::Skipped(SkipReason::Blocked)) => {
                    println!("{}", view::input_placeholder(client.block_relation()));
                }
                Ok(SendOutcome::Skipped(SkipReason::EmptyDraft)) => {}
                Err(SendError::Validation(e)) => println!("not sent: {e}"),
                // Reported through SyncEvent::SendFailed.
                Err(SendError::Api(_)) => {}
            }
        }
    }
    Flow::Continue
}

async fn open<A: ChatApi + 'static>(client: &ChatClient<A>, username: &str) {
    let found = client
        .users()
        .into_iter()
        .find(|s| s.user.username.eq_ignore_ascii_case(username));
    match found {
        Some(summary) => client.select(Some(summary.user.id)).await,
        None => println!("no such user: {username}"),
    }
}

fn render<A: ChatApi + 'static>(
    client: &ChatClient<A>,
    event: &SyncEvent,
    printed: &mut HashSet<MessageId>,
) {
    match event {
        SyncEvent::SelectionChanged { peer } => {
            printed.clear();
            if peer.is_none() {
                println!("-- conversation closed --");
            }
        }
        SyncEvent::MessagesChanged { .. } => print_new_messages(client, printed),
        SyncEvent::PeerPresenceChanged { .. } | SyncEvent::BlockChanged { .. } => {
            if let Some(status) = client.header_status(Utc::now()) {
                println!("-- {status} --");
            }
        }
        SyncEvent::SendFailed { reason, .. } => println!("! message not sent: {reason}"),
        SyncEvent::LoggedOut => println!("-- signed out --"),
        SyncEvent::SidebarPresenceChanged | SyncEvent::UnreadChanged | SyncEvent::UsersChanged => {}
    }
}

fn print_new_messages<A: ChatApi + 'static>(client: &ChatClient<A>, printed: &mut HashSet<MessageId>) {
    let me = client.me().id;
    for entry in client.messages() {
        let LocalMessage::Confirmed(message) = &entry else {
            continue;
        };
        if !printed.insert(message.id) {
            continue;
        }
        let who = if message.sender == me { "you" } else { "them" };
        let tick = match view::tick(&entry, me) {
            Some(Tick::Seen) => " ✓✓ seen",
            Some(Tick::Delivered) => " ✓✓",
            Some(Tick::Sending | Tick::Failed) | None => "",
        };
        println!(
            "[{}] {who}: {}{tick}",
            view::format_clock(&message.timestamp.with_timezone(&Local)),
            message.content
        );
    }
}
