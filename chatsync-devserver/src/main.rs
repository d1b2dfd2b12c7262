//! `chatsync-devserver` -- in-memory chat API for local development.
//!
//! Serves the HTTP API the `chatsync` client talks to, backed by memory.
//! Accounts are seeded at start-up and identified by bearer token.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 127.0.0.1:8000 with alice, bob and carol
//! cargo run --bin chatsync-devserver
//!
//! # Custom address and accounts
//! cargo run --bin chatsync-devserver -- --bind 127.0.0.1:8080 \
//!     --user ines:i-token --user zoe:z-token
//! ```

use std::sync::Arc;

use chatsync_devserver::config::{DevCliArgs, DevConfig};
use chatsync_devserver::server;
use chatsync_devserver::store::ChatStore;
use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = DevCliArgs::parse();

    let config = match DevConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let store = Arc::new(ChatStore::with_online_window(config.online_window));
    for account in &config.accounts {
        let user = store.add_user(&account.username, &account.token).await;
        tracing::info!(id = %user.id, username = %user.username, "account seeded");
    }

    match server::start_server_with_state(&config.bind_addr, store).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "dev server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "dev server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start dev server");
            std::process::exit(1);
        }
    }
}
