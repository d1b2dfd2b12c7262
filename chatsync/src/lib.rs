//! `chatsync` — client-side sync engine for a polling-only chat service.
//!
//! The service has no push channel, so every piece of live state (messages,
//! presence, unread counts, block status) is kept fresh by independent
//! polling loops. [`sync::ChatClient`] owns those loops, the conversation
//! selection lifecycle, and the optimistic send path.

pub mod api;
pub mod config;
pub mod session;
pub mod sync;
pub mod view;
