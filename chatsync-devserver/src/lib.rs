//! `chatsync` development server library.
//!
//! Serves the chat HTTP API from memory so the client can be exercised end
//! to end without a real backend. Exposed as a library for use in tests.

pub mod config;
pub mod server;
pub mod store;
