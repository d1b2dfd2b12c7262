//! Shared record definitions for the `chatsync` JSON API.
//!
//! Every type here mirrors a JSON object exchanged with the chat service.
//! Field names follow the service's snake_case keys; unknown keys are
//! ignored on decode.

pub mod block;
pub mod message;
pub mod presence;
pub mod unread;
pub mod user;
