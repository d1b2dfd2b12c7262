//! Outbound send pipeline.
//!
//! `send` checks the draft, the selection and the block gate, appends a
//! pending entry, then issues a single request. On success the pending
//! entry becomes the server's message and the composer is cleared; on
//! failure the entry is marked failed and the composer is left alone.

use chrono::Utc;

use chatsync_proto::message::{Message, ValidationError, validate_content};

use super::{ChatClient, SyncEvent};
use crate::api::{ApiError, ChatApi};

/// Errors that can occur when sending a message.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The text cannot be sent as is.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The service did not accept the message.
    #[error("send failed: {0}")]
    Api(#[from] ApiError),
}

/// Why a send did not issue a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Nothing but whitespace to send.
    EmptyDraft,
    /// No conversation is selected.
    NoPeer,
    /// One side blocks the other, or the relation has not loaded yet.
    Blocked,
}

/// Result of a send that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The service stored the message.
    Sent(Message),
    /// The send was a no-op.
    Skipped(SkipReason),
}

impl<A: ChatApi + 'static> ChatClient<A> {
    /// Send `text` to the active peer.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Validation`] if `text` is too long and
    /// [`SendError::Api`] if the request fails. Neither clears the composer.
    pub async fn send(&self, text: &str) -> Result<SendOutcome, SendError> {
        let shared = &self.shared;
        if text.trim().is_empty() {
            return Ok(SendOutcome::Skipped(SkipReason::EmptyDraft));
        }
        let selection = shared.selection.current();
        let Some(peer) = selection.peer else {
            return Ok(SendOutcome::Skipped(SkipReason::NoPeer));
        };
        let gate = *shared.block.lock();
        match gate {
            None => {
                tracing::debug!(peer = %peer, "send skipped, block relation not loaded yet");
                return Ok(SendOutcome::Skipped(SkipReason::Blocked));
            }
            Some(relation) if relation.is_blocked() => {
                tracing::debug!(peer = %peer, "send skipped, conversation is blocked");
                return Ok(SendOutcome::Skipped(SkipReason::Blocked));
            }
            Some(_) => {}
        }
        validate_content(text)?;

        let local_id = {
            let mut log = shared.messages.lock();
            if !shared.accepts(selection.epoch) {
                return Ok(SendOutcome::Skipped(SkipReason::NoPeer));
            }
            log.push_pending(peer, text, Utc::now())
        };
        shared.emit(SyncEvent::MessagesChanged { peer });

        match shared.api.send_message(shared.credential(), peer, text).await {
            Ok(message) => {
                {
                    let mut log = shared.messages.lock();
                    if shared.accepts(selection.epoch) {
                        log.confirm(local_id, message.clone());
                    }
                }
                {
                    let mut composer = shared.composer.lock();
                    if composer.as_str() == text {
                        composer.clear();
                    }
                }
                tracing::debug!(peer = %peer, id = %message.id, "message sent");
                shared.emit(SyncEvent::MessagesChanged { peer });
                Ok(SendOutcome::Sent(message))
            }
            Err(e) => {
                {
                    let mut log = shared.messages.lock();
                    if shared.accepts(selection.epoch) {
                        log.mark_failed(local_id);
                    }
                }
                tracing::warn!(peer = %peer, error = %e, "send failed, draft kept");
                shared.emit(SyncEvent::MessagesChanged { peer });
                shared.emit(SyncEvent::SendFailed {
                    peer,
                    reason: e.to_string(),
                });
                Err(SendError::Api(e))
            }
        }
    }

    /// Send the composer contents. See [`send`](Self::send).
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub async fn send_draft(&self) -> Result<SendOutcome, SendError> {
        let text = self.draft();
        self.send(&text).await
    }
}
