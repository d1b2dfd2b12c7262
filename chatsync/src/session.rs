//! Authenticated session context.
//!
//! A [`Session`] pairs the signed-in [`User`] with the [`Credential`] every
//! call carries. It is created once at login, never mutated, and shared by
//! all sync loops until logout.

use chatsync_proto::user::{User, UserId};

use crate::api::{ApiError, ChatApi, Credential};

/// Errors that can occur while establishing a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The service did not accept the credential, or identity could not be
    /// fetched. The credential has been discarded.
    #[error("login rejected: {0}")]
    Rejected(#[source] ApiError),
}

/// Identity and credential of the signed-in user.
#[derive(Debug, Clone)]
pub struct Session {
    user: User,
    credential: Credential,
}

impl Session {
    /// Ask the service who owns `credential`.
    ///
    /// Any failure is fatal to the session: the credential is dropped and
    /// the caller is left unauthenticated.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Rejected`] if the identity fetch fails.
    pub async fn establish<A: ChatApi>(
        api: &A,
        credential: Credential,
    ) -> Result<Self, SessionError> {
        match api.current_user(&credential).await {
            Ok(user) => {
                tracing::info!(user = %user.id, username = %user.username, "session established");
                Ok(Self { user, credential })
            }
            Err(e) => {
                tracing::warn!(error = %e, "identity fetch failed, dropping credential");
                drop(credential);
                Err(SessionError::Rejected(e))
            }
        }
    }

    /// The signed-in user.
    #[must_use]
    pub const fn user(&self) -> &User {
        &self.user
    }

    /// Shorthand for `self.user().id`.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user.id
    }

    /// Credential presented on every call.
    #[must_use]
    pub const fn credential(&self) -> &Credential {
        &self.credential
    }
}
