//! Session state and the shared resolution step.
//!
//! DESIGN
//! ======
//! Both session stores resolve through `resolve_session`: one backend fetch
//! turning per-context credentials into a `ServerSession`. The reactive store
//! projects the result to a `ClientSession` before caching it; the one-shot
//! store keeps the full record for the duration of one call.

use serde::Serialize;

use crate::backend::{Credentials, IdentityBackend};
use crate::error::SessionError;
use crate::user::{ClientUser, ServerUser};

/// Authentication state of one execution context.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "user", rename_all = "snake_case")]
pub enum Session<U> {
    Anonymous,
    Authenticated(U),
}

/// Session as held by a reactive client context.
pub type ClientSession = Session<ClientUser>;

/// Session as resolved by a one-shot server context.
pub type ServerSession = Session<ServerUser>;

impl<U> Default for Session<U> {
    fn default() -> Self {
        Self::Anonymous
    }
}

impl<U> Session<U> {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    #[must_use]
    pub fn user(&self) -> Option<&U> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(user) => Some(user),
        }
    }

    #[must_use]
    pub fn into_user(self) -> Option<U> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(user) => Some(user),
        }
    }

    /// Borrow the user or fail with `NotAuthenticated`.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` for an anonymous session.
    pub fn require_user(&self) -> Result<&U, SessionError> {
        self.user().ok_or(SessionError::NotAuthenticated)
    }
}

impl From<Option<ServerUser>> for ServerSession {
    fn from(user: Option<ServerUser>) -> Self {
        user.map_or(Self::Anonymous, Self::Authenticated)
    }
}

impl ServerSession {
    /// Client-visible projection of this session.
    #[must_use]
    pub fn to_client(&self) -> ClientSession {
        match self {
            Self::Anonymous => Session::Anonymous,
            Self::Authenticated(user) => Session::Authenticated(user.to_client()),
        }
    }
}

/// Text a rendering layer shows for the current session.
#[must_use]
pub fn greeting(session: &ClientSession) -> String {
    match session {
        Session::Authenticated(user) => format!("Hello, {}", user.profile.label()),
        Session::Anonymous => "You are not logged in".to_owned(),
    }
}

/// Resolve credentials into a session with exactly one backend fetch.
///
/// # Errors
///
/// Returns `BackendUnavailable` if the backend fetch fails.
pub async fn resolve_session(
    backend: &dyn IdentityBackend,
    credentials: &Credentials,
) -> Result<ServerSession, SessionError> {
    let user = backend.fetch_session(credentials).await.map_err(|e| {
        tracing::warn!(error = %e, "session fetch failed");
        SessionError::from(e)
    })?;

    match &user {
        Some(u) => tracing::debug!(user_id = %u.profile.id, "session resolved"),
        None => tracing::debug!("session resolved as anonymous"),
    }
    Ok(ServerSession::from(user))
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
