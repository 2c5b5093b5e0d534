//! Session error kinds.
//!
//! Guard redirects are not errors; they come back as `GuardResult::Redirect`.
//! Everything here propagates to the caller unchanged. Nothing is retried.

use crate::backend::BackendError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The operation needs a signed-in user and the session is anonymous.
    #[error("no user is signed in")]
    NotAuthenticated,
    /// The operation is not permitted from the calling context.
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    /// The identity backend could not complete the fetch or update.
    #[error("identity backend unavailable: {0}")]
    BackendUnavailable(#[from] BackendError),
}

impl SessionError {
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden(_))
    }
}
