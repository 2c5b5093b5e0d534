//! Identity backend seam.
//!
//! DESIGN
//! ======
//! The backend is the remote authority for users and sessions; this crate
//! persists nothing itself. `IdentityBackend` is object-safe so stores hold an
//! `Arc<dyn IdentityBackend>` and tests swap in mocks.
//!
//! `apply_update` receives full replacement maps for every metadata field it
//! carries. Merging happens in the session stores.

pub mod http;
pub mod memory;

use std::fmt;

use crate::user::{ServerUser, UserUpdate};

pub use http::HttpBackend;
pub use memory::MemoryBackend;

/// Per-context credentials: the session token, if any.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    token: Option<String>,
}

impl Credentials {
    #[must_use]
    pub fn anonymous() -> Self {
        Self { token: None }
    }

    #[must_use]
    pub fn from_token(token: impl Into<String>) -> Self {
        let token = token.into();
        if token.is_empty() { Self::anonymous() } else { Self { token: Some(token) } }
    }

    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = if self.token.is_some() { "<redacted>" } else { "<none>" };
        f.debug_struct("Credentials").field("token", &token).finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed backend response: {0}")]
    Decode(String),
    #[error("unknown user: {0}")]
    UnknownUser(String),
    #[error("invalid request: {0}")]
    Invalid(String),
}

#[async_trait::async_trait]
pub trait IdentityBackend: Send + Sync {
    /// Resolve credentials to the signed-in user, or `None` for anonymous.
    async fn fetch_session(&self, credentials: &Credentials) -> Result<Option<ServerUser>, BackendError>;

    /// Persist an update and return the authoritative record.
    async fn apply_update(&self, user_id: &str, update: &UserUpdate) -> Result<ServerUser, BackendError>;

    /// Drop every session the user holds.
    async fn invalidate_session(&self, user_id: &str) -> Result<(), BackendError>;
}
