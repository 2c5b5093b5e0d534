//! In-process identity authority.
//!
//! DESIGN
//! ======
//! Users keyed by id; sessions keyed by the SHA-256 hex digest of their token
//! so raw tokens never sit in the map. Used by the demo server and tests.
//!
//! Sign-in here is a development shortcut: any well-formed email gets a user
//! and a fresh session. Real sign-in flows belong to the identity service.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::{BackendError, Credentials, IdentityBackend};
use crate::user::{Profile, ServerUser, UserUpdate};

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a cryptographically random 32-byte hex session token.
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

#[must_use]
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    bytes_to_hex(&hasher.finalize())
}

#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_ascii_lowercase();
    let (local, domain) = normalized.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some(normalized)
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

// =============================================================================
// BACKEND
// =============================================================================

#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    users: HashMap<String, ServerUser>,
    /// Token digest -> user id.
    sessions: HashMap<String, String>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a user with the given email and optional display name.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` for a malformed email.
    pub fn create_user(&self, email: &str, display_name: Option<&str>) -> Result<ServerUser, BackendError> {
        let email = normalize_email(email).ok_or_else(|| BackendError::Invalid(format!("malformed email: {email}")))?;
        let user = ServerUser {
            profile: Profile {
                id: Uuid::new_v4().to_string(),
                display_name: display_name.map(str::to_owned),
                primary_email: Some(email),
                primary_email_verified: false,
                profile_image_url: None,
                signed_up_at_millis: now_millis(),
            },
            metadata: crate::metadata::MetadataPartition::default(),
        };
        self.lock()
            .users
            .insert(user.profile.id.clone(), user.clone());
        tracing::info!(user_id = %user.profile.id, "user created");
        Ok(user)
    }

    /// Issue a new session token for an existing user.
    ///
    /// # Errors
    ///
    /// Returns `UnknownUser` if no user has this id.
    pub fn create_session(&self, user_id: &str) -> Result<String, BackendError> {
        let mut inner = self.lock();
        if !inner.users.contains_key(user_id) {
            return Err(BackendError::UnknownUser(user_id.to_owned()));
        }
        let token = generate_token();
        inner.sessions.insert(hash_token(&token), user_id.to_owned());
        Ok(token)
    }

    /// Find or create the user for `email` and open a session for them.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` for a malformed email.
    pub fn sign_in_with_email(&self, email: &str) -> Result<(ServerUser, String), BackendError> {
        let normalized =
            normalize_email(email).ok_or_else(|| BackendError::Invalid(format!("malformed email: {email}")))?;
        let existing = self
            .lock()
            .users
            .values()
            .find(|u| u.profile.primary_email.as_deref() == Some(normalized.as_str()))
            .cloned();
        let user = match existing {
            Some(user) => user,
            None => self.create_user(&normalized, None)?,
        };
        let token = self.create_session(&user.profile.id)?;
        tracing::info!(user_id = %user.profile.id, "signed in");
        Ok((user, token))
    }

    #[must_use]
    pub fn user(&self, user_id: &str) -> Option<ServerUser> {
        self.lock().users.get(user_id).cloned()
    }

    #[must_use]
    pub fn session_count(&self, user_id: &str) -> usize {
        self.lock()
            .sessions
            .values()
            .filter(|id| id.as_str() == user_id)
            .count()
    }
}

#[async_trait::async_trait]
impl IdentityBackend for MemoryBackend {
    async fn fetch_session(&self, credentials: &Credentials) -> Result<Option<ServerUser>, BackendError> {
        let Some(token) = credentials.token() else {
            return Ok(None);
        };
        let inner = self.lock();
        Ok(inner
            .sessions
            .get(&hash_token(token))
            .and_then(|user_id| inner.users.get(user_id))
            .cloned())
    }

    async fn apply_update(&self, user_id: &str, update: &UserUpdate) -> Result<ServerUser, BackendError> {
        let mut inner = self.lock();
        let user = inner
            .users
            .get_mut(user_id)
            .ok_or_else(|| BackendError::UnknownUser(user_id.to_owned()))?;
        if let Some(name) = &update.display_name {
            user.profile.display_name = Some(name.clone());
        }
        user.metadata.replace_with(update.metadata.clone());
        Ok(user.clone())
    }

    async fn invalidate_session(&self, user_id: &str) -> Result<(), BackendError> {
        let mut inner = self.lock();
        let before = inner.sessions.len();
        inner.sessions.retain(|_, id| id != user_id);
        tracing::debug!(%user_id, dropped = before - inner.sessions.len(), "sessions invalidated");
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
