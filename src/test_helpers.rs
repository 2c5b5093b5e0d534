//! Shared fixtures for unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde_json::Value;
use tokio::sync::Notify;

use crate::backend::{BackendError, Credentials, IdentityBackend};
use crate::metadata::{ClientMetadata, Metadata, MetadataPartition, metadata_from_value};
use crate::user::{Profile, ServerUser, UserUpdate};

pub const SECRET_MARKER: &str = "server-only-secret-7f3a";

/// Build a metadata map from a `json!` object literal.
pub fn meta(value: Value) -> Metadata {
    metadata_from_value(value).expect("test metadata must be a JSON object")
}

/// A user whose server metadata holds `SECRET_MARKER`.
pub fn sample_user(id: &str, display_name: Option<&str>, email: Option<&str>) -> ServerUser {
    ServerUser {
        profile: Profile {
            id: id.to_owned(),
            display_name: display_name.map(str::to_owned),
            primary_email: email.map(str::to_owned),
            primary_email_verified: true,
            profile_image_url: None,
            signed_up_at_millis: 1_700_000_000_000,
        },
        metadata: MetadataPartition::new(
            ClientMetadata::new(
                meta(serde_json::json!({"theme": "dark"})),
                meta(serde_json::json!({"plan": "pro"})),
            ),
            meta(serde_json::json!({"api_key": SECRET_MARKER})),
        ),
    }
}

pub fn ada() -> ServerUser {
    sample_user("user-ada", Some("Ada"), Some("ada@x.com"))
}

// =============================================================================
// MOCK BACKEND
// =============================================================================

/// Scriptable identity backend. Acts as the authority for a single user.
#[derive(Default)]
pub struct MockBackend {
    user: Mutex<Option<ServerUser>>,
    pub fetches: AtomicUsize,
    pub invalidations: AtomicUsize,
    pub updates: Mutex<Vec<UserUpdate>>,
    pub fail_fetch: AtomicBool,
    pub fail_update: AtomicBool,
    /// When set, `fetch_session` signals `entered` and waits for `release`.
    pub hold_fetch: AtomicBool,
    pub entered: Notify,
    pub release: Notify,
}

impl MockBackend {
    pub fn with_user(user: ServerUser) -> Self {
        Self { user: Mutex::new(Some(user)), ..Self::default() }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn held(user: Option<ServerUser>) -> Self {
        let backend = Self { user: Mutex::new(user), ..Self::default() };
        backend.hold_fetch.store(true, Ordering::SeqCst);
        backend
    }

    pub fn current_user(&self) -> Option<ServerUser> {
        self.user.lock().expect("mock mutex should lock").clone()
    }

    pub fn set_user(&self, user: Option<ServerUser>) {
        *self.user.lock().expect("mock mutex should lock") = user;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().expect("mock mutex should lock").len()
    }
}

#[async_trait::async_trait]
impl IdentityBackend for MockBackend {
    async fn fetch_session(&self, _credentials: &Credentials) -> Result<Option<ServerUser>, BackendError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.hold_fetch.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(BackendError::Transport("connection refused".into()));
        }
        Ok(self.current_user())
    }

    async fn apply_update(&self, user_id: &str, update: &UserUpdate) -> Result<ServerUser, BackendError> {
        self.updates
            .lock()
            .expect("mock mutex should lock")
            .push(update.clone());
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(BackendError::Status { status: 502, body: "bad gateway".into() });
        }
        let mut guard = self.user.lock().expect("mock mutex should lock");
        let user = guard
            .as_mut()
            .filter(|u| u.profile.id == user_id)
            .ok_or_else(|| BackendError::UnknownUser(user_id.to_owned()))?;
        if let Some(name) = &update.display_name {
            user.profile.display_name = Some(name.clone());
        }
        user.metadata.replace_with(update.metadata.clone());
        Ok(user.clone())
    }

    async fn invalidate_session(&self, _user_id: &str) -> Result<(), BackendError> {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        self.set_user(None);
        Ok(())
    }
}
