//! One-shot (server) session store, scoped to a single request.
//!
//! The session resolves at most once per store. Later reads, guard checks,
//! updates and sign-out in the same request act on that resolved session, so
//! what a guard approved is what an update writes to. Clones share the slot;
//! separate requests build separate stores and share nothing.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::backend::{Credentials, IdentityBackend};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::guard::{AccessGuard, AccessPolicy, GuardResult, Redirector, UserOr};
use crate::metadata::Scope;
use crate::session::{ClientSession, ServerSession, Session, resolve_session};
use crate::user::{ServerUser, UserUpdate};

#[derive(Clone)]
pub struct OneShotStore {
    backend: Arc<dyn IdentityBackend>,
    credentials: Credentials,
    guard: AccessGuard,
    after_sign_out_url: String,
    /// `None` until the request's single fetch completes.
    session: Arc<Mutex<Option<ServerSession>>>,
}

impl OneShotStore {
    #[must_use]
    pub fn new(backend: Arc<dyn IdentityBackend>, credentials: Credentials, config: &SessionConfig) -> Self {
        Self {
            backend,
            credentials,
            guard: AccessGuard::from_config(config),
            after_sign_out_url: config.after_sign_out_url.clone(),
            session: Arc::new(Mutex::new(None)),
        }
    }

    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// The request's session. The first call fetches; later calls reuse it.
    ///
    /// A failed or cancelled fetch stores nothing, so the next call fetches
    /// again.
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` if the fetch fails.
    pub async fn get_current(&self) -> Result<ServerSession, SessionError> {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.as_ref() {
            return Ok(session.clone());
        }
        let session = resolve_session(self.backend.as_ref(), &self.credentials).await?;
        *slot = Some(session.clone());
        Ok(session)
    }

    async fn store(&self, session: ServerSession) {
        *self.session.lock().await = Some(session);
    }

    /// The request's session projected for a client-bound payload.
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` if the fetch fails.
    pub async fn get_client_session(&self) -> Result<ClientSession, SessionError> {
        Ok(self.get_current().await?.to_client())
    }

    /// Resolve the request's session and evaluate `policy` against it.
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` if the fetch fails.
    pub async fn authorize(&self, policy: &AccessPolicy) -> Result<(ServerSession, GuardResult), SessionError> {
        let session = self.get_current().await?;
        let outcome = self.guard.check(&session, policy);
        Ok((session, outcome))
    }

    /// Current user with the `UserOr` fallback for anonymous sessions.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` for `UserOr::Throw` on an anonymous session;
    /// `BackendUnavailable` if the fetch fails.
    pub async fn user_or(&self, or: UserOr, redirector: &dyn Redirector) -> Result<Option<ServerUser>, SessionError> {
        let session = self.get_current().await?;
        super::resolve_user_or(session, or, &self.guard, redirector)
    }

    /// Merge `update` into the current user with server privileges.
    ///
    /// # Errors
    ///
    /// - `NotAuthenticated` if no user is signed in
    /// - `BackendUnavailable` if the backend rejects or cannot be reached
    pub async fn update(&self, update: UserUpdate) -> Result<ServerSession, SessionError> {
        let current = self.get_current().await?;
        let user = current.require_user()?;
        let outgoing = UserUpdate {
            display_name: update.display_name,
            metadata: user.metadata.merged(&update.metadata, Scope::Server)?,
        };

        let updated = self
            .backend
            .apply_update(&user.profile.id, &outgoing)
            .await
            .map_err(|e| {
                tracing::warn!(user_id = %user.profile.id, error = %e, "user update failed");
                SessionError::from(e)
            })?;
        tracing::info!(user_id = %updated.profile.id, "user updated");
        let session = Session::Authenticated(updated);
        self.store(session.clone()).await;
        Ok(session)
    }

    /// Invalidate the session and redirect to the post-sign-out URL.
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` if the fetch or invalidation fails.
    pub async fn sign_out(&self, redirector: &dyn Redirector) -> Result<(), SessionError> {
        if let Session::Authenticated(user) = self.get_current().await? {
            self.backend
                .invalidate_session(&user.profile.id)
                .await?;
            tracing::info!(user_id = %user.profile.id, "signed out");
        }
        self.store(Session::Anonymous).await;
        redirector.redirect(&self.after_sign_out_url);
        Ok(())
    }
}

#[cfg(test)]
#[path = "oneshot_test.rs"]
mod tests;
