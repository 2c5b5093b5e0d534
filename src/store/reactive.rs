//! Reactive (client) session store.
//!
//! DESIGN
//! ======
//! State sits behind a sync mutex that is never held across an await.
//! Every operation that talks to the backend first takes an async gate, so
//! the first fetch is shared: concurrent readers queue on the gate and then
//! find the cache filled.
//!
//! Publishing commits the new session, snapshots the listener list, releases
//! the lock and only then calls listeners, in registration order. A listener
//! registered while the first fetch is in flight is therefore in the snapshot
//! taken at commit and hears the resolved session exactly once.
//!
//! Only the client projection is cached here, so server metadata cannot reach
//! a subscriber.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::backend::{Credentials, IdentityBackend};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::guard::{AccessGuard, AccessPolicy, Redirector, UserOr};
use crate::metadata::Scope;
use crate::session::{ClientSession, Session, resolve_session};
use crate::user::{ClientUser, UserUpdate};

type Listener = Arc<dyn Fn(&ClientSession) + Send + Sync>;

/// Cloneable handle to one client context's session.
#[derive(Clone)]
pub struct ReactiveStore {
    shared: Arc<Shared>,
}

struct Shared {
    backend: Arc<dyn IdentityBackend>,
    redirector: Arc<dyn Redirector>,
    guard: AccessGuard,
    after_sign_out_url: String,
    state: Mutex<State>,
    gate: tokio::sync::Mutex<()>,
}

#[derive(Default)]
struct State {
    credentials: Credentials,
    /// `None` until the first fetch resolves.
    session: Option<ClientSession>,
    listeners: Vec<(u64, Listener)>,
    next_listener_id: u64,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ReactiveStore {
    #[must_use]
    pub fn new(
        backend: Arc<dyn IdentityBackend>,
        redirector: Arc<dyn Redirector>,
        config: &SessionConfig,
        credentials: Credentials,
    ) -> Self {
        let state = State { credentials, ..State::default() };
        Self {
            shared: Arc::new(Shared {
                backend,
                redirector,
                guard: AccessGuard::from_config(config),
                after_sign_out_url: config.after_sign_out_url.clone(),
                state: Mutex::new(state),
                gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Cached session, without fetching.
    #[must_use]
    pub fn peek(&self) -> Option<ClientSession> {
        self.shared.state().session.clone()
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.shared.state().session.is_some()
    }

    /// Current session. Served from cache once resolved; otherwise waits for
    /// the (shared) first fetch.
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` if the fetch fails. The store stays
    /// unresolved and the next call fetches again.
    pub async fn get_current(&self) -> Result<ClientSession, SessionError> {
        if let Some(session) = self.peek() {
            tracing::debug!("session cache hit");
            return Ok(session);
        }
        let _gate = self.shared.gate.lock().await;
        self.resolve_locked().await
    }

    /// Caller must hold the gate.
    async fn resolve_locked(&self) -> Result<ClientSession, SessionError> {
        if let Some(session) = self.peek() {
            return Ok(session);
        }
        let credentials = self.shared.state().credentials.clone();
        let session = resolve_session(self.shared.backend.as_ref(), &credentials)
            .await?
            .to_client();
        self.publish(session.clone());
        Ok(session)
    }

    fn publish(&self, session: ClientSession) {
        let listeners: Vec<Listener> = {
            let mut state = self.shared.state();
            state.session = Some(session.clone());
            state
                .listeners
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect()
        };
        tracing::debug!(listeners = listeners.len(), authenticated = session.is_authenticated(), "session published");
        for listener in listeners {
            listener(&session);
        }
    }

    /// Register `listener` for every session transition. Dropping the returned
    /// handle unsubscribes.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ClientSession) + Send + Sync + 'static,
    {
        let mut state = self.shared.state();
        let id = state.next_listener_id;
        state.next_listener_id += 1;
        state.listeners.push((id, Arc::new(listener)));
        Subscription { shared: Arc::downgrade(&self.shared), id }
    }

    /// Keep `policy` enforced: evaluated now if resolved, then again on every
    /// transition.
    pub fn guard(&self, policy: AccessPolicy) -> Subscription {
        let guard = self.shared.guard.clone();
        let redirector = Arc::clone(&self.shared.redirector);
        let watched = policy.clone();
        let subscription = self.subscribe(move |session| {
            guard.enforce(session, &watched, redirector.as_ref());
        });
        if let Some(session) = self.peek() {
            self.shared
                .guard
                .enforce(&session, &policy, self.shared.redirector.as_ref());
        }
        subscription
    }

    /// Current user with the `UserOr` fallback for anonymous sessions.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` for `UserOr::Throw` on an anonymous session;
    /// `BackendUnavailable` if resolution fails.
    pub async fn user_or(&self, or: UserOr) -> Result<Option<ClientUser>, SessionError> {
        let session = self.get_current().await?;
        super::resolve_user_or(session, or, &self.shared.guard, self.shared.redirector.as_ref())
    }

    /// Swap in new credentials (sign-in) and republish the resolved session.
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` if the fetch fails.
    pub async fn set_credentials(&self, credentials: Credentials) -> Result<ClientSession, SessionError> {
        let _gate = self.shared.gate.lock().await;
        {
            let mut state = self.shared.state();
            state.credentials = credentials;
            state.session = None;
        }
        self.resolve_locked().await
    }

    /// Merge `update` into the current user, persist it, and republish.
    ///
    /// # Errors
    ///
    /// - `Forbidden` if the update writes server-writable metadata
    /// - `NotAuthenticated` if no user is signed in
    /// - `BackendUnavailable` if the backend rejects or cannot be reached
    pub async fn update(&self, update: UserUpdate) -> Result<ClientSession, SessionError> {
        if let Err(e) = update.metadata.check_scope(Scope::Client) {
            tracing::warn!(error = %e, "client update rejected");
            return Err(e);
        }

        let _gate = self.shared.gate.lock().await;
        let current = self.resolve_locked().await?;
        let user = current.require_user()?;
        let outgoing = UserUpdate { display_name: update.display_name, metadata: user.metadata.merged(&update.metadata)? };

        let updated = self
            .shared
            .backend
            .apply_update(&user.profile.id, &outgoing)
            .await
            .map_err(|e| {
                tracing::warn!(user_id = %user.profile.id, error = %e, "user update failed");
                SessionError::from(e)
            })?;
        tracing::info!(user_id = %updated.profile.id, "user updated");

        let session = Session::Authenticated(updated.to_client());
        self.publish(session.clone());
        Ok(session)
    }

    /// Invalidate the session, publish `Anonymous`, and redirect to the
    /// post-sign-out URL.
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` if resolution or invalidation fails; the
    /// published session is left unchanged in that case.
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        let _gate = self.shared.gate.lock().await;
        let current = self.resolve_locked().await?;
        if let Some(user) = current.user() {
            self.shared
                .backend
                .invalidate_session(&user.profile.id)
                .await?;
            tracing::info!(user_id = %user.profile.id, "signed out");
        }

        self.shared.state().credentials = Credentials::anonymous();
        self.publish(Session::Anonymous);
        self.shared
            .redirector
            .redirect(&self.shared.after_sign_out_url);
        Ok(())
    }
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

/// Listener registration. Unsubscribes on drop.
#[must_use = "dropping a Subscription unsubscribes its listener"]
pub struct Subscription {
    shared: Weak<Shared>,
    id: u64,
}

impl Subscription {
    /// Remove the listener now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared
                .state()
                .listeners
                .retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
#[path = "reactive_test.rs"]
mod tests;
