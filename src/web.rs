//! axum integration for one-shot request contexts.
//!
//! SYSTEM CONTEXT
//! ==============
//! The session token travels in an `HttpOnly` cookie. Each request gets its
//! own `OneShotStore`; nothing is cached between requests.
//!
//! - `CurrentSession` resolves the session under `AllowAnonymous`.
//! - `RequireUser` resolves under `RequireAuthenticated` and rejects with a
//!   temporary redirect to sign-in before the handler runs.
//! - `ApiUser` requires a user too, but rejects with `401` for JSON callers.
//!
//! The store inside each extractor has already resolved the session, so a
//! handler that goes on to `update` or `sign_out` does not fetch again.

use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;

use crate::backend::{Credentials, IdentityBackend};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::guard::{AccessPolicy, GuardResult, Redirector, with_return_to};
use crate::session::ServerSession;
use crate::store::OneShotStore;
use crate::user::ServerUser;

/// Backend and config shared by every request. Provide it from app state via
/// `FromRef`.
#[derive(Clone)]
pub struct AuthContext {
    pub backend: Arc<dyn IdentityBackend>,
    pub config: Arc<SessionConfig>,
}

impl AuthContext {
    #[must_use]
    pub fn new(backend: Arc<dyn IdentityBackend>, config: SessionConfig) -> Self {
        Self { backend, config: Arc::new(config) }
    }

    /// Credentials carried by the request's session cookie.
    #[must_use]
    pub fn credentials(&self, headers: &HeaderMap) -> Credentials {
        let jar = CookieJar::from_headers(headers);
        jar.get(&self.config.cookie_name)
            .map_or_else(Credentials::anonymous, |cookie| Credentials::from_token(cookie.value()))
    }

    #[must_use]
    pub fn store(&self, credentials: Credentials) -> OneShotStore {
        OneShotStore::new(Arc::clone(&self.backend), credentials, &self.config)
    }

    #[must_use]
    pub fn session_cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((self.config.cookie_name.clone(), token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.config.cookie_secure)
            .build()
    }

    #[must_use]
    pub fn clear_session_cookie(&self) -> Cookie<'static> {
        Cookie::build((self.config.cookie_name.clone(), ""))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.config.cookie_secure)
            .max_age(Duration::ZERO)
            .build()
    }
}

// =============================================================================
// REJECTION
// =============================================================================

#[derive(Debug)]
pub enum AuthRejection {
    Redirect(String),
    Session(SessionError),
}

impl From<SessionError> for AuthRejection {
    fn from(e: SessionError) -> Self {
        Self::Session(e)
    }
}

#[must_use]
pub fn status_for(e: &SessionError) -> StatusCode {
    match e {
        SessionError::NotAuthenticated => StatusCode::UNAUTHORIZED,
        SessionError::Forbidden(_) => StatusCode::FORBIDDEN,
        SessionError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Redirect(target) => Redirect::temporary(&target).into_response(),
            Self::Session(e) => {
                let status = status_for(&e);
                if status.is_server_error() {
                    tracing::error!(error = %e, "session resolution failed");
                }
                (status, e.to_string()).into_response()
            }
        }
    }
}

// =============================================================================
// EXTRACTORS
// =============================================================================

/// Session for this request; anonymous visitors are allowed.
pub struct CurrentSession {
    pub store: OneShotStore,
    pub session: ServerSession,
}

impl<S> FromRequestParts<S> for CurrentSession
where
    AuthContext: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let ctx = AuthContext::from_ref(state);
        let store = ctx.store(ctx.credentials(&parts.headers));
        let session = store.get_current().await?;
        Ok(Self { store, session })
    }
}

/// Signed-in user for this request. Anonymous requests are redirected to the
/// sign-in URL with a return-to parameter.
pub struct RequireUser {
    pub store: OneShotStore,
    pub user: ServerUser,
}

impl<S> FromRequestParts<S> for RequireUser
where
    AuthContext: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let ctx = AuthContext::from_ref(state);
        let store = ctx.store(ctx.credentials(&parts.headers));
        let decision = store
            .authorize(&AccessPolicy::require_authenticated())
            .await?;
        match decision {
            (_, GuardResult::Redirect(target)) => {
                let return_to = parts
                    .uri
                    .path_and_query()
                    .map_or("/", axum::http::uri::PathAndQuery::as_str);
                Err(AuthRejection::Redirect(with_return_to(&target, return_to)))
            }
            (session, GuardResult::Proceed) => session
                .into_user()
                .map(|user| Self { store, user })
                .ok_or(AuthRejection::Session(SessionError::NotAuthenticated)),
        }
    }
}

/// Signed-in user for JSON endpoints. Anonymous requests are rejected with
/// `401` rather than redirected.
pub struct ApiUser {
    pub store: OneShotStore,
    pub user: ServerUser,
}

impl<S> FromRequestParts<S> for ApiUser
where
    AuthContext: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let ctx = AuthContext::from_ref(state);
        let store = ctx.store(ctx.credentials(&parts.headers));
        let user = store
            .get_current()
            .await?
            .into_user()
            .ok_or(SessionError::NotAuthenticated)?;
        Ok(Self { store, user })
    }
}

// =============================================================================
// REDIRECTS
// =============================================================================

/// Redirector that remembers the last requested URL so a handler can turn it
/// into a response.
#[derive(Default)]
pub struct RedirectSlot {
    target: Mutex<Option<String>>,
}

impl RedirectSlot {
    #[must_use]
    pub fn take(&self) -> Option<String> {
        self.target
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Redirector for RedirectSlot {
    fn redirect(&self, url: &str) {
        *self
            .target
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(url.to_owned());
    }
}

/// Accept only same-site absolute paths as return targets.
#[must_use]
pub fn safe_return_to(raw: Option<&str>) -> Option<&str> {
    raw.filter(|path| path.starts_with('/') && !path.starts_with("//") && !path.contains('\\'))
}

/// Set the session cookie and send the browser on to `return_to` (or `/`).
pub fn signed_in(ctx: &AuthContext, jar: CookieJar, token: String, return_to: Option<&str>) -> Response {
    let target = safe_return_to(return_to).unwrap_or("/").to_owned();
    (jar.add(ctx.session_cookie(token)), Redirect::to(&target)).into_response()
}

/// Sign out the request's session, clear the cookie and redirect to the
/// post-sign-out URL.
pub async fn sign_out(ctx: &AuthContext, store: &OneShotStore, jar: CookieJar) -> Response {
    let slot = RedirectSlot::default();
    if let Err(e) = store.sign_out(&slot).await {
        return AuthRejection::from(e).into_response();
    }
    let target = slot
        .take()
        .unwrap_or_else(|| ctx.config.after_sign_out_url.clone());
    (jar.add(ctx.clear_session_cookie()), Redirect::to(&target)).into_response()
}

#[cfg(test)]
#[path = "web_test.rs"]
mod tests;
