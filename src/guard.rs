//! Access policy evaluation and redirect side effects.
//!
//! SYSTEM CONTEXT
//! ==============
//! Used by both session stores and by the axum extractors. `check` is a pure
//! decision over an already-resolved session; `enforce` additionally hands a
//! failed decision to the host's `Redirector`.

use crate::config::SessionConfig;
use crate::session::Session;

/// Query parameter carrying the page to return to after sign-in.
pub const RETURN_TO_PARAM: &str = "after_auth_return_to";

/// Access requirement supplied per check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessPolicy {
    AllowAnonymous,
    /// Require a signed-in user. `None` redirects to the configured sign-in URL.
    RequireAuthenticated(Option<String>),
}

impl AccessPolicy {
    /// Require a user, redirecting to the configured sign-in URL otherwise.
    #[must_use]
    pub fn require_authenticated() -> Self {
        Self::RequireAuthenticated(None)
    }

    #[must_use]
    pub fn redirect_to(target: impl Into<String>) -> Self {
        Self::RequireAuthenticated(Some(target.into()))
    }
}

/// Outcome of an access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardResult {
    Proceed,
    Redirect(String),
}

/// What to do when a user is required but the session is anonymous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserOr {
    /// Hand back `None`.
    #[default]
    ReturnNull,
    /// Redirect to the sign-in URL, then hand back `None`.
    Redirect,
    /// Fail with `NotAuthenticated`.
    Throw,
}

/// Host navigation hook. An HTTP host turns it into a redirect response, a
/// client host into a navigation.
pub trait Redirector: Send + Sync {
    fn redirect(&self, url: &str);
}

// =============================================================================
// GUARD
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGuard {
    sign_in_url: String,
}

impl AccessGuard {
    #[must_use]
    pub fn new(sign_in_url: impl Into<String>) -> Self {
        Self { sign_in_url: sign_in_url.into() }
    }

    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.sign_in_url.clone())
    }

    #[must_use]
    pub fn sign_in_url(&self) -> &str {
        &self.sign_in_url
    }

    /// Decide whether `session` satisfies `policy`.
    #[must_use]
    pub fn check<U>(&self, session: &Session<U>, policy: &AccessPolicy) -> GuardResult {
        match (policy, session) {
            (AccessPolicy::AllowAnonymous, _) | (AccessPolicy::RequireAuthenticated(_), Session::Authenticated(_)) => {
                GuardResult::Proceed
            }
            (AccessPolicy::RequireAuthenticated(target), Session::Anonymous) => {
                GuardResult::Redirect(target.clone().unwrap_or_else(|| self.sign_in_url.clone()))
            }
        }
    }

    /// `check`, then issue the redirect through `redirector` when it fails.
    pub fn enforce<U>(&self, session: &Session<U>, policy: &AccessPolicy, redirector: &dyn Redirector) -> GuardResult {
        let result = self.check(session, policy);
        if let GuardResult::Redirect(target) = &result {
            tracing::debug!(%target, "access denied, redirecting");
            redirector.redirect(target);
        }
        result
    }
}

/// Append the return-to parameter to a sign-in target.
#[must_use]
pub fn with_return_to(target: &str, return_to: &str) -> String {
    let separator = if target.contains('?') { '&' } else { '?' };
    format!("{target}{separator}{RETURN_TO_PARAM}={}", urlencoding::encode(return_to))
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
