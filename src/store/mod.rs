//! Session stores.
//!
//! ARCHITECTURE
//! ============
//! Two adapters over `session::resolve_session`:
//! - `ReactiveStore`: long-lived client context. Caches the client projection,
//!   shares the first fetch between concurrent readers, and pushes every
//!   transition to subscribers.
//! - `OneShotStore`: one server request. No cache; every read is one fetch,
//!   and dropping the future cancels it without publishing anything.

pub mod oneshot;
pub mod reactive;

pub use oneshot::OneShotStore;
pub use reactive::{ReactiveStore, Subscription};

use crate::error::SessionError;
use crate::guard::{AccessGuard, AccessPolicy, Redirector, UserOr};
use crate::session::Session;

/// Apply the `UserOr` fallback to a resolved session.
pub(crate) fn resolve_user_or<U>(
    session: Session<U>,
    or: UserOr,
    guard: &AccessGuard,
    redirector: &dyn Redirector,
) -> Result<Option<U>, SessionError> {
    match (session, or) {
        (Session::Authenticated(user), _) => Ok(Some(user)),
        (Session::Anonymous, UserOr::ReturnNull) => Ok(None),
        (session @ Session::Anonymous, UserOr::Redirect) => {
            guard.enforce(&session, &AccessPolicy::require_authenticated(), redirector);
            Ok(None)
        }
        (Session::Anonymous, UserOr::Throw) => Err(SessionError::NotAuthenticated),
    }
}
