//! Current-user session cache with redirect-based access control and
//! client/server partitioned user metadata.
//!
//! ARCHITECTURE
//! ============
//! - `store::ReactiveStore`: long-lived client context, cached and observable
//! - `store::OneShotStore`: one server request, fetched fresh on every read
//! - `guard`: access policies and redirect side effects
//! - `metadata`: client-visible vs server-only metadata
//! - `backend`: the remote identity authority (`MemoryBackend`, `HttpBackend`)
//! - `web`: axum extractors and cookie handling for server hosts

pub mod backend;
pub mod config;
pub mod error;
pub mod guard;
pub mod metadata;
pub mod session;
pub mod store;
pub mod user;
pub mod web;

pub use backend::{BackendError, Credentials, IdentityBackend};
pub use config::SessionConfig;
pub use error::SessionError;
pub use guard::{AccessGuard, AccessPolicy, GuardResult, Redirector, UserOr};
pub use metadata::{ClientMetadata, Metadata, MetadataPartition, MetadataPatch, Scope};
pub use session::{ClientSession, ServerSession, Session, greeting};
pub use store::{OneShotStore, ReactiveStore, Subscription};
pub use user::{ClientUser, Profile, ServerUser, UserUpdate};

#[cfg(test)]
pub(crate) mod test_helpers;
