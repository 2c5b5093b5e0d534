//! Client/server metadata partition.
//!
//! DESIGN
//! ======
//! A user carries three independent JSON maps:
//! - `client_metadata`: readable and writable from any context
//! - `client_read_only_metadata`: readable anywhere, writable only by the server
//! - `server_metadata`: readable and writable only by the server
//!
//! The two client-visible maps live in `ClientMetadata`, which is the only
//! half a client projection ever receives. That type split is the boundary:
//! client contexts hold `ClientUser` / `ClientMetadata` and have no server
//! map to read. `Scope` is the calling context declaring itself. It lets
//! shared code that handles a full `MetadataPartition` on behalf of a client
//! (the reactive store's update path, the demo's `PATCH /api/me`) refuse
//! server-only reads and writes. It is not an authorization token.
//!
//! Writes merge shallowly: top-level keys in a patch overwrite, keys absent
//! from the patch are kept, and a `null` value removes the key.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SessionError;

/// A JSON object keyed by string.
pub type Metadata = serde_json::Map<String, Value>;

/// Capability of the context performing a metadata read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Long-lived reactive client context. Sees only the client half.
    Client,
    /// Trusted one-shot server context.
    Server,
}

// =============================================================================
// CLIENT HALF
// =============================================================================

/// The client-visible half of a user's metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientMetadata {
    #[serde(default)]
    client_metadata: Metadata,
    #[serde(default)]
    client_read_only_metadata: Metadata,
}

impl ClientMetadata {
    #[must_use]
    pub fn new(client_metadata: Metadata, client_read_only_metadata: Metadata) -> Self {
        Self { client_metadata, client_read_only_metadata }
    }

    #[must_use]
    pub fn client(&self) -> &Metadata {
        &self.client_metadata
    }

    #[must_use]
    pub fn client_read_only(&self) -> &Metadata {
        &self.client_read_only_metadata
    }

    /// Merge a client-scoped patch against the current values, producing the
    /// full replacement maps to send to the backend.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` if the patch touches a server-writable map.
    pub fn merged(&self, patch: &MetadataPatch) -> Result<MetadataPatch, SessionError> {
        patch.check_scope(Scope::Client)?;
        Ok(MetadataPatch {
            client_metadata: merge_field(&self.client_metadata, patch.client_metadata.as_ref()),
            client_read_only_metadata: None,
            server_metadata: None,
        })
    }
}

// =============================================================================
// FULL PARTITION
// =============================================================================

/// All three metadata maps. Only ever held by server-side code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataPartition {
    #[serde(flatten)]
    visible: ClientMetadata,
    #[serde(default)]
    server_metadata: Metadata,
}

impl MetadataPartition {
    #[must_use]
    pub fn new(visible: ClientMetadata, server_metadata: Metadata) -> Self {
        Self { visible, server_metadata }
    }

    /// Read path A: client metadata, available in every scope.
    #[must_use]
    pub fn client(&self) -> &Metadata {
        self.visible.client()
    }

    #[must_use]
    pub fn client_read_only(&self) -> &Metadata {
        self.visible.client_read_only()
    }

    /// Read path B: server metadata.
    ///
    /// `scope` is the caller's own context. Code acting for a client passes
    /// `Scope::Client`; code that only ever sees `ClientMetadata` cannot reach
    /// this method at all.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` when called with `Scope::Client`.
    pub fn server(&self, scope: Scope) -> Result<&Metadata, SessionError> {
        match scope {
            Scope::Server => Ok(&self.server_metadata),
            Scope::Client => Err(SessionError::Forbidden("server metadata is not readable from a client context")),
        }
    }

    /// Copy of the client-visible half. The server map is never part of it.
    #[must_use]
    pub fn client_view(&self) -> ClientMetadata {
        self.visible.clone()
    }

    /// Merge `patch` against the current maps, producing full replacement maps
    /// for every field the patch mentions.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` if `scope` may not write one of the patched maps.
    pub fn merged(&self, patch: &MetadataPatch, scope: Scope) -> Result<MetadataPatch, SessionError> {
        patch.check_scope(scope)?;
        Ok(MetadataPatch {
            client_metadata: merge_field(&self.visible.client_metadata, patch.client_metadata.as_ref()),
            client_read_only_metadata: merge_field(
                &self.visible.client_read_only_metadata,
                patch.client_read_only_metadata.as_ref(),
            ),
            server_metadata: merge_field(&self.server_metadata, patch.server_metadata.as_ref()),
        })
    }

    /// Shallow-merge `patch` in place.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` if `scope` may not write one of the patched maps.
    pub fn apply(&mut self, patch: &MetadataPatch, scope: Scope) -> Result<(), SessionError> {
        let merged = self.merged(patch, scope)?;
        self.replace_with(merged);
        Ok(())
    }

    /// Overwrite each map the patch carries. Used by the authority that stores
    /// the record, after the caller has already merged.
    pub fn replace_with(&mut self, patch: MetadataPatch) {
        if let Some(map) = patch.client_metadata {
            self.visible.client_metadata = map;
        }
        if let Some(map) = patch.client_read_only_metadata {
            self.visible.client_read_only_metadata = map;
        }
        if let Some(map) = patch.server_metadata {
            self.server_metadata = map;
        }
    }
}

// =============================================================================
// PATCH
// =============================================================================

/// Per-map partial update. `None` leaves that map untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_metadata: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_read_only_metadata: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_metadata: Option<Metadata>,
}

impl MetadataPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.client_metadata.is_none() && self.client_read_only_metadata.is_none() && self.server_metadata.is_none()
    }

    /// Reject writes the given scope is not allowed to make.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for client-scope writes to server-writable maps.
    pub fn check_scope(&self, scope: Scope) -> Result<(), SessionError> {
        if scope == Scope::Server {
            return Ok(());
        }
        if self.server_metadata.is_some() {
            return Err(SessionError::Forbidden("server metadata cannot be written from a client context"));
        }
        if self.client_read_only_metadata.is_some() {
            return Err(SessionError::Forbidden(
                "client read-only metadata cannot be written from a client context",
            ));
        }
        Ok(())
    }
}

/// Shallow merge: patch keys overwrite, `null` removes, other keys survive.
pub fn merge_shallow(base: &mut Metadata, patch: &Metadata) {
    for (key, value) in patch {
        if value.is_null() {
            base.remove(key);
        } else {
            base.insert(key.clone(), value.clone());
        }
    }
}

fn merge_field(current: &Metadata, patch: Option<&Metadata>) -> Option<Metadata> {
    patch.map(|p| {
        let mut merged = current.clone();
        merge_shallow(&mut merged, p);
        merged
    })
}

/// Convert a JSON value into a metadata map. Non-objects yield `None`.
#[must_use]
pub fn metadata_from_value(value: Value) -> Option<Metadata> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
#[path = "metadata_test.rs"]
mod tests;
