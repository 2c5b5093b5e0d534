//! User records and their client projection.
//!
//! `ServerUser` is the full record as the identity backend stores it.
//! `ClientUser` is what a client context is allowed to hold: the same
//! identity fields and only the client-visible metadata half.

use serde::{Deserialize, Serialize};

use crate::metadata::{ClientMetadata, Metadata, MetadataPartition, MetadataPatch};

/// Identity fields shared by both user views.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Opaque unique identifier assigned by the backend.
    pub id: String,
    pub display_name: Option<String>,
    pub primary_email: Option<String>,
    #[serde(default)]
    pub primary_email_verified: bool,
    pub profile_image_url: Option<String>,
    /// Sign-up time, milliseconds since the Unix epoch.
    #[serde(default)]
    pub signed_up_at_millis: i64,
}

impl Profile {
    /// Name to show for this user: display name, else email, else id.
    #[must_use]
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .or(self.primary_email.as_deref())
            .unwrap_or(&self.id)
    }
}

// =============================================================================
// SERVER VIEW
// =============================================================================

/// Full user record, including server-only metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerUser {
    #[serde(flatten)]
    pub profile: Profile,
    #[serde(flatten)]
    pub metadata: MetadataPartition,
}

impl ServerUser {
    /// Project to the client view. The server metadata map is left behind.
    #[must_use]
    pub fn to_client(&self) -> ClientUser {
        ClientUser { profile: self.profile.clone(), metadata: self.metadata.client_view() }
    }
}

// =============================================================================
// CLIENT VIEW
// =============================================================================

/// User as seen from a client context. Has no server metadata field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientUser {
    #[serde(flatten)]
    pub profile: Profile,
    #[serde(flatten)]
    pub metadata: ClientMetadata,
}

impl ClientUser {
    #[must_use]
    pub fn client_metadata(&self) -> &Metadata {
        self.metadata.client()
    }

    #[must_use]
    pub fn client_read_only_metadata(&self) -> &Metadata {
        self.metadata.client_read_only()
    }
}

// =============================================================================
// UPDATE
// =============================================================================

/// Partial user update. Omitted fields are left untouched.
///
/// Callers pass patches; the session stores merge them against the current
/// record before the update reaches the backend, so the backend receives
/// full replacement maps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(flatten)]
    pub metadata: MetadataPatch,
}

impl UserUpdate {
    #[must_use]
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn client_metadata(mut self, map: Metadata) -> Self {
        self.metadata.client_metadata = Some(map);
        self
    }

    #[must_use]
    pub fn client_read_only_metadata(mut self, map: Metadata) -> Self {
        self.metadata.client_read_only_metadata = Some(map);
        self
    }

    #[must_use]
    pub fn server_metadata(mut self, map: Metadata) -> Self {
        self.metadata.server_metadata = Some(map);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.metadata.is_empty()
    }
}

#[cfg(test)]
#[path = "user_test.rs"]
mod tests;
