//! REST client for a remote identity service.
//!
//! Endpoints, relative to the configured base URL:
//! - `GET    /users/me`              resolve the `x-session-token` header
//! - `PATCH  /users/{id}`            apply a `UserUpdate`
//! - `DELETE /users/{id}/sessions`   invalidate every session of a user
//!
//! `401` and `404` from `/users/me` mean anonymous. Every other non-success
//! status surfaces as `BackendError::Status`.

use reqwest::StatusCode;

use super::{BackendError, Credentials, IdentityBackend};
use crate::config::SessionConfig;
use crate::user::{ServerUser, UserUpdate};

pub const SESSION_TOKEN_HEADER: &str = "x-session-token";
pub const SERVER_KEY_HEADER: &str = "x-server-key";

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    server_key: Option<String>,
}

impl HttpBackend {
    /// Build a client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        server_key: Option<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self { client, base_url, server_key })
    }

    /// Build from config. Returns `Ok(None)` when no backend URL is configured.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the HTTP client cannot be built.
    pub fn from_config(config: &SessionConfig) -> Result<Option<Self>, BackendError> {
        config
            .backend_url
            .as_deref()
            .map(|url| Self::new(url, config.server_key.clone(), config.backend_timeout))
            .transpose()
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.server_key {
            Some(key) => builder.header(SERVER_KEY_HEADER, key),
            None => builder,
        }
    }
}

pub(crate) fn user_path(user_id: &str) -> String {
    format!("/users/{}", urlencoding::encode(user_id))
}

async fn send(builder: reqwest::RequestBuilder) -> Result<reqwest::Response, BackendError> {
    builder
        .send()
        .await
        .map_err(|e| BackendError::Transport(e.to_string()))
}

async fn error_for_status(resp: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(BackendError::Status { status, body })
}

async fn decode_user(resp: reqwest::Response) -> Result<ServerUser, BackendError> {
    resp.json::<ServerUser>()
        .await
        .map_err(|e| BackendError::Decode(e.to_string()))
}

#[async_trait::async_trait]
impl IdentityBackend for HttpBackend {
    async fn fetch_session(&self, credentials: &Credentials) -> Result<Option<ServerUser>, BackendError> {
        let Some(token) = credentials.token() else {
            return Ok(None);
        };
        let resp = send(
            self.request(reqwest::Method::GET, "/users/me")
                .header(SESSION_TOKEN_HEADER, token),
        )
        .await?;
        if matches!(resp.status(), StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND) {
            return Ok(None);
        }
        let resp = error_for_status(resp).await?;
        decode_user(resp).await.map(Some)
    }

    async fn apply_update(&self, user_id: &str, update: &UserUpdate) -> Result<ServerUser, BackendError> {
        let resp = send(
            self.request(reqwest::Method::PATCH, &user_path(user_id))
                .json(update),
        )
        .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::UnknownUser(user_id.to_owned()));
        }
        let resp = error_for_status(resp).await?;
        decode_user(resp).await
    }

    async fn invalidate_session(&self, user_id: &str) -> Result<(), BackendError> {
        let path = format!("{}/sessions", user_path(user_id));
        let resp = send(self.request(reqwest::Method::DELETE, &path)).await?;
        error_for_status(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;
