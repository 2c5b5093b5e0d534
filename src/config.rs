//! Session configuration parsed from environment variables.

use std::time::Duration;

pub const DEFAULT_SIGN_IN_URL: &str = "/handler/sign-in";
pub const DEFAULT_AFTER_SIGN_OUT_URL: &str = "/";
pub const DEFAULT_COOKIE_NAME: &str = "session_token";
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Redirect target for `RequireAuthenticated` without an explicit target.
    pub sign_in_url: String,
    /// Redirect target issued after sign-out.
    pub after_sign_out_url: String,
    /// Cookie carrying the session token in HTTP hosts.
    pub cookie_name: String,
    pub cookie_secure: bool,
    /// Remote identity service. `None` means an in-process backend.
    pub backend_url: Option<String>,
    /// Key identifying this process as a trusted server to the backend.
    pub server_key: Option<String>,
    pub backend_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sign_in_url: DEFAULT_SIGN_IN_URL.to_owned(),
            after_sign_out_url: DEFAULT_AFTER_SIGN_OUT_URL.to_owned(),
            cookie_name: DEFAULT_COOKIE_NAME.to_owned(),
            cookie_secure: false,
            backend_url: None,
            server_key: None,
            backend_timeout: Duration::from_secs(DEFAULT_BACKEND_TIMEOUT_SECS),
        }
    }
}

impl SessionConfig {
    /// Build config from the process environment.
    ///
    /// - `SESSION_SIGN_IN_URL`: default `/handler/sign-in`
    /// - `SESSION_AFTER_SIGN_OUT_URL`: default `/`
    /// - `SESSION_COOKIE_NAME`: default `session_token`
    /// - `SESSION_COOKIE_SECURE`: bool; inferred from an `https://` sign-in URL when unset
    /// - `IDENTITY_BACKEND_URL`: remote identity service base URL
    /// - `IDENTITY_SERVER_KEY`: trusted-server key sent to the backend
    /// - `IDENTITY_REQUEST_TIMEOUT_SECS`: default 10
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        let sign_in_url = non_empty("SESSION_SIGN_IN_URL").unwrap_or_else(|| DEFAULT_SIGN_IN_URL.to_owned());
        let cookie_secure = non_empty("SESSION_COOKIE_SECURE")
            .and_then(|raw| parse_bool(&raw))
            .unwrap_or_else(|| sign_in_url.starts_with("https://"));
        let backend_timeout_secs = non_empty("IDENTITY_REQUEST_TIMEOUT_SECS")
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or(DEFAULT_BACKEND_TIMEOUT_SECS);

        Self {
            after_sign_out_url: non_empty("SESSION_AFTER_SIGN_OUT_URL")
                .unwrap_or_else(|| DEFAULT_AFTER_SIGN_OUT_URL.to_owned()),
            cookie_name: non_empty("SESSION_COOKIE_NAME").unwrap_or_else(|| DEFAULT_COOKIE_NAME.to_owned()),
            cookie_secure,
            backend_url: non_empty("IDENTITY_BACKEND_URL").map(|url| url.trim_end_matches('/').to_owned()),
            server_key: non_empty("IDENTITY_SERVER_KEY"),
            backend_timeout: Duration::from_secs(backend_timeout_secs),
            sign_in_url,
        }
    }
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse `key` from the process environment, falling back to `default`.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
