//! Client configuration.
//!
//! The only value the backend contract requires is the API base URL. The
//! remaining fields control where the credential cache lives and how the
//! native login flow listens for the browser redirect.

use std::path::PathBuf;

use url::Url;

use crate::error::{ClientError, Result};

/// Base URL used when nothing else is configured (local development backend).
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Default location of the persisted credential cache.
pub const DEFAULT_CACHE_PATH: &str = "data/session.json";

/// Default port for the local OAuth callback listener.
pub const DEFAULT_CALLBACK_PORT: u16 = 8400;

/// Default time to wait for the browser redirect (5 minutes).
pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 300;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Environment variable overriding [`ClientConfig::base_url`].
pub const ENV_BASE_URL: &str = "RAGDESK_API_BASE_URL";
/// Environment variable overriding [`ClientConfig::cache_path`].
pub const ENV_CACHE_PATH: &str = "RAGDESK_CACHE_PATH";
/// Environment variable overriding [`ClientConfig::callback_port`].
pub const ENV_CALLBACK_PORT: &str = "RAGDESK_CALLBACK_PORT";

/// Settings shared by every component of the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Backend base URL; request paths are appended to it verbatim.
    pub base_url: String,
    /// JSON file holding the cached token and identity.
    pub cache_path: PathBuf,
    /// Port the callback listener binds on `127.0.0.1`.
    pub callback_port: u16,
    /// Seconds to wait for the browser redirect.
    pub callback_timeout_secs: u64,
    /// Seconds before an individual request is abandoned.
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            callback_port: DEFAULT_CALLBACK_PORT,
            callback_timeout_secs: DEFAULT_CALLBACK_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// Build a configuration from the process environment, falling back to
    /// the defaults for anything unset.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfig`] if a variable is set but cannot
    /// be parsed, or if the base URL is not a valid absolute URL.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(base_url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            config.base_url = base_url.trim().to_string();
        }
        if let Some(path) = lookup(ENV_CACHE_PATH).filter(|v| !v.trim().is_empty()) {
            config.cache_path = PathBuf::from(path);
        }
        if let Some(port) = lookup(ENV_CALLBACK_PORT) {
            config.callback_port =
                port.trim()
                    .parse()
                    .map_err(|_| ClientError::InvalidConfig {
                        reason: format!("{ENV_CALLBACK_PORT} must be a port number, got {port:?}"),
                    })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that the base URL is usable.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url).map_err(|e| ClientError::InvalidConfig {
            reason: format!("base URL {:?} is invalid: {e}", self.base_url),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::InvalidConfig {
                reason: format!("base URL must be http or https, got {}", url.scheme()),
            });
        }
        Ok(())
    }

    /// Join a request path onto the base URL.
    ///
    /// The path is appended as-is so a base URL carrying a path prefix
    /// (`https://host/api`) keeps it.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.base_url.trim_end_matches('/');
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        Ok(Url::parse(&format!("{base}{path}"))?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.callback_port, 8400);
        assert_eq!(config.cache_path, PathBuf::from("data/session.json"));
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            (ENV_BASE_URL, "https://rag.example.com/api/"),
            (ENV_CALLBACK_PORT, "9000"),
            (ENV_CACHE_PATH, "/tmp/ragdesk.json"),
        ]))
        .unwrap();
        assert_eq!(config.base_url, "https://rag.example.com/api/");
        assert_eq!(config.callback_port, 9000);
        assert_eq!(config.cache_path, PathBuf::from("/tmp/ragdesk.json"));
    }

    #[test]
    fn empty_values_keep_defaults() {
        let config = ClientConfig::from_lookup(lookup_from(&[(ENV_BASE_URL, "  ")])).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn bad_port_is_rejected() {
        let err = ClientConfig::from_lookup(lookup_from(&[(ENV_CALLBACK_PORT, "eighty")]))
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidConfig { .. }));
    }

    #[test]
    fn non_http_base_url_is_rejected() {
        let err = ClientConfig::from_lookup(lookup_from(&[(ENV_BASE_URL, "ftp://example.com")]))
            .unwrap_err();
        assert!(err.to_string().contains("http or https"));
    }

    #[test]
    fn endpoint_keeps_path_prefix() {
        let config = ClientConfig {
            base_url: "https://rag.example.com/api/".to_string(),
            ..ClientConfig::default()
        };
        assert_eq!(
            config.endpoint("/auth/me").unwrap().as_str(),
            "https://rag.example.com/api/auth/me"
        );
        assert_eq!(
            config.endpoint("files/").unwrap().as_str(),
            "https://rag.example.com/api/files/"
        );
    }
}
