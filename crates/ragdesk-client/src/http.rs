//! HTTP client wrapper.
//!
//! Every call to the backend goes through [`ApiClient`]. It joins the request
//! path onto the configured base URL, attaches the cached bearer token, and
//! intercepts HTTP 401: the cached token and identity are cleared, the shared
//! session drops its identity, and (only when the user is somewhere other than
//! the landing page) the navigator is sent back to the landing page. Those
//! side effects complete before [`ClientError::Unauthorized`] is returned, so
//! any caller handling the error already sees the cleared state.
//!
//! Every other status is handed back untouched. The typed helpers turn
//! non-success statuses into [`ClientError::Status`] using a caller supplied
//! context string.

use std::sync::Arc;
use std::time::Duration;

use reqwest::multipart::Form;
use reqwest::{Method, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::cache::CredentialCache;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::navigator::{self, LANDING_PATH, Navigator};
use crate::state::SessionState;

/// Body of an outgoing request.
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Multipart(Form),
}

impl RequestBody {
    /// Serialize `value` into a JSON body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    fn apply(self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Self::Empty => builder,
            Self::Json(value) => builder.json(&value),
            Self::Multipart(form) => builder.multipart(form),
        }
    }
}

/// Shape of FastAPI-style error bodies.
#[derive(Debug, serde::Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// Credential-attaching, 401-intercepting client for the backend API.
pub struct ApiClient {
    config: ClientConfig,
    client: reqwest::Client,
    cache: Arc<dyn CredentialCache>,
    session: SessionState,
    navigator: Arc<dyn Navigator>,
}

impl ApiClient {
    /// Create a client sharing `cache`, `session` and `navigator` with the
    /// rest of the session lifecycle.
    ///
    /// Redirects are not followed: the backend answers logout with one, and
    /// that response is the success signal.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfig`] for an unusable base URL and
    /// [`ClientError::Network`] if the TLS backend fails to initialize.
    pub fn new(
        config: ClientConfig,
        cache: Arc<dyn CredentialCache>,
        session: SessionState,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("ragdesk/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            config,
            client,
            cache,
            session,
            navigator,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn cache(&self) -> &Arc<dyn CredentialCache> {
        &self.cache
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    /// Send an authenticated request.
    ///
    /// # Errors
    ///
    /// [`ClientError::Unauthorized`] on HTTP 401 (after the local credential
    /// state has been cleared), [`ClientError::Network`] on transport failure.
    pub async fn request(&self, method: Method, path: &str, body: RequestBody) -> Result<Response> {
        let url = self.config.endpoint(path)?;
        let mut builder = self.client.request(method.clone(), url);
        if let Some(token) = self.token() {
            builder = builder.bearer_auth(token);
        }

        debug!(method = %method, path = path, "sending request");
        let response = body.apply(builder).send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            self.handle_unauthorized(path);
            return Err(ClientError::Unauthorized);
        }

        Ok(response)
    }

    /// Send a request without credentials and without 401 interception.
    ///
    /// Used for the endpoints the user calls before being authenticated.
    pub async fn request_anonymous(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
    ) -> Result<Response> {
        let url = self.config.endpoint(path)?;
        debug!(method = %method, path = path, "sending anonymous request");
        Ok(body
            .apply(self.client.request(method, url))
            .send()
            .await?)
    }

    /// `GET` a JSON document.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, context: &str) -> Result<T> {
        let response = self.request(Method::GET, path, RequestBody::Empty).await?;
        let response = ensure_success(response, context).await?;
        Ok(response.json().await?)
    }

    /// Send a JSON body and decode a JSON response.
    pub async fn send_json<B, T>(&self, method: Method, path: &str, body: &B, context: &str) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.request(method, path, RequestBody::json(body)?).await?;
        let response = ensure_success(response, context).await?;
        Ok(response.json().await?)
    }

    /// Upload a multipart form and decode a JSON response.
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: Form,
        context: &str,
    ) -> Result<T> {
        let response = self
            .request(Method::POST, path, RequestBody::Multipart(form))
            .await?;
        let response = ensure_success(response, context).await?;
        Ok(response.json().await?)
    }

    /// `GET` raw bytes.
    pub async fn get_bytes(&self, path: &str, context: &str) -> Result<Vec<u8>> {
        let response = self.request(Method::GET, path, RequestBody::Empty).await?;
        let response = ensure_success(response, context).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// `DELETE` a resource, ignoring the response body.
    pub async fn delete(&self, path: &str, context: &str) -> Result<()> {
        let response = self.request(Method::DELETE, path, RequestBody::Empty).await?;
        ensure_success(response, context).await?;
        Ok(())
    }

    // -- Internal helpers ---------------------------------------------------

    fn token(&self) -> Option<String> {
        match self.cache.load() {
            Ok(credentials) => credentials.auth_token,
            Err(e) => {
                warn!(error = %e, "credential cache unreadable, sending request without token");
                None
            }
        }
    }

    /// The 401 side effects. Runs before the error reaches the caller.
    fn handle_unauthorized(&self, path: &str) {
        if let Err(e) = self.cache.update(&mut |c| c.forget_session()) {
            warn!(error = %e, "failed to clear credential cache after 401");
        }
        let had_identity = self.session.clear_identity();

        let location = self.navigator.location();
        if navigator::is_landing(&location) {
            debug!(path = path, "401 on landing page, not redirecting");
        } else {
            info!(path = path, from = %location, "401 received, returning to landing page");
            self.navigator.navigate(LANDING_PATH);
        }

        if had_identity {
            info!(path = path, "session cleared after 401");
        }
    }
}

/// Map a non-success response to [`ClientError::Status`].
///
/// The message is `"{context}: {reason}"`; the backend's `detail` field is
/// kept separately when present.
pub async fn ensure_success(response: Response, context: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = error_detail(&body);
    let reason = status.canonical_reason().unwrap_or(status.as_str());

    warn!(status = status.as_u16(), context = context, "request failed");
    Err(ClientError::Status {
        status: status.as_u16(),
        message: format!("{context}: {reason}"),
        detail,
    })
}

/// Extract a readable `detail` from an error body, if it has one.
pub(crate) fn error_detail(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    match parsed.detail {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::navigator::MemoryNavigator;

    #[test]
    fn error_detail_variants() {
        assert_eq!(
            error_detail(r#"{"detail":"User not found"}"#).as_deref(),
            Some("User not found")
        );
        assert_eq!(
            error_detail(r#"{"detail":[{"loc":["body"]}]}"#).as_deref(),
            Some(r#"[{"loc":["body"]}]"#)
        );
        assert_eq!(error_detail(r#"{"detail":null}"#), None);
        assert_eq!(error_detail("Internal Server Error"), None);
    }

    #[test]
    fn rejects_invalid_base_url() {
        let config = ClientConfig {
            base_url: "not a url".to_string(),
            ..ClientConfig::default()
        };
        let result = ApiClient::new(
            config,
            Arc::new(MemoryCache::new()),
            SessionState::new(),
            Arc::new(MemoryNavigator::default()),
        );
        assert!(matches!(result, Err(ClientError::InvalidConfig { .. })));
    }

    #[test]
    fn api_client_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ApiClient>();
    }
}
