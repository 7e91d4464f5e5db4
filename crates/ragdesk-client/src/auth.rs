//! Request/response contract for the backend's `/auth` endpoints.
//!
//! [`AuthService`] holds no state of its own. Login URL retrieval, code
//! exchange and token refresh are sent without credentials; the current-user
//! lookup and logout go through the credential-attaching wrapper.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::http::{self, ApiClient, RequestBody};
use crate::identity::Identity;

/// Answer of `GET /auth/login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginUrl {
    pub authorization_url: String,
}

/// Tokens returned by a successful exchange or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[derive(Serialize)]
struct ExchangeRequest<'a> {
    code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    token: &'a str,
}

/// Stateless client for login, exchange, current-user lookup and logout.
#[derive(Clone)]
pub struct AuthService {
    api: Arc<ApiClient>,
}

impl AuthService {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    /// Fetch the identity provider's authorization URL.
    ///
    /// `provider` selects a specific provider; `None` lets the backend pick
    /// its default.
    pub async fn login_url(&self, provider: Option<&str>) -> Result<LoginUrl> {
        let path = match provider {
            Some(provider) => {
                let encoded: String = url::form_urlencoded::byte_serialize(provider.as_bytes()).collect();
                format!("/auth/login?provider={encoded}")
            }
            None => "/auth/login".to_string(),
        };

        let response = self
            .api
            .request_anonymous(Method::GET, &path, RequestBody::Empty)
            .await?;
        let response = http::ensure_success(response, "Failed to get login URL").await?;
        Ok(response.json().await?)
    }

    /// Exchange an authorization code (and the provider's `state`, when the
    /// flow carries one) for an access token.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Exchange`] when the backend rejects the code.
    pub async fn exchange(&self, code: &str, state: Option<&str>) -> Result<LoginResponse> {
        debug!("exchanging authorization code");
        let body = RequestBody::json(&ExchangeRequest { code, state })?;
        let response = self
            .api
            .request_anonymous(Method::POST, "/auth/exchange", body)
            .await?;
        Self::parse_token_response(response).await
    }

    /// Trade a still-valid token for a fresh one.
    pub async fn refresh(&self, token: &str) -> Result<LoginResponse> {
        debug!("refreshing access token");
        let body = RequestBody::json(&RefreshRequest { token })?;
        let response = self
            .api
            .request_anonymous(Method::POST, "/auth/refresh", body)
            .await?;
        Self::parse_token_response(response).await
    }

    /// Look up the user the current credential belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Unauthorized`] when no valid credential is held.
    pub async fn current_user(&self) -> Result<Identity> {
        self.api.get_json("/auth/me", "Failed to get user info").await
    }

    /// Invalidate the session on the backend.
    ///
    /// The backend answers with a redirect to the provider's logout page; any
    /// 2xx or 3xx status counts as success.
    pub async fn logout(&self) -> Result<()> {
        let response = self
            .api
            .request(Method::GET, "/auth/logout", RequestBody::Empty)
            .await?;
        let status = response.status();
        if status.is_success() || status.is_redirection() {
            debug!(status = status.as_u16(), "backend session invalidated");
            return Ok(());
        }
        http::ensure_success(response, "Failed to log out").await?;
        Ok(())
    }

    async fn parse_token_response(response: reqwest::Response) -> Result<LoginResponse> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        let reason = http::error_detail(&body).unwrap_or_else(|| match status {
            StatusCode::BAD_REQUEST => "invalid or expired authorization code".to_string(),
            other => format!("HTTP {other}"),
        });
        Err(ClientError::Exchange { reason })
    }
}
