//! OAuth redirect handling.
//!
//! [`CallbackParams`] reads the parameters the identity provider (or the
//! backend, on failure) appends to the landing page address.
//! [`CallbackListener`] lets a native front-end receive that redirect: it
//! listens on `127.0.0.1`, accepts a single GET request, answers with a short
//! HTML page, and hands back the request target so the lifecycle controller
//! can process it like any other location.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::error::{ClientError, Result};

/// The HTML page returned to the browser once the redirect arrived.
const DONE_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>ragdesk sign-in</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
               display: flex; justify-content: center; align-items: center;
               height: 100vh; margin: 0; background: #f5f5f5; color: #333; }
        .card { text-align: center; padding: 3rem; background: white; border-radius: 12px; }
    </style>
</head>
<body>
    <div class="card">
        <h1>Sign-in finished</h1>
        <p>You can close this tab and return to ragdesk.</p>
    </div>
</body>
</html>"#;

// ---------------------------------------------------------------------------
// Redirect parameters
// ---------------------------------------------------------------------------

/// What a redirect back from the identity provider carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackParams {
    /// The provider or backend reported a failure.
    Error {
        error: String,
        message: Option<String>,
    },
    /// An authorization code to exchange.
    Code { code: String, state: Option<String> },
}

impl CallbackParams {
    /// Parse the query of a `path?query#fragment` location.
    ///
    /// Returns `None` when the location carries neither an `error` nor a
    /// non-empty `code`. An `error` wins over a `code`.
    pub fn from_location(location: &str) -> Option<Self> {
        let (_, query) = location.split_once('?')?;
        let query = query.split('#').next().unwrap_or_default();

        let mut code = None;
        let mut state = None;
        let mut error = None;
        let mut message = None;

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let value = value.into_owned();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "code" => code = Some(value),
                "state" => state = Some(value),
                "error" => error = Some(value),
                "message" | "error_description" => message = message.or(Some(value)),
                _ => {}
            }
        }

        if let Some(error) = error {
            return Some(Self::Error { error, message });
        }
        code.map(|code| Self::Code { code, state })
    }

    /// Text to show the user for an error redirect.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { error, message } => Some(message.as_deref().unwrap_or(error)),
            Self::Code { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

/// A minimal HTTP listener that waits for one OAuth redirect.
pub struct CallbackListener {
    listener: TcpListener,
    timeout_secs: u64,
}

impl CallbackListener {
    /// Bind to `127.0.0.1:{port}`. Port 0 picks an ephemeral port.
    ///
    /// Binding happens before the user is sent to the provider so the
    /// redirect cannot arrive at a closed port.
    pub async fn bind(port: u16, timeout_secs: u64) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        tracing::info!(addr = %listener.local_addr()?, "callback listener ready");
        Ok(Self {
            listener,
            timeout_secs,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Wait for the redirect and return its request target
    /// (e.g. `/?code=abc&state=xyz`).
    ///
    /// # Errors
    ///
    /// - [`ClientError::CallbackTimeout`] if nothing arrives in time.
    /// - [`ClientError::CallbackFailed`] if the request is not a GET.
    pub async fn wait(self) -> Result<String> {
        let timeout = std::time::Duration::from_secs(self.timeout_secs);
        match tokio::time::timeout(timeout, self.accept_one()).await {
            Ok(inner) => inner,
            Err(_) => Err(ClientError::CallbackTimeout {
                timeout_secs: self.timeout_secs,
            }),
        }
    }

    async fn accept_one(&self) -> Result<String> {
        let (mut stream, peer) = self.listener.accept().await?;
        tracing::debug!(peer = %peer, "accepted callback connection");

        // Redirects are small GET requests; 8KB covers long provider states.
        let mut buf = vec![0u8; 8192];
        let n = stream.read(&mut buf).await?;
        let request = String::from_utf8_lossy(&buf[..n]);

        let target = Self::request_target(&request)?;

        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            DONE_HTML.len(),
            DONE_HTML
        );
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await?;

        tracing::info!("callback received");
        Ok(target)
    }

    /// Extract the target from `GET /path?query HTTP/1.1`.
    fn request_target(request: &str) -> Result<String> {
        let request_line = request
            .lines()
            .next()
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| ClientError::CallbackFailed {
                reason: "empty HTTP request".to_string(),
            })?;

        let mut parts = request_line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("GET"), Some(target)) => Ok(target.to_string()),
            (Some(method), Some(_)) => Err(ClientError::CallbackFailed {
                reason: format!("unexpected {method} request"),
            }),
            _ => Err(ClientError::CallbackFailed {
                reason: format!("malformed HTTP request line: {request_line}"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_code_and_state() {
        let params = CallbackParams::from_location("/?code=abc&state=xyz").unwrap();
        assert_eq!(
            params,
            CallbackParams::Code {
                code: "abc".to_string(),
                state: Some("xyz".to_string()),
            }
        );
        assert_eq!(params.error_message(), None);
    }

    #[test]
    fn params_code_without_state() {
        let params = CallbackParams::from_location("/?code=abc").unwrap();
        assert_eq!(
            params,
            CallbackParams::Code {
                code: "abc".to_string(),
                state: None,
            }
        );
    }

    #[test]
    fn params_error_with_message() {
        let params =
            CallbackParams::from_location("/?error=access_denied&message=User%20cancelled")
                .unwrap();
        assert_eq!(params.error_message(), Some("User cancelled"));
    }

    #[test]
    fn params_error_without_message_uses_code() {
        let params = CallbackParams::from_location("/?error=auth_failed").unwrap();
        assert_eq!(params.error_message(), Some("auth_failed"));
    }

    #[test]
    fn params_error_wins_over_code() {
        let params = CallbackParams::from_location("/?code=abc&error=access_denied").unwrap();
        assert!(matches!(params, CallbackParams::Error { .. }));
    }

    #[test]
    fn params_plus_and_percent_decoding() {
        let params = CallbackParams::from_location("/cb?code=a+b&state=1%2B2#frag").unwrap();
        assert_eq!(
            params,
            CallbackParams::Code {
                code: "a b".to_string(),
                state: Some("1+2".to_string()),
            }
        );
    }

    #[test]
    fn params_absent() {
        assert_eq!(CallbackParams::from_location("/"), None);
        assert_eq!(CallbackParams::from_location("/?page=2"), None);
        assert_eq!(CallbackParams::from_location("/?code="), None);
    }

    #[test]
    fn request_target_parsing() {
        let request = "GET /?code=abc&state=xyz HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n";
        assert_eq!(
            CallbackListener::request_target(request).unwrap(),
            "/?code=abc&state=xyz"
        );
        assert!(CallbackListener::request_target("").is_err());
        assert!(CallbackListener::request_target("NOTHTTP").is_err());
        assert!(CallbackListener::request_target("POST / HTTP/1.1\r\n\r\n").is_err());
    }

    #[tokio::test]
    async fn listener_receives_redirect() {
        let listener = CallbackListener::bind(0, 5).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let client_task = tokio::spawn(async move {
            let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
                .await
                .unwrap();
            let request = format!(
                "GET /?code=test_code_42&state=s99 HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\nConnection: close\r\n\r\n"
            );
            stream.write_all(request.as_bytes()).await.unwrap();

            let mut buf = vec![0u8; 4096];
            let n = stream.read(&mut buf).await.unwrap();
            let response = String::from_utf8_lossy(&buf[..n]).to_string();
            assert!(response.contains("200 OK"));
            assert!(response.contains("Sign-in finished"));
        });

        let target = listener.wait().await.unwrap();
        client_task.await.unwrap();
        assert_eq!(target, "/?code=test_code_42&state=s99");
    }

    #[tokio::test]
    async fn listener_times_out() {
        let listener = CallbackListener::bind(0, 1).await.unwrap();
        match listener.wait().await {
            Err(ClientError::CallbackTimeout { timeout_secs }) => assert_eq!(timeout_secs, 1),
            other => panic!("expected timeout, got: {other:?}"),
        }
    }
}
