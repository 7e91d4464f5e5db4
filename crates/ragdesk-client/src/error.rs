//! Error types for the client crate.
//!
//! Every fallible operation surfaces a [`ClientError`]. The variants separate
//! the failures the session lifecycle treats differently: a 401 clears local
//! credentials, a failed exchange is shown to the user, and everything else is
//! handed back to whichever caller started the request.

/// Unified error type for the ragdesk client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The backend answered with HTTP 401. Local credentials have already been
    /// cleared by the time a caller sees this.
    #[error("Unauthorized - Please sign in again")]
    Unauthorized,

    /// The backend answered with a non-success status other than 401.
    #[error("{message}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// Caller context plus the status reason, e.g. `Failed to fetch files: Not Found`.
        message: String,
        /// The backend's `detail` field, when the body carried one.
        detail: Option<String>,
    },

    /// The authorization code exchange was rejected.
    #[error("Authentication failed: {reason}")]
    Exchange {
        /// Explanation from the backend, or the HTTP status.
        reason: String,
    },

    /// The identity provider redirected back with an `error` parameter.
    #[error("{message}")]
    ProviderError {
        /// The provider's message, or its raw error code.
        message: String,
    },

    /// The authorization code was already submitted once.
    #[error("Authentication failed: authorization code already used, please sign in again")]
    CodeAlreadyUsed,

    /// The `state` returned by the provider does not match the login we started.
    #[error("Authentication failed: state mismatch (expected {expected}, got {returned})")]
    StateMismatch {
        /// The state recorded when the login was started.
        expected: String,
        /// The state carried by the redirect.
        returned: String,
    },

    /// A file was rejected before any request was made.
    #[error("unsupported file: {reason}")]
    UnsupportedFile {
        /// Why the file cannot be sent.
        reason: String,
    },

    /// The callback listener gave up waiting for the browser redirect.
    #[error("callback timed out after {timeout_secs} seconds")]
    CallbackTimeout {
        /// How long we waited.
        timeout_secs: u64,
    },

    /// The callback listener received something it could not interpret.
    #[error("callback failed: {reason}")]
    CallbackFailed {
        /// What was wrong with the request.
        reason: String,
    },

    /// The credential cache could not be read or written.
    #[error("credential cache error: {reason}")]
    Cache {
        /// Details about the failure.
        reason: String,
    },

    /// Configuration is missing or malformed.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// The request never produced a response (connection refused, timeout, ...).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error (cache file, uploaded file, callback socket).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing error.
    #[error("url parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl ClientError {
    /// Whether this error means the backend rejected our credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// The HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::Status { status, .. } => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, ClientError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_unauthorized() {
        assert_eq!(
            ClientError::Unauthorized.to_string(),
            "Unauthorized - Please sign in again"
        );
    }

    #[test]
    fn error_display_status_uses_message() {
        let err = ClientError::Status {
            status: 404,
            message: "Failed to fetch files: Not Found".to_string(),
            detail: None,
        };
        assert_eq!(err.to_string(), "Failed to fetch files: Not Found");
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn error_display_exchange() {
        let err = ClientError::Exchange {
            reason: "invalid code".to_string(),
        };
        assert_eq!(err.to_string(), "Authentication failed: invalid code");
    }

    #[test]
    fn error_display_state_mismatch() {
        let err = ClientError::StateMismatch {
            expected: "a".to_string(),
            returned: "b".to_string(),
        };
        assert!(err.to_string().contains("expected a, got b"));
    }

    #[test]
    fn error_display_callback_timeout() {
        let err = ClientError::CallbackTimeout { timeout_secs: 120 };
        assert_eq!(err.to_string(), "callback timed out after 120 seconds");
    }

    #[test]
    fn unauthorized_classification() {
        assert!(ClientError::Unauthorized.is_unauthorized());
        assert!(!ClientError::CodeAlreadyUsed.is_unauthorized());
        assert_eq!(ClientError::CodeAlreadyUsed.status(), None);
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ClientError>();
    }
}
