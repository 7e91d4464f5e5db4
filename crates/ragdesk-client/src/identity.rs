//! Identity and session records.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role of an authenticated principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Admin => f.write_str("admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role {other:?}, expected user or admin")),
        }
    }
}

/// The authenticated user as reported by `GET /auth/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    /// Identifier at the external identity provider.
    #[serde(rename = "workos_id", default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Email if known, otherwise a label built from the numeric id.
    pub fn display_name(&self) -> String {
        self.email
            .clone()
            .unwrap_or_else(|| format!("user #{}", self.id))
    }
}

/// Coarse lifecycle state derived from a [`Session`] snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Initializing,
    Authenticated,
    Anonymous,
}

/// What the rest of the application sees of authentication.
///
/// `loading` is only true while the initial restoration or a callback
/// exchange is in flight. `identity` is present iff the last check or
/// exchange succeeded and no logout or 401 happened since.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub identity: Option<Identity>,
    pub loading: bool,
}

impl Session {
    /// The state every controller starts in.
    pub fn initializing() -> Self {
        Self {
            identity: None,
            loading: true,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn state(&self) -> AuthState {
        match (&self.identity, self.loading) {
            (_, true) => AuthState::Initializing,
            (Some(_), false) => AuthState::Authenticated,
            (None, false) => AuthState::Anonymous,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_deserializes_backend_shape() {
        let json = r#"{"id":1,"workos_id":null,"email":"a@b.com","role":"admin"}"#;
        let identity: Identity = serde_json::from_str(json).unwrap();
        assert_eq!(identity.id, 1);
        assert_eq!(identity.external_id, None);
        assert_eq!(identity.email.as_deref(), Some("a@b.com"));
        assert!(identity.is_admin());
    }

    #[test]
    fn identity_tolerates_missing_optional_fields() {
        let identity: Identity = serde_json::from_str(r#"{"id":7,"role":"user"}"#).unwrap();
        assert_eq!(identity.display_name(), "user #7");
        assert!(!identity.is_admin());
    }

    #[test]
    fn unknown_role_is_rejected() {
        let result: Result<Identity, _> = serde_json::from_str(r#"{"id":1,"role":"owner"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn session_state_derivation() {
        let identity = Identity {
            id: 1,
            external_id: None,
            email: None,
            role: Role::User,
        };
        assert_eq!(Session::initializing().state(), AuthState::Initializing);
        let anonymous = Session {
            identity: None,
            loading: false,
        };
        assert_eq!(anonymous.state(), AuthState::Anonymous);
        let authenticated = Session {
            identity: Some(identity),
            loading: false,
        };
        assert_eq!(authenticated.state(), AuthState::Authenticated);
    }
}
