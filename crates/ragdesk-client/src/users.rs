//! User administration (`/auth/users`, admin only).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::http::ApiClient;
use crate::identity::Role;

/// A user account as managed by administrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    #[serde(rename = "workos_id", default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub role: Role,
    #[serde(with = "crate::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::timestamp")]
    pub updated_at: DateTime<Utc>,
}

/// One page of users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserList {
    pub users: Vec<UserRecord>,
    pub total: u64,
    pub skip: u64,
    pub limit: u64,
}

#[derive(Debug, Serialize)]
struct CreateUser<'a> {
    email: &'a str,
    role: Role,
}

#[derive(Debug, Serialize)]
struct UpdateUser<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
}

/// Client for the user administration endpoints.
#[derive(Clone)]
pub struct UserService {
    api: Arc<ApiClient>,
}

impl UserService {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    pub async fn list(&self, skip: u64, limit: u64) -> Result<UserList> {
        self.api
            .get_json(
                &format!("/auth/users?skip={skip}&limit={limit}"),
                "Failed to fetch users",
            )
            .await
    }

    pub async fn get(&self, user_id: i64) -> Result<UserRecord> {
        self.api
            .get_json(&format!("/auth/users/{user_id}"), "Failed to fetch user")
            .await
    }

    pub async fn create(&self, email: &str, role: Role) -> Result<UserRecord> {
        let user: UserRecord = self
            .api
            .send_json(
                Method::POST,
                "/auth/users",
                &CreateUser { email, role },
                "Failed to create user",
            )
            .await?;
        info!(user_id = user.id, role = %user.role, "user created");
        Ok(user)
    }

    /// Change a user's email and/or role; `None` leaves a field as is.
    pub async fn update(
        &self,
        user_id: i64,
        email: Option<&str>,
        role: Option<Role>,
    ) -> Result<UserRecord> {
        self.api
            .send_json(
                Method::PUT,
                &format!("/auth/users/{user_id}"),
                &UpdateUser { email, role },
                "Failed to update user",
            )
            .await
    }

    pub async fn delete(&self, user_id: i64) -> Result<()> {
        self.api
            .delete(&format!("/auth/users/{user_id}"), "Failed to delete user")
            .await?;
        info!(user_id = user_id, "user deleted");
        Ok(())
    }
}
