//! User API implementation: accounts, server admin flag and role assignments

use serde::{Deserialize, Serialize};

use super::roles::Role;
use super::{ApiError, Client};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub login: String,
    #[serde(rename = "isAdmin", alias = "isGrafanaAdmin", default)]
    pub is_admin: bool,
}

/// Request body for POST /api/admin/users
#[derive(Debug, Clone, Serialize)]
pub struct CreateUserRequest {
    pub email: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub login: String,
    pub password: String,
}

/// Request body for PUT /api/users/{id}
#[derive(Debug, Clone, Serialize)]
pub struct UpdateUserRequest {
    pub email: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub login: String,
}

#[derive(Debug, Deserialize)]
struct CreateUserResponse {
    id: i64,
}

#[derive(Debug, Serialize)]
struct PasswordRequest<'a> {
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct PermissionsRequest {
    #[serde(rename = "isGrafanaAdmin")]
    is_grafana_admin: bool,
}

#[derive(Debug, Serialize)]
struct UserRoleRequest<'a> {
    #[serde(rename = "roleUid")]
    role_uid: &'a str,
}

/// Users API for user operations
pub struct UsersApi<'a> {
    client: &'a Client,
}

impl<'a> UsersApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// POST /api/admin/users, returns the new user id
    pub async fn create(&self, request: &CreateUserRequest) -> Result<i64, ApiError> {
        let response: CreateUserResponse = self.client.post("/api/admin/users", request).await?;
        Ok(response.id)
    }

    /// GET /api/users/{id}
    pub async fn get(&self, id: i64) -> Result<User, ApiError> {
        self.client.get(&format!("/api/users/{}", id)).await
    }

    /// PUT /api/users/{id}
    pub async fn update(&self, id: i64, request: &UpdateUserRequest) -> Result<(), ApiError> {
        self.client
            .put::<serde::de::IgnoredAny, _>(&format!("/api/users/{}", id), request)
            .await
            .map(|_| ())
    }

    /// PUT /api/admin/users/{id}/password
    pub async fn update_password(&self, id: i64, password: &str) -> Result<(), ApiError> {
        self.client
            .put::<serde::de::IgnoredAny, _>(
                &format!("/api/admin/users/{}/password", id),
                &PasswordRequest { password },
            )
            .await
            .map(|_| ())
    }

    /// PUT /api/admin/users/{id}/permissions
    pub async fn update_permissions(&self, id: i64, is_admin: bool) -> Result<(), ApiError> {
        self.client
            .put::<serde::de::IgnoredAny, _>(
                &format!("/api/admin/users/{}/permissions", id),
                &PermissionsRequest {
                    is_grafana_admin: is_admin,
                },
            )
            .await
            .map(|_| ())
    }

    /// DELETE /api/admin/users/{id}
    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        self.client
            .delete::<serde::de::IgnoredAny>(&format!("/api/admin/users/{}", id))
            .await
            .map(|_| ())
    }

    /// GET /api/access-control/users/{id}/roles
    pub async fn roles(&self, id: i64) -> Result<Vec<Role>, ApiError> {
        let roles: Option<Vec<Role>> = self
            .client
            .get(&format!("/api/access-control/users/{}/roles", id))
            .await?;
        Ok(roles.unwrap_or_default())
    }

    /// POST /api/access-control/users/{id}/roles
    pub async fn add_role(&self, id: i64, role_uid: &str) -> Result<(), ApiError> {
        self.client
            .post::<serde::de::IgnoredAny, _>(
                &format!("/api/access-control/users/{}/roles", id),
                &UserRoleRequest { role_uid },
            )
            .await
            .map(|_| ())
    }

    /// DELETE /api/access-control/users/{id}/roles/{roleUid}
    pub async fn remove_role(&self, id: i64, role_uid: &str) -> Result<(), ApiError> {
        self.client
            .delete::<serde::de::IgnoredAny>(&format!(
                "/api/access-control/users/{}/roles/{}",
                id,
                urlencoding::encode(role_uid)
            ))
            .await
            .map(|_| ())
    }
}
