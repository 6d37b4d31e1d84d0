//! Custom role API implementation

use serde::{Deserialize, Serialize};

use super::{ApiError, Client};

const ROLES_PATH: &str = "/api/access-control/roles";

/// A versioned, named set of action/scope permissions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Role {
    #[serde(rename = "orgId", default)]
    pub org_id: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default)]
    pub version: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permissions: Vec<RolePermission>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RolePermission {
    pub action: String,
    #[serde(default)]
    pub scope: String,
}

/// Roles API for role operations
pub struct RolesApi<'a> {
    client: &'a Client,
}

impl<'a> RolesApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// POST /api/access-control/roles
    ///
    /// An empty `uid` lets Grafana generate one.
    pub async fn create(&self, role: &Role) -> Result<Role, ApiError> {
        self.client.post(ROLES_PATH, role).await
    }

    /// GET /api/access-control/roles/{uid}
    pub async fn get(&self, uid: &str) -> Result<Role, ApiError> {
        self.client.get(&role_path(uid)).await
    }

    /// PUT /api/access-control/roles/{uid}
    pub async fn update(&self, role: &Role) -> Result<(), ApiError> {
        self.client
            .put::<serde::de::IgnoredAny, _>(&role_path(&role.uid), role)
            .await
            .map(|_| ())
    }

    /// DELETE /api/access-control/roles/{uid}
    pub async fn delete(&self, uid: &str) -> Result<(), ApiError> {
        self.client
            .delete::<serde::de::IgnoredAny>(&role_path(uid))
            .await
            .map(|_| ())
    }
}

fn role_path(uid: &str) -> String {
    format!("{}/{}", ROLES_PATH, urlencoding::encode(uid))
}
