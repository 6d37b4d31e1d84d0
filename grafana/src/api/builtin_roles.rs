//! Built-in role assignment API implementation

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::roles::Role;
use super::{ApiError, Client};

const BUILTIN_ROLES_PATH: &str = "/api/access-control/builtin-roles";

/// Assignments keyed by built-in role name ("Viewer", "Grafana Admin", ...)
pub type BuiltInRoleAssignments = HashMap<String, Vec<Role>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuiltInRoleAssignment {
    #[serde(rename = "roleUid")]
    pub role_uid: String,
    #[serde(rename = "builtinRole")]
    pub builtin_role: String,
}

impl BuiltInRoleAssignment {
    pub fn new(builtin_role: &str, role_uid: &str) -> Self {
        Self {
            role_uid: role_uid.to_string(),
            builtin_role: builtin_role.to_string(),
        }
    }
}

/// Built-in roles API for assignment operations
pub struct BuiltInRolesApi<'a> {
    client: &'a Client,
}

impl<'a> BuiltInRolesApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// GET /api/access-control/builtin-roles
    pub async fn list(&self) -> Result<BuiltInRoleAssignments, ApiError> {
        let assignments: Option<BuiltInRoleAssignments> =
            self.client.get(BUILTIN_ROLES_PATH).await?;
        Ok(assignments.unwrap_or_default())
    }

    /// POST /api/access-control/builtin-roles
    pub async fn assign(&self, assignment: &BuiltInRoleAssignment) -> Result<(), ApiError> {
        self.client
            .post::<serde::de::IgnoredAny, _>(BUILTIN_ROLES_PATH, assignment)
            .await
            .map(|_| ())
    }

    /// DELETE /api/access-control/builtin-roles/{builtinRole}/roles/{roleUid}
    pub async fn unassign(&self, assignment: &BuiltInRoleAssignment) -> Result<(), ApiError> {
        let path = format!(
            "{}/{}/roles/{}",
            BUILTIN_ROLES_PATH,
            urlencoding::encode(&assignment.builtin_role),
            urlencoding::encode(&assignment.role_uid)
        );
        self.client
            .delete::<serde::de::IgnoredAny>(&path)
            .await
            .map(|_| ())
    }
}
