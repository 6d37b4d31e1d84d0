//! Access control policy API implementation

use serde::{Deserialize, Serialize};

use super::{ApiError, Client};

const POLICIES_PATH: &str = "/api/access-control/policies";

/// A named bundle of permission/scope grants within an organization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(rename = "orgId")]
    pub org_id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<PolicyPermission>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyPermission {
    pub permission: String,
    #[serde(default)]
    pub scope: String,
}

#[derive(Debug, Deserialize)]
struct CreatePolicyResponse {
    uid: String,
}

/// Policies API for policy operations
pub struct PoliciesApi<'a> {
    client: &'a Client,
}

impl<'a> PoliciesApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// POST /api/access-control/policies, returns the new policy UID
    pub async fn create(&self, policy: &Policy) -> Result<String, ApiError> {
        let response: CreatePolicyResponse = self.client.post(POLICIES_PATH, policy).await?;
        Ok(response.uid)
    }

    /// GET /api/access-control/policies/{uid}
    pub async fn get(&self, uid: &str) -> Result<Policy, ApiError> {
        self.client.get(&policy_path(uid)).await
    }

    /// PUT /api/access-control/policies/{uid}
    pub async fn update(&self, uid: &str, policy: &Policy) -> Result<(), ApiError> {
        self.client
            .put::<serde::de::IgnoredAny, _>(&policy_path(uid), policy)
            .await
            .map(|_| ())
    }

    /// DELETE /api/access-control/policies/{uid}
    pub async fn delete(&self, uid: &str) -> Result<(), ApiError> {
        self.client
            .delete::<serde::de::IgnoredAny>(&policy_path(uid))
            .await
            .map(|_| ())
    }
}

fn policy_path(uid: &str) -> String {
    format!("{}/{}", POLICIES_PATH, urlencoding::encode(uid))
}
