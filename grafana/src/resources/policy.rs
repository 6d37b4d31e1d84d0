//! Access control policy resource implementation

use async_trait::async_trait;
use std::collections::HashMap;
use tfplug::context::Context;
use tfplug::plan_modifier::UseStateForUnknown;
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ImportedResource,
    ReadResourceRequest, ReadResourceResponse, Resource, ResourceSchemaRequest,
    ResourceSchemaResponse, ResourceWithConfigure, ResourceWithImportState,
    UpdateResourceRequest, UpdateResourceResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use tfplug::validator::NumberAtLeast;

use super::{
    attribute_changed, configure_provider_data, is_list, list_or_null, not_configured, object,
    string_attr, string_or_null,
};
use crate::api::policies::{Policy, PolicyPermission};
use crate::api::{ApiError, Client};
use crate::GrafanaProviderData;

const PERMISSION_KEY: &str = "Permission";
const SCOPE_KEY: &str = "Scope";

#[derive(Default)]
pub struct PolicyResource {
    provider_data: Option<GrafanaProviderData>,
}

impl PolicyResource {
    pub fn new() -> Self {
        Self::default()
    }

    /// GET the policy; 404 means it does not exist
    pub async fn exists(&self, client: &Client, uid: &str) -> Result<bool, ApiError> {
        match client.policies().get(uid).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Build the API payload from planned state
    fn policy_from_state(value: &DynamicValue) -> Result<Policy, Diagnostic> {
        let org_id = value
            .get_i64(&AttributePath::new("org_id"))
            .map_err(|e| {
                Diagnostic::error("Invalid org_id", e.to_string())
                    .with_attribute(AttributePath::new("org_id"))
            })?;

        let permissions = match value.get(&AttributePath::new("permissions")) {
            Dynamic::List(items) => items
                .iter()
                .enumerate()
                .map(|(idx, item)| permission_from_map(item, idx))
                .collect::<Result<Vec<_>, _>>()?,
            _ => Vec::new(),
        };

        Ok(Policy {
            org_id,
            name: string_attr(value, "name"),
            description: string_attr(value, "description"),
            permissions,
        })
    }

    fn state_from_policy(uid: &str, policy: Policy, keep_empty_permissions: bool) -> DynamicValue {
        let permissions = policy
            .permissions
            .into_iter()
            .map(|p| {
                let mut entry = HashMap::new();
                entry.insert(PERMISSION_KEY.to_string(), Dynamic::String(p.permission));
                if !p.scope.is_empty() {
                    entry.insert(SCOPE_KEY.to_string(), Dynamic::String(p.scope));
                }
                Dynamic::Map(entry)
            })
            .collect();

        object(vec![
            ("id", Dynamic::String(uid.to_string())),
            ("org_id", Dynamic::Number(policy.org_id as f64)),
            ("name", Dynamic::String(policy.name)),
            ("description", string_or_null(policy.description)),
            (
                "permissions",
                list_or_null(permissions, keep_empty_permissions),
            ),
        ])
    }
}

fn permission_from_map(item: &Dynamic, idx: usize) -> Result<PolicyPermission, Diagnostic> {
    let path = AttributePath::new("permissions").index(idx as i64);
    let Dynamic::Map(entry) = item else {
        return Err(
            Diagnostic::error("Invalid permission", "Each permission must be a map")
                .with_attribute(path),
        );
    };

    let permission = match entry.get(PERMISSION_KEY) {
        Some(Dynamic::String(p)) if !p.is_empty() => p.clone(),
        _ => {
            return Err(Diagnostic::error(
                "Invalid permission",
                format!("Each permission needs a '{}' key", PERMISSION_KEY),
            )
            .with_attribute(path))
        }
    };
    let scope = match entry.get(SCOPE_KEY) {
        Some(Dynamic::String(s)) => s.clone(),
        _ => String::new(),
    };

    Ok(PolicyPermission { permission, scope })
}

#[async_trait]
impl Resource for PolicyResource {
    fn type_name(&self) -> &str {
        "grafana_policy"
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: ResourceSchemaRequest,
    ) -> ResourceSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Manages a Grafana access control policy")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description("Policy UID")
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("org_id", AttributeType::Number)
                    .description("Organization the policy belongs to")
                    .required()
                    .validator(NumberAtLeast::new(0))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("Policy name")
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("description", AttributeType::String)
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(
                    "permissions",
                    AttributeType::List(Box::new(AttributeType::Map(Box::new(
                        AttributeType::String,
                    )))),
                )
                .description("Grants as maps with `Permission` and `Scope` keys")
                .optional()
                .build(),
            )
            .build();

        ResourceSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn create(
        &self,
        _ctx: Context,
        request: CreateResourceRequest,
    ) -> CreateResourceResponse {
        let mut diagnostics = vec![];

        let Some(provider_data) = &self.provider_data else {
            diagnostics.push(not_configured());
            return CreateResourceResponse {
                new_state: DynamicValue::null(),
                diagnostics,
            };
        };

        let policy = match Self::policy_from_state(&request.planned_state) {
            Ok(policy) => policy,
            Err(diag) => {
                diagnostics.push(diag);
                return CreateResourceResponse {
                    new_state: DynamicValue::null(),
                    diagnostics,
                };
            }
        };

        match provider_data.client.policies().create(&policy).await {
            Ok(uid) => {
                let mut new_state = request.planned_state;
                if let Err(e) = new_state.set_string(&AttributePath::new("id"), uid) {
                    diagnostics.push(Diagnostic::error("Failed to set id", e.to_string()));
                }
                CreateResourceResponse {
                    new_state,
                    diagnostics,
                }
            }
            Err(e) => {
                diagnostics.push(Diagnostic::error(
                    "Failed to create policy",
                    format!("API error: {}", e),
                ));
                CreateResourceResponse {
                    new_state: DynamicValue::null(),
                    diagnostics,
                }
            }
        }
    }

    async fn read(&self, _ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let mut diagnostics = vec![];

        let Some(provider_data) = &self.provider_data else {
            diagnostics.push(not_configured());
            return ReadResourceResponse {
                new_state: Some(request.current_state),
                diagnostics,
            };
        };

        let uid = string_attr(&request.current_state, "id");
        match provider_data.client.policies().get(&uid).await {
            Ok(policy) => ReadResourceResponse {
                new_state: Some(Self::state_from_policy(
                    &uid,
                    policy,
                    is_list(&request.current_state, "permissions"),
                )),
                diagnostics,
            },
            Err(e) if e.is_not_found() => {
                tracing::warn!(
                    "removing policy {} from state because it no longer exists in grafana",
                    uid
                );
                ReadResourceResponse {
                    new_state: None,
                    diagnostics,
                }
            }
            Err(e) => {
                diagnostics.push(Diagnostic::error(
                    "Failed to read policy",
                    format!("API error: {}", e),
                ));
                ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics,
                }
            }
        }
    }

    async fn update(
        &self,
        _ctx: Context,
        request: UpdateResourceRequest,
    ) -> UpdateResourceResponse {
        let mut diagnostics = vec![];

        let Some(provider_data) = &self.provider_data else {
            diagnostics.push(not_configured());
            return UpdateResourceResponse {
                new_state: request.prior_state,
                diagnostics,
            };
        };

        let changed = ["name", "description", "permissions", "org_id"]
            .iter()
            .any(|name| attribute_changed(&request.prior_state, &request.planned_state, name));
        if !changed {
            return UpdateResourceResponse {
                new_state: request.planned_state,
                diagnostics,
            };
        }

        let uid = string_attr(&request.prior_state, "id");
        let result = match Self::policy_from_state(&request.planned_state) {
            Ok(policy) => provider_data
                .client
                .policies()
                .update(&uid, &policy)
                .await
                .map_err(|e| {
                    Diagnostic::error("Failed to update policy", format!("API error: {}", e))
                }),
            Err(diag) => Err(diag),
        };

        match result {
            Ok(()) => UpdateResourceResponse {
                new_state: request.planned_state,
                diagnostics,
            },
            Err(diag) => {
                diagnostics.push(diag);
                UpdateResourceResponse {
                    new_state: request.prior_state,
                    diagnostics,
                }
            }
        }
    }

    async fn delete(
        &self,
        _ctx: Context,
        request: DeleteResourceRequest,
    ) -> DeleteResourceResponse {
        let mut diagnostics = vec![];

        let Some(provider_data) = &self.provider_data else {
            diagnostics.push(not_configured());
            return DeleteResourceResponse { diagnostics };
        };

        let uid = string_attr(&request.prior_state, "id");
        if let Err(e) = provider_data.client.policies().delete(&uid).await {
            diagnostics.push(Diagnostic::error(
                "Failed to delete policy",
                format!("API error: {}", e),
            ));
        }

        DeleteResourceResponse { diagnostics }
    }

    fn import_handler(&self) -> Option<&dyn ResourceWithImportState> {
        Some(self)
    }
}

#[async_trait]
impl ResourceWithConfigure for PolicyResource {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureResourceRequest,
    ) -> ConfigureResourceResponse {
        let (provider_data, response) = configure_provider_data(request);
        self.provider_data = provider_data;
        response
    }
}

#[async_trait]
impl ResourceWithImportState for PolicyResource {
    async fn import_state(
        &self,
        _ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
        };

        let Some(provider_data) = &self.provider_data else {
            response.diagnostics.push(not_configured());
            return response;
        };

        let summary = format!("Unable to import Grafana Policy: {}", request.id);
        let client = &provider_data.client;
        match self.exists(client, &request.id).await {
            Ok(true) => {}
            Ok(false) => {
                response
                    .diagnostics
                    .push(Diagnostic::error(summary, "Policy does not exist"));
                return response;
            }
            Err(e) => {
                response
                    .diagnostics
                    .push(Diagnostic::error(summary, format!("API error: {}", e)));
                return response;
            }
        }

        match client.policies().get(&request.id).await {
            Ok(policy) => response.imported_resources.push(ImportedResource {
                type_name: request.type_name,
                state: Self::state_from_policy(&request.id, policy, false),
            }),
            Err(e) => response
                .diagnostics
                .push(Diagnostic::error(summary, format!("API error: {}", e))),
        }

        response
    }
}
