//! Custom role resource implementation

use async_trait::async_trait;
use std::collections::HashMap;
use tfplug::context::Context;
use tfplug::plan_modifier::{RequiresReplaceIfChanged, UseStateForUnknown};
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
use crate::api::roles::{Role, RolePermission};
use crate::api::{ApiError, Client};
use crate::GrafanaProviderData;

#[derive(Default)]
pub struct RoleResource {
    provider_data: Option<GrafanaProviderData>,
}

impl RoleResource {
    pub fn new() -> Self {
        Self::default()
    }

    /// GET the role; 404 means it does not exist
    pub async fn exists(&self, client: &Client, uid: &str) -> Result<bool, ApiError> {
        match client.roles().get(uid).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn role_from_state(value: &DynamicValue, uid: String) -> Result<Role, Diagnostic> {
        let number = |name: &str| {
            value.get_i64(&AttributePath::new(name)).map_err(|e| {
                Diagnostic::error(format!("Invalid {}", name), e.to_string())
                    .with_attribute(AttributePath::new(name))
            })
        };

        Ok(Role {
            org_id: number("org_id")?,
            uid,
            version: number("version")?,
            name: string_attr(value, "name"),
            description: string_attr(value, "description"),
            permissions: permissions(value)?,
        })
    }

    fn state_from_role(role: Role, keep_empty_permissions: bool) -> DynamicValue {
        let permissions = role
            .permissions
            .into_iter()
            .map(|p| {
                let mut entry = HashMap::new();
                entry.insert("action".to_string(), Dynamic::String(p.action));
                entry.insert("scope".to_string(), string_or_null(p.scope));
                Dynamic::Map(entry)
            })
            .collect();

        object(vec![
            ("id", Dynamic::String(role.uid.clone())),
            ("uid", Dynamic::String(role.uid)),
            ("org_id", Dynamic::Number(role.org_id as f64)),
            ("version", Dynamic::Number(role.version as f64)),
            ("name", Dynamic::String(role.name)),
            ("description", string_or_null(role.description)),
            (
                "permissions",
                list_or_null(permissions, keep_empty_permissions),
            ),
        ])
    }

    /// Permissions form a set, so ordering differences are not changes
    fn permissions_changed(prior: &DynamicValue, planned: &DynamicValue) -> bool {
        match (permissions(prior), permissions(planned)) {
            (Ok(mut prior), Ok(mut planned)) => {
                prior.sort();
                planned.sort();
                prior != planned
            }
            _ => attribute_changed(prior, planned, "permissions"),
        }
    }
}

fn permissions(value: &DynamicValue) -> Result<Vec<RolePermission>, Diagnostic> {
    let Dynamic::List(items) = value.get(&AttributePath::new("permissions")) else {
        return Ok(Vec::new());
    };

    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let path = AttributePath::new("permissions").index(idx as i64);
            let action = match item {
                Dynamic::Map(entry) => entry.get("action").and_then(|a| a.as_str()),
                _ => None,
            };
            let Some(action) = action else {
                return Err(Diagnostic::error(
                    "Invalid permission",
                    "Each permission needs an action",
                )
                .with_attribute(path));
            };
            let scope = match item {
                Dynamic::Map(entry) => entry
                    .get("scope")
                    .and_then(|s| s.as_str())
                    .unwrap_or_default(),
                _ => "",
            };
            Ok(RolePermission {
                action: action.to_string(),
                scope: scope.to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl Resource for RoleResource {
    fn type_name(&self) -> &str {
        "grafana_role"
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: ResourceSchemaRequest,
    ) -> ResourceSchemaResponse {
        let mut permission = HashMap::new();
        permission.insert("action".to_string(), AttributeType::String);
        permission.insert("scope".to_string(), AttributeType::String);

        let schema = SchemaBuilder::new()
            .version(0)
            .description("Manages a Grafana custom role")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description("Role UID")
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("org_id", AttributeType::Number)
                    .description("Organization the role belongs to")
                    .required()
                    .validator(NumberAtLeast::new(0))
                    .plan_modifier(RequiresReplaceIfChanged)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("uid", AttributeType::String)
                    .description("Role UID; generated by Grafana when not set")
                    .optional()
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .plan_modifier(RequiresReplaceIfChanged)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("version", AttributeType::Number)
                    .description("Role version; bump it with every change")
                    .required()
                    .validator(NumberAtLeast::new(0))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
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
                    AttributeType::Set(Box::new(AttributeType::Object(permission))),
                )
                .description("Action/scope pairs granted by the role")
                .optional()
                .build(),
            )
            .build();

        ResourceSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn validate(
        &self,
        _ctx: Context,
        request: tfplug::resource::ValidateResourceConfigRequest,
    ) -> tfplug::resource::ValidateResourceConfigResponse {
        let configured = request.config.get(&AttributePath::new("permissions"));
        if !configured.is_wholly_known() {
            return tfplug::resource::ValidateResourceConfigResponse {
                diagnostics: vec![],
            };
        }

        let diagnostics = match permissions(&request.config) {
            Ok(_) => vec![],
            Err(diag) => vec![diag],
        };
        tfplug::resource::ValidateResourceConfigResponse { diagnostics }
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

        let uid = string_attr(&request.planned_state, "uid");
        let role = match Self::role_from_state(&request.planned_state, uid) {
            Ok(role) => role,
            Err(diag) => {
                diagnostics.push(diag);
                return CreateResourceResponse {
                    new_state: DynamicValue::null(),
                    diagnostics,
                };
            }
        };

        match provider_data.client.roles().create(&role).await {
            Ok(created) => {
                let mut new_state = request.planned_state;
                for name in ["uid", "id"] {
                    let path = AttributePath::new(name);
                    if let Err(e) = new_state.set_string(&path, created.uid.clone()) {
                        diagnostics.push(Diagnostic::error("Failed to set uid", e.to_string()));
                    }
                }
                CreateResourceResponse {
                    new_state,
                    diagnostics,
                }
            }
            Err(e) => {
                diagnostics.push(Diagnostic::error(
                    "Failed to create role",
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
        match provider_data.client.roles().get(&uid).await {
            Ok(role) => ReadResourceResponse {
                new_state: Some(Self::state_from_role(
                    role,
                    is_list(&request.current_state, "permissions"),
                )),
                diagnostics,
            },
            Err(e) if e.is_not_found() => {
                tracing::warn!(
                    "removing role {} from state because it no longer exists in grafana",
                    uid
                );
                ReadResourceResponse {
                    new_state: None,
                    diagnostics,
                }
            }
            Err(e) => {
                diagnostics.push(Diagnostic::error(
                    "Failed to read role",
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

        let prior = &request.prior_state;
        let planned = &request.planned_state;
        let changed = ["version", "name", "description", "org_id"]
            .iter()
            .any(|name| attribute_changed(prior, planned, name))
            || Self::permissions_changed(prior, planned);
        if !changed {
            return UpdateResourceResponse {
                new_state: request.planned_state,
                diagnostics,
            };
        }

        let uid = string_attr(prior, "id");
        let result = match Self::role_from_state(planned, uid) {
            Ok(role) => provider_data
                .client
                .roles()
                .update(&role)
                .await
                .map_err(|e| {
                    Diagnostic::error("Failed to update role", format!("API error: {}", e))
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
        if let Err(e) = provider_data.client.roles().delete(&uid).await {
            diagnostics.push(Diagnostic::error(
                "Failed to delete role",
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
impl ResourceWithConfigure for RoleResource {
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
impl ResourceWithImportState for RoleResource {
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

        let summary = format!("Unable to import Grafana Role: {}", request.id);
        let client = &provider_data.client;
        match self.exists(client, &request.id).await {
            Ok(true) => {}
            Ok(false) => {
                response
                    .diagnostics
                    .push(Diagnostic::error(summary, "Role does not exist"));
                return response;
            }
            Err(e) => {
                response
                    .diagnostics
                    .push(Diagnostic::error(summary, format!("API error: {}", e)));
                return response;
            }
        }

        match client.roles().get(&request.id).await {
            Ok(role) => response.imported_resources.push(ImportedResource {
                type_name: request.type_name,
                state: Self::state_from_role(role, false),
            }),
            Err(e) => response
                .diagnostics
                .push(Diagnostic::error(summary, format!("API error: {}", e))),
        }

        response
    }
}
