//! Built-in role assignment resource implementation
//!
//! Manages which custom roles are granted to one of Grafana's built-in
//! roles. The resource id is the built-in role name.

use async_trait::async_trait;
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
use tfplug::validator::StringOneOf;

use super::role_changes::{role_changes, RoleChange, RoleChangeKind};
use super::{attribute_changed, configure_provider_data, not_configured, object, string_attr};
use crate::api::builtin_roles::BuiltInRoleAssignment;
use crate::api::{ApiError, Client};
use crate::GrafanaProviderData;

pub const BUILTIN_ROLE_NAMES: [&str; 4] = ["Grafana Admin", "Admin", "Editor", "Viewer"];

#[derive(Default)]
pub struct BuiltInRoleResource {
    provider_data: Option<GrafanaProviderData>,
}

impl BuiltInRoleResource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether Grafana reports any assignment for the built-in role
    pub async fn exists(&self, client: &Client, name: &str) -> Result<bool, ApiError> {
        let assignments = client.builtin_roles().list().await?;
        Ok(assignments.contains_key(name))
    }

    async fn apply_changes(
        client: &Client,
        name: &str,
        changes: &[RoleChange],
    ) -> Result<(), String> {
        let api = client.builtin_roles();
        for change in changes {
            let assignment = BuiltInRoleAssignment::new(name, &change.uid);
            let result = match change.kind {
                RoleChangeKind::Add => api.assign(&assignment).await,
                RoleChangeKind::Remove => api.unassign(&assignment).await,
            };
            result.map_err(|e| format!("Error with {} {}", name, e))?;
        }
        Ok(())
    }

    /// Current assignments for `name`, or None when Grafana has none
    async fn read_state(client: &Client, name: &str) -> Result<Option<DynamicValue>, ApiError> {
        let mut assignments = client.builtin_roles().list().await?;
        let Some(roles) = assignments.remove(name) else {
            return Ok(None);
        };

        let roles = roles
            .into_iter()
            .map(|role| Dynamic::String(role.uid))
            .collect();

        Ok(Some(object(vec![
            ("id", Dynamic::String(name.to_string())),
            ("name", Dynamic::String(name.to_string())),
            ("roles", Dynamic::List(roles)),
        ])))
    }

    fn roles(value: &DynamicValue) -> Result<Vec<String>, Diagnostic> {
        value
            .get_string_list(&AttributePath::new("roles"))
            .map_err(|e| {
                Diagnostic::error("Invalid roles", e.to_string())
                    .with_attribute(AttributePath::new("roles"))
            })
    }
}

#[async_trait]
impl Resource for BuiltInRoleResource {
    fn type_name(&self) -> &str {
        "grafana_builtin_role"
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: ResourceSchemaRequest,
    ) -> ResourceSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Assigns custom roles to a Grafana built-in role")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description("The built-in role name")
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("Built-in role name: Grafana Admin, Admin, Editor or Viewer")
                    .required()
                    .validator(StringOneOf::new(BUILTIN_ROLE_NAMES))
                    .plan_modifier(RequiresReplaceIfChanged)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(
                    "roles",
                    AttributeType::List(Box::new(AttributeType::String)),
                )
                .description("UIDs of the roles granted to the built-in role")
                .required()
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

        let name = string_attr(&request.planned_state, "name");
        let changes = Self::roles(&request.planned_state).and_then(|roles| {
            role_changes(&[], &roles).map_err(|e| Diagnostic::error("Invalid roles", e.to_string()))
        });
        let changes = match changes {
            Ok(changes) => changes,
            Err(diag) => {
                diagnostics.push(diag);
                return CreateResourceResponse {
                    new_state: DynamicValue::null(),
                    diagnostics,
                };
            }
        };

        if let Err(e) = Self::apply_changes(&provider_data.client, &name, &changes).await {
            diagnostics.push(Diagnostic::error("Failed to assign built-in role", e));
            return CreateResourceResponse {
                new_state: DynamicValue::null(),
                diagnostics,
            };
        }

        let mut new_state = request.planned_state;
        if let Err(e) = new_state.set_string(&AttributePath::new("id"), name) {
            diagnostics.push(Diagnostic::error("Failed to set id", e.to_string()));
        }

        CreateResourceResponse {
            new_state,
            diagnostics,
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

        let mut name = string_attr(&request.current_state, "name");
        if name.is_empty() {
            name = string_attr(&request.current_state, "id");
        }

        match Self::read_state(&provider_data.client, &name).await {
            Ok(Some(state)) => ReadResourceResponse {
                new_state: Some(state),
                diagnostics,
            },
            Ok(None) => {
                tracing::warn!(
                    "Built-in role {} has no role assignments, removing from state",
                    name
                );
                ReadResourceResponse {
                    new_state: None,
                    diagnostics,
                }
            }
            Err(e) => {
                diagnostics.push(Diagnostic::error(
                    "Failed to read built-in role assignments",
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

        if attribute_changed(&request.prior_state, &request.planned_state, "roles") {
            let name = string_attr(&request.planned_state, "name");
            let changes = Self::roles(&request.prior_state).and_then(|prior| {
                let planned = Self::roles(&request.planned_state)?;
                role_changes(&prior, &planned)
                    .map_err(|e| Diagnostic::error("Invalid roles", e.to_string()))
            });

            let result = match changes {
                Ok(changes) => Self::apply_changes(&provider_data.client, &name, &changes)
                    .await
                    .map_err(|e| Diagnostic::error("Failed to update built-in role", e)),
                Err(diag) => Err(diag),
            };

            if let Err(diag) = result {
                diagnostics.push(diag);
                return UpdateResourceResponse {
                    new_state: request.prior_state,
                    diagnostics,
                };
            }
        }

        UpdateResourceResponse {
            new_state: request.planned_state,
            diagnostics,
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

        let name = string_attr(&request.prior_state, "name");
        let changes = match Self::roles(&request.prior_state) {
            Ok(roles) => roles.iter().map(|uid| RoleChange::remove(uid)).collect::<Vec<_>>(),
            Err(diag) => {
                diagnostics.push(diag);
                return DeleteResourceResponse { diagnostics };
            }
        };

        if let Err(e) = Self::apply_changes(&provider_data.client, &name, &changes).await {
            diagnostics.push(Diagnostic::error("Failed to delete built-in role assignments", e));
        }

        DeleteResourceResponse { diagnostics }
    }

    fn import_handler(&self) -> Option<&dyn ResourceWithImportState> {
        Some(self)
    }
}

#[async_trait]
impl ResourceWithConfigure for BuiltInRoleResource {
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
impl ResourceWithImportState for BuiltInRoleResource {
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

        let client = &provider_data.client;
        let found = match self.exists(client, &request.id).await {
            Ok(true) => Self::read_state(client, &request.id).await,
            Ok(false) => Ok(None),
            Err(e) => Err(e),
        };

        let state = match found {
            Ok(Some(state)) => state,
            Ok(None) => {
                response.diagnostics.push(Diagnostic::error(
                    format!("Unable to import Grafana Built-In Role: {}", request.id),
                    "No roles are assigned to this built-in role",
                ));
                return response;
            }
            Err(e) => {
                response.diagnostics.push(Diagnostic::error(
                    format!("Unable to import Grafana Built-In Role: {}", request.id),
                    format!("API error: {}", e),
                ));
                return response;
            }
        };

        response.imported_resources.push(ImportedResource {
            type_name: request.type_name,
            state,
        });
        response
    }
}
