//! User resource implementation
//!
//! Besides the account itself this manages the server admin flag and the
//! user's role assignments. Grafana never returns passwords, so the stored
//! password is whatever was last applied.

use async_trait::async_trait;
use tfplug::context::Context;
use tfplug::defaults::StaticDefault;
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

use super::role_changes::{role_changes, RoleChange, RoleChangeKind};
use super::{
    attribute_changed, configure_provider_data, is_list, list_or_null, not_configured, object,
    string_attr, string_or_null,
};
use crate::api::users::{CreateUserRequest, UpdateUserRequest};
use crate::api::{ApiError, Client};
use crate::GrafanaProviderData;

#[derive(Default)]
pub struct UserResource {
    provider_data: Option<GrafanaProviderData>,
}

impl UserResource {
    pub fn new() -> Self {
        Self::default()
    }

    /// GET the user; 404 means it does not exist
    pub async fn exists(&self, client: &Client, id: i64) -> Result<bool, ApiError> {
        match client.users().get(id).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Current user state; `password` is carried over as Grafana hides it
    async fn read_state(
        client: &Client,
        id: i64,
        password: Dynamic,
        keep_empty_roles: bool,
    ) -> Result<DynamicValue, ApiError> {
        let users = client.users();
        let user = users.get(id).await?;
        let roles = users
            .roles(id)
            .await?
            .into_iter()
            .map(|role| Dynamic::String(role.uid))
            .collect();

        Ok(object(vec![
            ("id", Dynamic::String(id.to_string())),
            ("email", Dynamic::String(user.email)),
            ("name", string_or_null(user.name)),
            ("login", string_or_null(user.login)),
            ("password", password),
            ("is_admin", Dynamic::Bool(user.is_admin)),
            ("roles", list_or_null(roles, keep_empty_roles)),
        ]))
    }

    async fn apply_role_changes(
        client: &Client,
        id: i64,
        changes: &[RoleChange],
    ) -> Result<(), String> {
        let users = client.users();
        for change in changes {
            let result = match change.kind {
                RoleChangeKind::Add => users.add_role(id, &change.uid).await,
                RoleChangeKind::Remove => users.remove_role(id, &change.uid).await,
            };
            result.map_err(|e| format!("Error with {} {}", change.uid, e))?;
        }
        Ok(())
    }

    fn planned_role_changes(
        prior: &DynamicValue,
        planned: &DynamicValue,
    ) -> Result<Vec<RoleChange>, Diagnostic> {
        let path = AttributePath::new("roles");
        let invalid =
            |e: String| Diagnostic::error("Invalid roles", e).with_attribute(path.clone());

        let prior = prior.get_string_list(&path).map_err(|e| invalid(e.to_string()))?;
        let planned = planned
            .get_string_list(&path)
            .map_err(|e| invalid(e.to_string()))?;
        role_changes(&prior, &planned).map_err(|e| invalid(e.to_string()))
    }

    fn parse_id(value: &str) -> Result<i64, Diagnostic> {
        value.parse::<i64>().map_err(|_| {
            Diagnostic::error(
                "Invalid user id",
                format!("User id must be numeric, got '{}'", value),
            )
        })
    }

    /// Creation steps after the account exists
    async fn finish_create(
        client: &Client,
        id: i64,
        planned: &DynamicValue,
    ) -> Result<DynamicValue, Diagnostic> {
        if planned.get_bool(&AttributePath::new("is_admin")).unwrap_or(false) {
            client
                .users()
                .update_permissions(id, true)
                .await
                .map_err(|e| {
                    Diagnostic::error(
                        "Failed to grant admin permission",
                        format!("API error: {}", e),
                    )
                })?;
        }

        let changes = Self::planned_role_changes(&DynamicValue::object(), planned)?;
        Self::apply_role_changes(client, id, &changes)
            .await
            .map_err(|e| Diagnostic::error("Failed to assign user roles", e))?;

        Self::read_state(
            client,
            id,
            planned.get(&AttributePath::new("password")),
            is_list(planned, "roles"),
        )
        .await
        .map_err(|e| Diagnostic::error("Failed to read user", format!("API error: {}", e)))
    }

    async fn apply_update(
        client: &Client,
        id: i64,
        prior: &DynamicValue,
        planned: &DynamicValue,
    ) -> Result<DynamicValue, Diagnostic> {
        let users = client.users();

        let update = UpdateUserRequest {
            email: string_attr(planned, "email"),
            name: string_attr(planned, "name"),
            login: string_attr(planned, "login"),
        };
        users.update(id, &update).await.map_err(|e| {
            Diagnostic::error("Failed to update user", format!("API error: {}", e))
        })?;

        if attribute_changed(prior, planned, "password") {
            users
                .update_password(id, &string_attr(planned, "password"))
                .await
                .map_err(|e| {
                    Diagnostic::error("Failed to update password", format!("API error: {}", e))
                })?;
        }

        if attribute_changed(prior, planned, "is_admin") {
            let is_admin = planned.get_bool(&AttributePath::new("is_admin")).unwrap_or(false);
            users.update_permissions(id, is_admin).await.map_err(|e| {
                Diagnostic::error("Failed to update admin permission", format!("API error: {}", e))
            })?;
        }

        let changes = Self::planned_role_changes(prior, planned)?;
        Self::apply_role_changes(client, id, &changes)
            .await
            .map_err(|e| Diagnostic::error("Failed to update user roles", e))?;

        Self::read_state(
            client,
            id,
            planned.get(&AttributePath::new("password")),
            is_list(planned, "roles"),
        )
        .await
        .map_err(|e| Diagnostic::error("Failed to read user", format!("API error: {}", e)))
    }
}

/// Planned state with the new id and no unknown values left
fn partial_state(
    planned: &DynamicValue,
    id: i64,
    diagnostics: &mut Vec<Diagnostic>,
) -> DynamicValue {
    let mut state = planned.clone();
    for name in ["name", "login"] {
        let value = string_or_null(string_attr(planned, name));
        if let Err(e) = state.set_value(&AttributePath::new(name), value) {
            diagnostics.push(Diagnostic::error(
                format!("Failed to set {}", name),
                e.to_string(),
            ));
        }
    }
    if let Err(e) = state.set_string(&AttributePath::new("id"), id.to_string()) {
        diagnostics.push(Diagnostic::error("Failed to set id", e.to_string()));
    }
    state
}

#[async_trait]
impl Resource for UserResource {
    fn type_name(&self) -> &str {
        "grafana_user"
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: ResourceSchemaRequest,
    ) -> ResourceSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Manages a Grafana user and its role assignments")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description("Numeric user id")
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("email", AttributeType::String)
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("Display name; Grafana fills it in when not set")
                    .optional()
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("login", AttributeType::String)
                    .description("Login name; defaults to the email in Grafana")
                    .optional()
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("password", AttributeType::String)
                    .required()
                    .sensitive()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("is_admin", AttributeType::Bool)
                    .description("Whether the user is a Grafana server admin")
                    .optional()
                    .default(StaticDefault::bool(false))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(
                    "roles",
                    AttributeType::List(Box::new(AttributeType::String)),
                )
                .description("UIDs of the roles assigned to the user")
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

        let planned = &request.planned_state;
        if let Err(diag) = Self::planned_role_changes(&DynamicValue::object(), planned) {
            diagnostics.push(diag);
            return CreateResourceResponse {
                new_state: DynamicValue::null(),
                diagnostics,
            };
        }

        let client = &provider_data.client;
        let new_user = CreateUserRequest {
            email: string_attr(planned, "email"),
            name: string_attr(planned, "name"),
            login: string_attr(planned, "login"),
            password: string_attr(planned, "password"),
        };
        let id = match client.users().create(&new_user).await {
            Ok(id) => id,
            Err(e) => {
                diagnostics.push(Diagnostic::error(
                    "Failed to create user",
                    format!("API error: {}", e),
                ));
                return CreateResourceResponse {
                    new_state: DynamicValue::null(),
                    diagnostics,
                };
            }
        };

        // the account exists from here on, so failures still return its id
        match Self::finish_create(client, id, planned).await {
            Ok(new_state) => CreateResourceResponse {
                new_state,
                diagnostics,
            },
            Err(diag) => {
                diagnostics.push(diag);
                let new_state = partial_state(planned, id, &mut diagnostics);
                CreateResourceResponse {
                    new_state,
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

        let current = &request.current_state;
        let id = match Self::parse_id(&string_attr(current, "id")) {
            Ok(id) => id,
            Err(diag) => {
                diagnostics.push(diag);
                return ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics,
                };
            }
        };

        let result = Self::read_state(
            &provider_data.client,
            id,
            current.get(&AttributePath::new("password")),
            is_list(current, "roles"),
        )
        .await;

        match result {
            Ok(state) => ReadResourceResponse {
                new_state: Some(state),
                diagnostics,
            },
            Err(e) if e.is_not_found() => {
                tracing::warn!(
                    "removing user {} from state because it no longer exists in grafana",
                    id
                );
                ReadResourceResponse {
                    new_state: None,
                    diagnostics,
                }
            }
            Err(e) => {
                diagnostics.push(Diagnostic::error(
                    "Failed to read user",
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

        let result = match Self::parse_id(&string_attr(&request.prior_state, "id")) {
            Ok(id) => {
                Self::apply_update(
                    &provider_data.client,
                    id,
                    &request.prior_state,
                    &request.planned_state,
                )
                .await
            }
            Err(diag) => Err(diag),
        };

        match result {
            Ok(new_state) => UpdateResourceResponse {
                new_state,
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

        match Self::parse_id(&string_attr(&request.prior_state, "id")) {
            Ok(id) => {
                if let Err(e) = provider_data.client.users().delete(id).await {
                    diagnostics.push(Diagnostic::error(
                        "Failed to delete user",
                        format!("API error: {}", e),
                    ));
                }
            }
            Err(diag) => diagnostics.push(diag),
        }

        DeleteResourceResponse { diagnostics }
    }

    fn import_handler(&self) -> Option<&dyn ResourceWithImportState> {
        Some(self)
    }
}

#[async_trait]
impl ResourceWithConfigure for UserResource {
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
impl ResourceWithImportState for UserResource {
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

        let summary = format!("Unable to import Grafana User: {}", request.id);
        let id = match Self::parse_id(&request.id) {
            Ok(id) => id,
            Err(diag) => {
                response.diagnostics.push(Diagnostic::error(summary, diag.detail));
                return response;
            }
        };

        let client = &provider_data.client;
        match self.exists(client, id).await {
            Ok(true) => {}
            Ok(false) => {
                response
                    .diagnostics
                    .push(Diagnostic::error(summary, "User does not exist"));
                return response;
            }
            Err(e) => {
                response
                    .diagnostics
                    .push(Diagnostic::error(summary, format!("API error: {}", e)));
                return response;
            }
        }

        match Self::read_state(client, id, Dynamic::Null, false).await {
            Ok(state) => response.imported_resources.push(ImportedResource {
                type_name: request.type_name,
                state,
            }),
            Err(e) => response
                .diagnostics
                .push(Diagnostic::error(summary, format!("API error: {}", e))),
        }

        response
    }
}
