//! In-process protocol dispatcher
//!
//! `ProviderServer` receives the protocol calls a Terraform host makes and
//! turns them into provider and resource trait calls. Resources are created
//! through their factory and configured with the provider data for every call.

use crate::context::Context;
use crate::logging::{init_logging, LogLevel};
use crate::plan_modifier::values_equal;
use crate::protocol::{
    apply_resource_change, configure_provider, get_provider_schema, import_resource_state,
    plan_resource_change, read_resource, stop_provider, upgrade_resource_state,
    validate_resource_config, EncodedValue,
};
use crate::provider::{
    ConfigureProviderRequest, Provider, ProviderSchemaRequest, StopProviderRequest,
};
use crate::resource::{
    ConfigureResourceRequest, CreateResourceRequest, DeleteResourceRequest,
    ImportResourceStateRequest, ReadResourceRequest, ResourceSchemaRequest,
    ResourceWithConfigure, UpdateResourceRequest, ValidateResourceConfigRequest,
};
use crate::schema::{DefaultRequest, PlanModifierRequest, Schema, ValidatorRequest};
use crate::types::{has_errors, AttributePath, Diagnostic, Dynamic, DynamicValue};
use crate::TfplugError;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Server configuration for running a Terraform provider
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Whether to install the tracing subscriber
    pub enable_logging: bool,
    pub log_level: LogLevel,
    /// Upper bound for a single resource operation
    pub operation_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enable_logging: true,
            log_level: LogLevel::Info,
            operation_timeout: Duration::from_secs(20 * 60),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_logging(mut self) -> Self {
        self.enable_logging = false;
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }
}

type ProviderData = Option<Arc<dyn Any + Send + Sync>>;

pub struct ProviderServer<P: Provider> {
    provider: RwLock<P>,
    provider_data: RwLock<ProviderData>,
    root: Context,
    config: ServerConfig,
}

impl<P: Provider + 'static> ProviderServer<P> {
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, ServerConfig::default())
    }

    pub fn with_config(provider: P, config: ServerConfig) -> Self {
        if config.enable_logging {
            init_logging(config.log_level);
        }

        Self {
            provider: RwLock::new(provider),
            provider_data: RwLock::new(None),
            root: Context::new(),
            config,
        }
    }

    fn context(&self) -> Context {
        self.root.with_timeout(self.config.operation_timeout)
    }

    pub async fn get_provider_schema(&self) -> get_provider_schema::Response {
        let provider = self.provider.read().await;
        let provider_schema = provider.schema(self.context(), ProviderSchemaRequest).await;
        let mut diagnostics = provider_schema.diagnostics;

        let mut resource_schemas = HashMap::new();
        for (name, factory) in provider.resources() {
            let resource = factory();
            let response = resource
                .schema(self.context(), ResourceSchemaRequest)
                .await;
            diagnostics.extend(response.diagnostics);
            resource_schemas.insert(name, response.schema);
        }

        get_provider_schema::Response {
            provider: Some(provider_schema.schema),
            resource_schemas,
            diagnostics,
        }
    }

    pub async fn configure_provider(
        &self,
        request: configure_provider::Request,
    ) -> configure_provider::Response {
        let config = match request.config.decode() {
            Ok(config) => config,
            Err(e) => {
                return configure_provider::Response {
                    diagnostics: vec![decode_error("provider configuration", e)],
                }
            }
        };

        let mut provider = self.provider.write().await;
        let response = provider
            .configure(
                self.context(),
                ConfigureProviderRequest {
                    terraform_version: request.terraform_version,
                    config,
                },
            )
            .await;

        if !has_errors(&response.diagnostics) {
            *self.provider_data.write().await = response.provider_data;
            tracing::debug!("provider {} configured", provider.type_name());
        }

        configure_provider::Response {
            diagnostics: response.diagnostics,
        }
    }

    pub async fn validate_resource_config(
        &self,
        request: validate_resource_config::Request,
    ) -> validate_resource_config::Response {
        let (resource, schema) = match self.unconfigured_resource(&request.type_name).await {
            Ok(found) => found,
            Err(diagnostics) => return validate_resource_config::Response { diagnostics },
        };

        let config = match request.config.decode() {
            Ok(config) => config,
            Err(e) => {
                return validate_resource_config::Response {
                    diagnostics: vec![decode_error("resource configuration", e)],
                }
            }
        };

        let mut diagnostics = validate_attributes(&schema, &config);
        if !has_errors(&diagnostics) {
            let response = resource
                .validate(
                    self.context(),
                    ValidateResourceConfigRequest {
                        type_name: request.type_name,
                        config,
                    },
                )
                .await;
            diagnostics.extend(response.diagnostics);
        }

        validate_resource_config::Response { diagnostics }
    }

    pub async fn plan_resource_change(
        &self,
        request: plan_resource_change::Request,
    ) -> plan_resource_change::Response {
        let mut response = plan_resource_change::Response {
            planned_state: request.proposed_new_state.clone(),
            requires_replace: vec![],
            diagnostics: vec![],
        };

        let schema = match self.unconfigured_resource(&request.type_name).await {
            Ok((_, schema)) => schema,
            Err(diagnostics) => {
                response.diagnostics = diagnostics;
                return response;
            }
        };

        let decoded = (
            request.prior_state.decode(),
            request.proposed_new_state.decode(),
            request.config.decode(),
        );
        let (prior, proposed, config) = match decoded {
            (Ok(prior), Ok(proposed), Ok(config)) => (prior, proposed, config),
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                response.diagnostics.push(decode_error("plan", e));
                return response;
            }
        };

        // Destroy plans pass through untouched
        if proposed.is_null() {
            return response;
        }

        let (planned, requires_replace, diagnostics) =
            plan_attributes(&schema, &prior, proposed, &config);
        response.requires_replace = requires_replace;
        response.diagnostics = diagnostics;
        match EncodedValue::from_value(&planned) {
            Ok(encoded) => response.planned_state = encoded,
            Err(e) => response.diagnostics.push(encode_error("planned state", e)),
        }

        response
    }

    pub async fn apply_resource_change(
        &self,
        request: apply_resource_change::Request,
    ) -> apply_resource_change::Response {
        let mut response = apply_resource_change::Response {
            new_state: request.prior_state.clone(),
            diagnostics: vec![],
        };

        if self.root.is_cancelled() {
            response.diagnostics.push(Diagnostic::error(
                "Provider is stopping",
                "The provider received a stop request; no further changes are applied",
            ));
            return response;
        }

        let decoded = (
            request.prior_state.decode(),
            request.planned_state.decode(),
            request.config.decode(),
        );
        let (prior, planned, config) = match decoded {
            (Ok(prior), Ok(planned), Ok(config)) => (prior, planned, config),
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                response.diagnostics.push(decode_error("apply", e));
                return response;
            }
        };

        let resource = match self.configured_resource(&request.type_name).await {
            Ok(resource) => resource,
            Err(diagnostics) => {
                response.diagnostics = diagnostics;
                return response;
            }
        };

        let ctx = self.context();
        let type_name = request.type_name;
        let new_state = if prior.is_null() {
            tracing::debug!("creating {}", type_name);
            let created = resource
                .create(
                    ctx,
                    CreateResourceRequest {
                        type_name,
                        planned_state: planned,
                        config,
                    },
                )
                .await;
            response.diagnostics.extend(created.diagnostics);
            created.new_state
        } else if planned.is_null() {
            tracing::debug!("deleting {}", type_name);
            let deleted = resource
                .delete(
                    ctx,
                    DeleteResourceRequest {
                        type_name,
                        prior_state: prior.clone(),
                    },
                )
                .await;
            let failed = has_errors(&deleted.diagnostics);
            response.diagnostics.extend(deleted.diagnostics);
            if failed {
                prior
            } else {
                DynamicValue::null()
            }
        } else {
            tracing::debug!("updating {}", type_name);
            let updated = resource
                .update(
                    ctx,
                    UpdateResourceRequest {
                        type_name,
                        prior_state: prior.clone(),
                        planned_state: planned,
                        config,
                    },
                )
                .await;
            let failed = has_errors(&updated.diagnostics);
            response.diagnostics.extend(updated.diagnostics);
            if failed {
                prior
            } else {
                updated.new_state
            }
        };

        if !has_errors(&response.diagnostics) && !new_state.value.is_wholly_known() {
            response.diagnostics.push(Diagnostic::error(
                "Provider produced an unknown value",
                "Every attribute must be known after apply",
            ));
        }

        match EncodedValue::from_value(&new_state) {
            Ok(encoded) => response.new_state = encoded,
            Err(e) => response.diagnostics.push(encode_error("new state", e)),
        }
        response
    }

    pub async fn read_resource(&self, request: read_resource::Request) -> read_resource::Response {
        let mut response = read_resource::Response {
            new_state: request.current_state.clone(),
            diagnostics: vec![],
        };

        let current_state = match request.current_state.decode() {
            Ok(state) => state,
            Err(e) => {
                response.diagnostics.push(decode_error("current state", e));
                return response;
            }
        };

        let resource = match self.configured_resource(&request.type_name).await {
            Ok(resource) => resource,
            Err(diagnostics) => {
                response.diagnostics = diagnostics;
                return response;
            }
        };

        let read = resource
            .read(
                self.context(),
                ReadResourceRequest {
                    type_name: request.type_name.clone(),
                    current_state,
                },
            )
            .await;
        response.diagnostics.extend(read.diagnostics);

        let new_state = match read.new_state {
            Some(state) => state,
            None => {
                tracing::debug!("{} no longer exists, removing from state", request.type_name);
                DynamicValue::null()
            }
        };
        match EncodedValue::from_value(&new_state) {
            Ok(encoded) => response.new_state = encoded,
            Err(e) => response.diagnostics.push(encode_error("new state", e)),
        }
        response
    }

    pub async fn import_resource_state(
        &self,
        request: import_resource_state::Request,
    ) -> import_resource_state::Response {
        let mut response = import_resource_state::Response {
            imported_resources: vec![],
            diagnostics: vec![],
        };

        let resource = match self.configured_resource(&request.type_name).await {
            Ok(resource) => resource,
            Err(diagnostics) => {
                response.diagnostics = diagnostics;
                return response;
            }
        };

        let Some(importer) = resource.import_handler() else {
            response.diagnostics.push(Diagnostic::error(
                "Resource import not supported",
                TfplugError::ImportNotSupported(request.type_name).to_string(),
            ));
            return response;
        };

        let imported = importer
            .import_state(
                self.context(),
                ImportResourceStateRequest {
                    type_name: request.type_name,
                    id: request.id,
                },
            )
            .await;
        response.diagnostics.extend(imported.diagnostics);

        for resource in imported.imported_resources {
            match EncodedValue::from_value(&resource.state) {
                Ok(state) => response
                    .imported_resources
                    .push(import_resource_state::ImportedResource {
                        type_name: resource.type_name,
                        state,
                    }),
                Err(e) => response.diagnostics.push(encode_error("imported state", e)),
            }
        }
        response
    }

    /// Stored state written by the current schema version is passed through,
    /// dropping attributes the schema no longer has
    pub async fn upgrade_resource_state(
        &self,
        request: upgrade_resource_state::Request,
    ) -> upgrade_resource_state::Response {
        let mut response = upgrade_resource_state::Response {
            upgraded_state: EncodedValue::null(),
            diagnostics: vec![],
        };

        let schema = match self.unconfigured_resource(&request.type_name).await {
            Ok((_, schema)) => schema,
            Err(diagnostics) => {
                response.diagnostics = diagnostics;
                return response;
            }
        };

        if request.version > schema.version {
            response.diagnostics.push(Diagnostic::error(
                "Unable to upgrade resource state",
                TfplugError::UpgradeFailed(format!(
                    "state version {} is newer than schema version {}",
                    request.version, schema.version
                ))
                .to_string(),
            ));
            return response;
        }

        let raw = match DynamicValue::decode_json(&request.raw_state.json) {
            Ok(raw) => raw,
            Err(e) => {
                response.diagnostics.push(decode_error("raw state", e));
                return response;
            }
        };

        let upgraded = match raw.value {
            Dynamic::Map(mut values) => {
                let attributes = schema
                    .block
                    .attributes
                    .iter()
                    .map(|attr| {
                        let value = values.remove(&attr.name).unwrap_or(Dynamic::Null);
                        (attr.name.clone(), value)
                    })
                    .collect();
                DynamicValue::new(Dynamic::Map(attributes))
            }
            other => DynamicValue::new(other),
        };

        match EncodedValue::from_value(&upgraded) {
            Ok(encoded) => response.upgraded_state = encoded,
            Err(e) => response.diagnostics.push(encode_error("upgraded state", e)),
        }
        response
    }

    /// Cancels the root context; in-flight operations observe it through
    /// their own context and no new applies start
    pub async fn stop_provider(&self) -> stop_provider::Response {
        self.root.cancel();
        let provider = self.provider.read().await;
        let response = provider.stop(Context::new(), StopProviderRequest).await;
        tracing::info!("provider {} stopped", provider.type_name());

        stop_provider::Response {
            error: response.error.unwrap_or_default(),
        }
    }

    async fn unconfigured_resource(
        &self,
        type_name: &str,
    ) -> Result<(Box<dyn ResourceWithConfigure>, Schema), Vec<Diagnostic>> {
        let provider = self.provider.read().await;
        let factories = provider.resources();
        let factory = factories
            .get(type_name)
            .ok_or_else(|| vec![unknown_resource(type_name)])?;

        let resource = factory();
        let response = resource
            .schema(self.context(), ResourceSchemaRequest)
            .await;
        if has_errors(&response.diagnostics) {
            return Err(response.diagnostics);
        }
        Ok((resource, response.schema))
    }

    async fn configured_resource(
        &self,
        type_name: &str,
    ) -> Result<Box<dyn ResourceWithConfigure>, Vec<Diagnostic>> {
        let provider_data = self.provider_data.read().await.clone();
        if provider_data.is_none() {
            return Err(vec![Diagnostic::error(
                "Provider not configured",
                TfplugError::ProviderNotConfigured.to_string(),
            )]);
        }

        let mut resource = {
            let provider = self.provider.read().await;
            let factories = provider.resources();
            let factory = factories
                .get(type_name)
                .ok_or_else(|| vec![unknown_resource(type_name)])?;
            factory()
        };

        let response = resource
            .configure(self.context(), ConfigureResourceRequest { provider_data })
            .await;
        if has_errors(&response.diagnostics) {
            return Err(response.diagnostics);
        }
        Ok(resource)
    }
}

fn unknown_resource(type_name: &str) -> Diagnostic {
    Diagnostic::error(
        "Unknown resource type",
        TfplugError::ResourceNotFound(type_name.to_string()).to_string(),
    )
}

fn decode_error(what: &str, e: TfplugError) -> Diagnostic {
    tracing::error!("failed to decode {}: {}", what, e);
    Diagnostic::error(format!("Failed to decode {}", what), e.to_string())
}

fn encode_error(what: &str, e: TfplugError) -> Diagnostic {
    tracing::error!("failed to encode {}: {}", what, e);
    Diagnostic::error(format!("Failed to encode {}", what), e.to_string())
}

/// Schema-level checks: unknown attributes, required and computed-only
/// attributes, value types and attribute validators
fn validate_attributes(schema: &Schema, config: &DynamicValue) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let values = match &config.value {
        Dynamic::Map(values) => values,
        Dynamic::Null | Dynamic::Unknown => return diagnostics,
        other => {
            diagnostics.push(Diagnostic::error(
                "Invalid configuration",
                format!("expected an object, got {}", other.type_name()),
            ));
            return diagnostics;
        }
    };

    for name in values.keys() {
        if schema.attribute(name).is_none() {
            diagnostics.push(
                Diagnostic::error(
                    format!("Unsupported argument: {}", name),
                    format!("An argument named \"{}\" is not expected here", name),
                )
                .with_attribute(AttributePath::new(name)),
            );
        }
    }

    for attr in &schema.block.attributes {
        let path = AttributePath::new(&attr.name);
        let value = values.get(&attr.name).unwrap_or(&Dynamic::Null);

        if value.is_null() {
            if attr.required {
                diagnostics.push(
                    Diagnostic::error(
                        format!("Missing required argument: {}", attr.name),
                        format!("The argument \"{}\" is required", attr.name),
                    )
                    .with_attribute(path),
                );
            }
            continue;
        }

        if attr.computed && !attr.optional && !attr.required {
            diagnostics.push(
                Diagnostic::error(
                    format!("Value for unconfigurable attribute: {}", attr.name),
                    format!("\"{}\" is computed by the provider", attr.name),
                )
                .with_attribute(path),
            );
            continue;
        }

        if !attr.r#type.accepts(value) {
            diagnostics.push(
                Diagnostic::error(
                    format!("Incorrect attribute value type: {}", attr.name),
                    format!(
                        "expected {}, got {}",
                        attr.r#type.to_type_json(),
                        value.type_name()
                    ),
                )
                .with_attribute(path),
            );
            continue;
        }

        if value.is_unknown() {
            continue;
        }
        for validator in &attr.validators {
            let response = validator.validate(ValidatorRequest {
                config_value: value.clone(),
                path: path.clone(),
            });
            diagnostics.extend(response.diagnostics);
        }
    }

    diagnostics
}

/// Defaults, unknown computed values and plan modifiers, in that order
fn plan_attributes(
    schema: &Schema,
    prior: &DynamicValue,
    proposed: DynamicValue,
    config: &DynamicValue,
) -> (DynamicValue, Vec<AttributePath>, Vec<Diagnostic>) {
    let mut planned = proposed;
    let mut requires_replace = Vec::new();
    let mut diagnostics = Vec::new();
    let creating = prior.is_null();

    for attr in &schema.block.attributes {
        let path = AttributePath::new(&attr.name);
        if config.get(&path).is_null() {
            if let Some(default) = &attr.default {
                let value = default.default_value(DefaultRequest { path: path.clone() }).value;
                if let Err(e) = planned.set_value(&path, value) {
                    diagnostics.push(Diagnostic::error("Failed to apply default", e.to_string()));
                }
            }
        }
    }

    let changed = creating || !values_equal(&planned.value, &prior.value);

    for attr in &schema.block.attributes {
        let path = AttributePath::new(&attr.name);

        if changed && attr.computed && config.get(&path).is_null() && attr.default.is_none() {
            if let Err(e) = planned.mark_unknown(&path) {
                diagnostics.push(Diagnostic::error("Failed to plan attribute", e.to_string()));
            }
        }

        for modifier in &attr.plan_modifiers {
            let modified = modifier.modify(PlanModifierRequest {
                config_value: config.get(&path),
                state_value: prior.get(&path),
                plan_value: planned.get(&path),
                path: path.clone(),
            });
            diagnostics.extend(modified.diagnostics);
            if modified.requires_replace && !creating && !requires_replace.contains(&path) {
                requires_replace.push(path.clone());
            }
            if let Err(e) = planned.set_value(&path, modified.plan_value) {
                diagnostics.push(Diagnostic::error("Failed to plan attribute", e.to_string()));
            }
        }
    }

    (planned, requires_replace, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::StaticDefault;
    use crate::plan_modifier::{RequiresReplaceIfChanged, UseStateForUnknown};
    use crate::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
    use crate::validator::StringOneOf;

    fn schema() -> Schema {
        SchemaBuilder::new()
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .required()
                    .validator(StringOneOf::new(["Admin", "Viewer"]))
                    .plan_modifier(RequiresReplaceIfChanged)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("is_admin", AttributeType::Bool)
                    .optional()
                    .default(StaticDefault::bool(false))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("roles", AttributeType::List(Box::new(AttributeType::String)))
                    .optional()
                    .build(),
            )
            .build()
    }

    fn object(pairs: &[(&str, Dynamic)]) -> DynamicValue {
        DynamicValue::new(Dynamic::Map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        ))
    }

    #[test]
    fn validation_reports_missing_and_unknown_attributes() {
        let config = object(&[("nmae", Dynamic::from("Admin"))]);
        let diagnostics = validate_attributes(&schema(), &config);

        let summaries: Vec<_> = diagnostics.iter().map(|d| d.summary.as_str()).collect();
        assert!(summaries.contains(&"Unsupported argument: nmae"));
        assert!(summaries.contains(&"Missing required argument: name"));
    }

    #[test]
    fn validation_runs_attribute_validators() {
        let config = object(&[("name", Dynamic::from("Owner"))]);
        let diagnostics = validate_attributes(&schema(), &config);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("must be one of"));
    }

    #[test]
    fn validation_rejects_wrong_types_and_computed_values() {
        let config = object(&[
            ("name", Dynamic::from("Admin")),
            ("roles", Dynamic::from("not-a-list")),
            ("id", Dynamic::from("x")),
        ]);
        let diagnostics = validate_attributes(&schema(), &config);
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn validation_skips_unknown_values() {
        let config = object(&[("name", Dynamic::Unknown)]);
        assert!(validate_attributes(&schema(), &config).is_empty());
    }

    #[test]
    fn create_plan_applies_defaults_and_marks_computed_unknown() {
        let config = object(&[("name", Dynamic::from("Admin"))]);
        let proposed = object(&[
            ("name", Dynamic::from("Admin")),
            ("id", Dynamic::Null),
            ("is_admin", Dynamic::Null),
            ("roles", Dynamic::Null),
        ]);

        let (planned, replace, diagnostics) =
            plan_attributes(&schema(), &DynamicValue::null(), proposed, &config);

        assert!(diagnostics.is_empty());
        assert!(replace.is_empty());
        assert_eq!(planned.get(&AttributePath::new("id")), Dynamic::Unknown);
        assert_eq!(planned.get(&AttributePath::new("is_admin")), Dynamic::Bool(false));
    }

    #[test]
    fn update_plan_keeps_id_and_flags_replacement() {
        let prior = object(&[
            ("id", Dynamic::from("Admin")),
            ("name", Dynamic::from("Admin")),
            ("is_admin", Dynamic::Bool(false)),
            ("roles", Dynamic::Null),
        ]);
        let config = object(&[("name", Dynamic::from("Viewer"))]);
        let proposed = object(&[
            ("id", Dynamic::from("Admin")),
            ("name", Dynamic::from("Viewer")),
            ("is_admin", Dynamic::Null),
            ("roles", Dynamic::Null),
        ]);

        let (planned, replace, _) = plan_attributes(&schema(), &prior, proposed, &config);

        assert_eq!(planned.get(&AttributePath::new("id")), Dynamic::from("Admin"));
        assert_eq!(replace, vec![AttributePath::new("name")]);
    }
}
