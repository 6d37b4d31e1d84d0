//! Terraform provider for Grafana access control: built-in role
//! assignments, policies, custom roles and users.

pub mod api;
pub mod config;
pub mod provider_data;
pub mod resources;

pub use provider_data::GrafanaProviderData;

use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tfplug::context::Context;
use tfplug::provider::{
    ConfigureProviderRequest, ConfigureProviderResponse, Provider, ProviderSchemaRequest,
    ProviderSchemaResponse, ResourceFactory,
};
use tfplug::resource::ResourceWithConfigure;
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::Diagnostic;
use tfplug::validator::NumberAtLeast;

#[derive(Default)]
pub struct GrafanaProvider;

impl GrafanaProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Provider for GrafanaProvider {
    fn type_name(&self) -> &str {
        "grafana"
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: ProviderSchemaRequest,
    ) -> ProviderSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Grafana access control provider")
            .attribute(
                AttributeBuilder::new("url", AttributeType::String)
                    .description("Root URL of the Grafana server; falls back to GRAFANA_URL")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("auth", AttributeType::String)
                    .description("API key or `username:password`; falls back to GRAFANA_AUTH")
                    .optional()
                    .sensitive()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("org_id", AttributeType::Number)
                    .description("Organization to operate on (default 1, or GRAFANA_ORG_ID)")
                    .optional()
                    .validator(NumberAtLeast::new(0))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("retries", AttributeType::Number)
                    .description("Retries for failed requests (default 3, or GRAFANA_RETRIES)")
                    .optional()
                    .validator(NumberAtLeast::new(0))
                    .build(),
            )
            .build();

        ProviderSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureProviderRequest,
    ) -> ConfigureProviderResponse {
        let mut diagnostics = vec![];

        let client_config = match config::resolve(&request.config) {
            Ok(client_config) => client_config,
            Err(errors) => {
                diagnostics.extend(errors.into_iter().map(|e| {
                    Diagnostic::error("Invalid provider configuration", e.to_string())
                        .with_attribute(e.attribute())
                }));
                return ConfigureProviderResponse {
                    diagnostics,
                    provider_data: None,
                };
            }
        };

        tracing::debug!(
            "Configuring Grafana client for {} (org {})",
            client_config.url,
            client_config.org_id
        );

        match api::Client::new(client_config) {
            Ok(client) => {
                let provider_data: Arc<dyn Any + Send + Sync> =
                    Arc::new(GrafanaProviderData::new(client));
                ConfigureProviderResponse {
                    diagnostics,
                    provider_data: Some(provider_data),
                }
            }
            Err(e) => {
                diagnostics.push(Diagnostic::error(
                    "Failed to create API client",
                    e.to_string(),
                ));
                ConfigureProviderResponse {
                    diagnostics,
                    provider_data: None,
                }
            }
        }
    }

    fn resources(&self) -> HashMap<String, ResourceFactory> {
        let mut factories: HashMap<String, ResourceFactory> = HashMap::new();
        factories.insert(
            "grafana_builtin_role".to_string(),
            Box::new(|| {
                Box::new(resources::BuiltInRoleResource::new()) as Box<dyn ResourceWithConfigure>
            }),
        );
        factories.insert(
            "grafana_policy".to_string(),
            Box::new(|| {
                Box::new(resources::PolicyResource::new()) as Box<dyn ResourceWithConfigure>
            }),
        );
        factories.insert(
            "grafana_role".to_string(),
            Box::new(|| {
                Box::new(resources::RoleResource::new()) as Box<dyn ResourceWithConfigure>
            }),
        );
        factories.insert(
            "grafana_user".to_string(),
            Box::new(|| Box::new(resources::UserResource::new()) as Box<dyn ResourceWithConfigure>),
        );
        factories
    }
}
