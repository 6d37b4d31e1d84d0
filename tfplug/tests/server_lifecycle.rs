//! Drives a small in-memory provider through ProviderServer

#![allow(clippy::disallowed_methods)] // Allow unwrap() in tests for clarity

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tfplug::context::Context;
use tfplug::defaults::StaticDefault;
use tfplug::plan_modifier::{RequiresReplaceIfChanged, UseStateForUnknown};
use tfplug::protocol::{
    apply_resource_change, configure_provider, import_resource_state, plan_resource_change,
    read_resource, upgrade_resource_state, validate_resource_config, EncodedValue,
};
use tfplug::provider::{
    ConfigureProviderRequest, ConfigureProviderResponse, Provider, ProviderSchemaRequest,
    ProviderSchemaResponse, ResourceFactory,
};
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceSchemaRequest, ResourceSchemaResponse,
    ResourceWithConfigure, ResourceWithImportState, UpdateResourceRequest,
    UpdateResourceResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::{has_errors, AttributePath, Diagnostic, Dynamic, DynamicValue, RawState};
use tfplug::validator::StringOneOf;
use tfplug::{import_state_passthrough_id, ProviderServer, ServerConfig};

type Store = Arc<Mutex<HashMap<String, String>>>;

struct TeamProvider {
    store: Store,
}

#[async_trait]
impl Provider for TeamProvider {
    fn type_name(&self) -> &str {
        "test"
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: ProviderSchemaRequest,
    ) -> ProviderSchemaResponse {
        ProviderSchemaResponse {
            schema: SchemaBuilder::new()
                .attribute(
                    AttributeBuilder::new("prefix", AttributeType::String)
                        .optional()
                        .build(),
                )
                .build(),
            diagnostics: vec![],
        }
    }

    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureProviderRequest,
    ) -> ConfigureProviderResponse {
        if request.config.get(&AttributePath::new("prefix")) == Dynamic::from("bad") {
            return ConfigureProviderResponse {
                diagnostics: vec![Diagnostic::error("bad prefix", "")],
                provider_data: None,
            };
        }
        ConfigureProviderResponse {
            diagnostics: vec![],
            provider_data: Some(
                Arc::new(self.store.clone()) as Arc<dyn std::any::Any + Send + Sync>
            ),
        }
    }

    fn resources(&self) -> HashMap<String, ResourceFactory> {
        let mut factories: HashMap<String, ResourceFactory> = HashMap::new();
        factories.insert(
            "test_team".to_string(),
            Box::new(|| Box::new(TeamResource::default()) as Box<dyn ResourceWithConfigure>),
        );
        factories
    }
}

#[derive(Default)]
struct TeamResource {
    store: Option<Store>,
}

impl TeamResource {
    fn state(name: &str, tier: &str) -> DynamicValue {
        let mut state = DynamicValue::object();
        state.set_string(&AttributePath::new("id"), name.to_string()).unwrap();
        state.set_string(&AttributePath::new("name"), name.to_string()).unwrap();
        state.set_string(&AttributePath::new("tier"), tier.to_string()).unwrap();
        state
    }
}

#[async_trait]
impl Resource for TeamResource {
    fn type_name(&self) -> &str {
        "test_team"
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: ResourceSchemaRequest,
    ) -> ResourceSchemaResponse {
        ResourceSchemaResponse {
            schema: SchemaBuilder::new()
                .attribute(
                    AttributeBuilder::new("id", AttributeType::String)
                        .computed()
                        .plan_modifier(UseStateForUnknown)
                        .build(),
                )
                .attribute(
                    AttributeBuilder::new("name", AttributeType::String)
                        .required()
                        .plan_modifier(RequiresReplaceIfChanged)
                        .build(),
                )
                .attribute(
                    AttributeBuilder::new("tier", AttributeType::String)
                        .optional()
                        .validator(StringOneOf::new(["free", "paid"]))
                        .default(StaticDefault::string("free"))
                        .build(),
                )
                .build(),
            diagnostics: vec![],
        }
    }

    async fn create(
        &self,
        _ctx: Context,
        request: CreateResourceRequest,
    ) -> CreateResourceResponse {
        let name = request.planned_state.get_string(&AttributePath::new("name")).unwrap();
        let tier = request.planned_state.get_string(&AttributePath::new("tier")).unwrap();
        if name == "broken" {
            return CreateResourceResponse {
                new_state: DynamicValue::null(),
                diagnostics: vec![Diagnostic::error("create failed", "")],
            };
        }
        self.store.as_ref().unwrap().lock().unwrap().insert(name.clone(), tier.clone());
        CreateResourceResponse {
            new_state: Self::state(&name, &tier),
            diagnostics: vec![],
        }
    }

    async fn read(&self, _ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let id = request.current_state.get_string(&AttributePath::new("id")).unwrap();
        let tier = self.store.as_ref().unwrap().lock().unwrap().get(&id).cloned();
        ReadResourceResponse {
            new_state: tier.map(|tier| Self::state(&id, &tier)),
            diagnostics: vec![],
        }
    }

    async fn update(
        &self,
        _ctx: Context,
        request: UpdateResourceRequest,
    ) -> UpdateResourceResponse {
        let name = request.planned_state.get_string(&AttributePath::new("name")).unwrap();
        let tier = request.planned_state.get_string(&AttributePath::new("tier")).unwrap();
        if tier == "paid" && name == "frozen" {
            return UpdateResourceResponse {
                new_state: request.planned_state,
                diagnostics: vec![Diagnostic::error("update failed", "")],
            };
        }
        self.store.as_ref().unwrap().lock().unwrap().insert(name.clone(), tier.clone());
        UpdateResourceResponse {
            new_state: Self::state(&name, &tier),
            diagnostics: vec![],
        }
    }

    async fn delete(
        &self,
        _ctx: Context,
        request: DeleteResourceRequest,
    ) -> DeleteResourceResponse {
        let id = request.prior_state.get_string(&AttributePath::new("id")).unwrap();
        self.store.as_ref().unwrap().lock().unwrap().remove(&id);
        DeleteResourceResponse { diagnostics: vec![] }
    }

    fn import_handler(&self) -> Option<&dyn ResourceWithImportState> {
        Some(self)
    }
}

#[async_trait]
impl ResourceWithConfigure for TeamResource {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureResourceRequest,
    ) -> ConfigureResourceResponse {
        let mut diagnostics = vec![];
        match request.provider_data.as_ref().and_then(|d| d.downcast_ref::<Store>()) {
            Some(store) => self.store = Some(store.clone()),
            None => diagnostics.push(Diagnostic::error("Invalid provider data", "")),
        }
        ConfigureResourceResponse { diagnostics }
    }
}

#[async_trait]
impl ResourceWithImportState for TeamResource {
    async fn import_state(
        &self,
        _ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
        };
        import_state_passthrough_id(AttributePath::new("id"), &request, &mut response);
        response
    }
}

fn object(pairs: &[(&str, Dynamic)]) -> EncodedValue {
    let value = DynamicValue::new(Dynamic::Map(
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
    ));
    EncodedValue::from_value(&value).unwrap()
}

fn server(store: &Store) -> ProviderServer<TeamProvider> {
    ProviderServer::with_config(
        TeamProvider {
            store: store.clone(),
        },
        ServerConfig::new().without_logging(),
    )
}

async fn configured(store: &Store) -> ProviderServer<TeamProvider> {
    let server = server(store);
    let response = server
        .configure_provider(configure_provider::Request {
            terraform_version: "1.9.0".to_string(),
            config: object(&[("prefix", Dynamic::Null)]),
        })
        .await;
    assert!(response.diagnostics.is_empty());
    server
}

async fn create(server: &ProviderServer<TeamProvider>, name: &str) -> EncodedValue {
    let config = object(&[("name", Dynamic::from(name))]);
    let proposed = object(&[
        ("id", Dynamic::Null),
        ("name", Dynamic::from(name)),
        ("tier", Dynamic::Null),
    ]);

    let plan = server
        .plan_resource_change(plan_resource_change::Request {
            type_name: "test_team".to_string(),
            prior_state: EncodedValue::null(),
            proposed_new_state: proposed,
            config: config.clone(),
        })
        .await;
    assert!(plan.diagnostics.is_empty());
    assert!(plan.requires_replace.is_empty());

    let planned = plan.planned_state.decode().unwrap();
    assert_eq!(planned.get(&AttributePath::new("id")), Dynamic::Unknown);
    assert_eq!(planned.get(&AttributePath::new("tier")), Dynamic::from("free"));

    let apply = server
        .apply_resource_change(apply_resource_change::Request {
            type_name: "test_team".to_string(),
            prior_state: EncodedValue::null(),
            planned_state: plan.planned_state,
            config,
        })
        .await;
    assert!(!has_errors(&apply.diagnostics));
    apply.new_state
}

#[tokio::test]
async fn schema_lists_resources() {
    let store = Store::default();
    let response = server(&store).get_provider_schema().await;

    assert!(response.diagnostics.is_empty());
    assert!(response.provider.unwrap().attribute("prefix").is_some());
    assert!(response.resource_schemas.contains_key("test_team"));
}

#[tokio::test]
async fn full_lifecycle() {
    let store = Store::default();
    let server = configured(&store).await;

    let state = create(&server, "platform").await;
    assert_eq!(store.lock().unwrap().get("platform").unwrap(), "free");

    let read = server
        .read_resource(read_resource::Request {
            type_name: "test_team".to_string(),
            current_state: state.clone(),
        })
        .await;
    assert_eq!(read.new_state.decode().unwrap(), state.decode().unwrap());

    let config = object(&[("name", Dynamic::from("platform")), ("tier", Dynamic::from("paid"))]);
    let proposed = object(&[
        ("id", Dynamic::from("platform")),
        ("name", Dynamic::from("platform")),
        ("tier", Dynamic::from("paid")),
    ]);
    let plan = server
        .plan_resource_change(plan_resource_change::Request {
            type_name: "test_team".to_string(),
            prior_state: state.clone(),
            proposed_new_state: proposed,
            config: config.clone(),
        })
        .await;
    assert!(plan.requires_replace.is_empty());
    let planned = plan.planned_state.decode().unwrap();
    assert_eq!(planned.get(&AttributePath::new("id")), Dynamic::from("platform"));

    let apply = server
        .apply_resource_change(apply_resource_change::Request {
            type_name: "test_team".to_string(),
            prior_state: state,
            planned_state: plan.planned_state,
            config,
        })
        .await;
    assert!(apply.diagnostics.is_empty());
    assert_eq!(store.lock().unwrap().get("platform").unwrap(), "paid");

    let destroy = server
        .apply_resource_change(apply_resource_change::Request {
            type_name: "test_team".to_string(),
            prior_state: apply.new_state,
            planned_state: EncodedValue::null(),
            config: EncodedValue::null(),
        })
        .await;
    assert!(destroy.diagnostics.is_empty());
    assert!(destroy.new_state.decode().unwrap().is_null());
    assert!(store.lock().unwrap().is_empty());
}

#[tokio::test]
async fn renaming_requires_replacement() {
    let store = Store::default();
    let server = configured(&store).await;
    let state = create(&server, "platform").await;

    let plan = server
        .plan_resource_change(plan_resource_change::Request {
            type_name: "test_team".to_string(),
            prior_state: state,
            proposed_new_state: object(&[
                ("id", Dynamic::from("platform")),
                ("name", Dynamic::from("infra")),
                ("tier", Dynamic::Null),
            ]),
            config: object(&[("name", Dynamic::from("infra"))]),
        })
        .await;

    assert_eq!(plan.requires_replace, vec![AttributePath::new("name")]);
}

#[tokio::test]
async fn read_of_missing_object_removes_it() {
    let store = Store::default();
    let server = configured(&store).await;
    let state = create(&server, "platform").await;
    store.lock().unwrap().clear();

    let read = server
        .read_resource(read_resource::Request {
            type_name: "test_team".to_string(),
            current_state: state,
        })
        .await;
    assert!(read.diagnostics.is_empty());
    assert!(read.new_state.decode().unwrap().is_null());
}

#[tokio::test]
async fn failed_create_keeps_null_state() {
    let store = Store::default();
    let server = configured(&store).await;

    let apply = server
        .apply_resource_change(apply_resource_change::Request {
            type_name: "test_team".to_string(),
            prior_state: EncodedValue::null(),
            planned_state: object(&[
                ("id", Dynamic::Unknown),
                ("name", Dynamic::from("broken")),
                ("tier", Dynamic::from("free")),
            ]),
            config: object(&[("name", Dynamic::from("broken"))]),
        })
        .await;

    assert!(has_errors(&apply.diagnostics));
    assert!(apply.new_state.decode().unwrap().is_null());
}

#[tokio::test]
async fn failed_update_keeps_prior_state() {
    let store = Store::default();
    let server = configured(&store).await;
    let state = create(&server, "frozen").await;

    let apply = server
        .apply_resource_change(apply_resource_change::Request {
            type_name: "test_team".to_string(),
            prior_state: state.clone(),
            planned_state: object(&[
                ("id", Dynamic::from("frozen")),
                ("name", Dynamic::from("frozen")),
                ("tier", Dynamic::from("paid")),
            ]),
            config: object(&[("name", Dynamic::from("frozen")), ("tier", Dynamic::from("paid"))]),
        })
        .await;

    assert!(has_errors(&apply.diagnostics));
    assert_eq!(apply.new_state.decode().unwrap(), state.decode().unwrap());
}

#[tokio::test]
async fn import_then_read() {
    let store = Store::default();
    let server = configured(&store).await;
    store.lock().unwrap().insert("platform".to_string(), "paid".to_string());

    let imported = server
        .import_resource_state(import_resource_state::Request {
            type_name: "test_team".to_string(),
            id: "platform".to_string(),
        })
        .await;
    assert!(imported.diagnostics.is_empty());
    assert_eq!(imported.imported_resources.len(), 1);

    let read = server
        .read_resource(read_resource::Request {
            type_name: "test_team".to_string(),
            current_state: imported.imported_resources[0].state.clone(),
        })
        .await;
    let state = read.new_state.decode().unwrap();
    assert_eq!(state.get_string(&AttributePath::new("tier")).unwrap(), "paid");
}

#[tokio::test]
async fn validate_reports_schema_errors() {
    let store = Store::default();
    let server = server(&store);

    let response = server
        .validate_resource_config(validate_resource_config::Request {
            type_name: "test_team".to_string(),
            config: object(&[("tier", Dynamic::from("gold"))]),
        })
        .await;
    assert_eq!(response.diagnostics.len(), 2);

    let unknown = server
        .validate_resource_config(validate_resource_config::Request {
            type_name: "test_nothing".to_string(),
            config: object(&[]),
        })
        .await;
    assert!(has_errors(&unknown.diagnostics));
}

#[tokio::test]
async fn operations_require_configuration() {
    let store = Store::default();
    let server = server(&store);

    let rejected = server
        .configure_provider(configure_provider::Request {
            terraform_version: "1.9.0".to_string(),
            config: object(&[("prefix", Dynamic::from("bad"))]),
        })
        .await;
    assert!(has_errors(&rejected.diagnostics));

    let read = server
        .read_resource(read_resource::Request {
            type_name: "test_team".to_string(),
            current_state: object(&[("id", Dynamic::from("x"))]),
        })
        .await;
    assert_eq!(read.diagnostics[0].summary, "Provider not configured");
}

#[tokio::test]
async fn stopped_provider_refuses_changes() {
    let store = Store::default();
    let server = configured(&store).await;

    let stop = server.stop_provider().await;
    assert!(stop.error.is_empty());

    let apply = server
        .apply_resource_change(apply_resource_change::Request {
            type_name: "test_team".to_string(),
            prior_state: EncodedValue::null(),
            planned_state: object(&[
                ("id", Dynamic::Unknown),
                ("name", Dynamic::from("late")),
                ("tier", Dynamic::from("free")),
            ]),
            config: object(&[("name", Dynamic::from("late"))]),
        })
        .await;
    assert_eq!(apply.diagnostics[0].summary, "Provider is stopping");
    assert!(store.lock().unwrap().is_empty());
}

#[test]
fn upgrade_passes_current_state_through() {
    let store = Store::default();

    tokio_test::block_on(async {
        let server = server(&store);
        let response = server
            .upgrade_resource_state(upgrade_resource_state::Request {
                type_name: "test_team".to_string(),
                version: 0,
                raw_state: RawState {
                    json: br#"{"id":"a","name":"a","tier":"free","legacy":true}"#.to_vec(),
                },
            })
            .await;
        assert!(response.diagnostics.is_empty());

        let state = response.upgraded_state.decode().unwrap();
        assert_eq!(state.get(&AttributePath::new("legacy")), Dynamic::Null);
        assert_eq!(state.get_string(&AttributePath::new("name")).unwrap(), "a");

        let newer = server
            .upgrade_resource_state(upgrade_resource_state::Request {
                type_name: "test_team".to_string(),
                version: 3,
                raw_state: RawState::default(),
            })
            .await;
        assert!(has_errors(&newer.diagnostics));
    });
}
