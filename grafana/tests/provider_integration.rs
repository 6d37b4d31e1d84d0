//! End-to-end protocol calls against a mocked Grafana API

#![allow(clippy::disallowed_methods)] // Allow unwrap() in tests for clarity

use grafana::GrafanaProvider;
use mockito::{Matcher, Server};
use serde_json::json;
use std::collections::HashMap;
use tfplug::protocol::{
    apply_resource_change, configure_provider, import_resource_state, plan_resource_change,
    read_resource, validate_resource_config, EncodedValue,
};
use tfplug::types::{has_errors, AttributePath, Dynamic, DynamicValue};
use tfplug::{ProviderServer, ServerConfig};

fn value(pairs: &[(&str, Dynamic)]) -> DynamicValue {
    DynamicValue::new(Dynamic::Map(
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
    ))
}

fn encoded(pairs: &[(&str, Dynamic)]) -> EncodedValue {
    EncodedValue::from_value(&value(pairs)).unwrap()
}

fn permission(action: &str, scope: &str) -> Dynamic {
    let mut entry = HashMap::new();
    entry.insert("action".to_string(), Dynamic::from(action));
    entry.insert("scope".to_string(), Dynamic::from(scope));
    Dynamic::Map(entry)
}

fn server() -> ProviderServer<GrafanaProvider> {
    ProviderServer::with_config(GrafanaProvider::new(), ServerConfig::new().without_logging())
}

async fn configured(url: &str) -> ProviderServer<GrafanaProvider> {
    let server = server();
    let response = server
        .configure_provider(configure_provider::Request {
            terraform_version: "1.9.0".to_string(),
            config: encoded(&[
                ("url", Dynamic::from(url)),
                ("auth", Dynamic::from("admin:admin")),
                ("org_id", Dynamic::Number(1.0)),
                ("retries", Dynamic::Number(0.0)),
            ]),
        })
        .await;
    assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
    server
}

fn role_config(version: f64) -> Vec<(&'static str, Dynamic)> {
    vec![
        ("org_id", Dynamic::Number(1.0)),
        ("uid", Dynamic::Null),
        ("version", Dynamic::Number(version)),
        ("name", Dynamic::from("custom:folders:reader")),
        ("description", Dynamic::Null),
        (
            "permissions",
            Dynamic::List(vec![permission("folders:read", "folders:*")]),
        ),
    ]
}

#[tokio::test]
async fn schema_exposes_provider_block_and_resources() {
    let response = server().get_provider_schema().await;

    let provider = response.provider.unwrap();
    for name in ["url", "auth", "org_id", "retries"] {
        assert!(provider.attribute(name).is_some(), "missing {}", name);
    }
    assert!(provider.attribute("auth").unwrap().sensitive);

    let mut resources: Vec<_> = response.resource_schemas.keys().cloned().collect();
    resources.sort();
    assert_eq!(
        resources,
        vec![
            "grafana_builtin_role",
            "grafana_policy",
            "grafana_role",
            "grafana_user"
        ]
    );
}

#[tokio::test]
async fn unknown_builtin_role_name_fails_validation() {
    let response = server()
        .validate_resource_config(validate_resource_config::Request {
            type_name: "grafana_builtin_role".to_string(),
            config: encoded(&[
                ("name", Dynamic::from("Owner")),
                ("roles", Dynamic::List(vec![Dynamic::from("a")])),
            ]),
        })
        .await;

    assert!(has_errors(&response.diagnostics));
    assert_eq!(
        response.diagnostics[0].attribute.as_ref().unwrap().to_string(),
        "name"
    );
}

#[tokio::test]
async fn negative_or_fractional_numbers_fail_validation() {
    let server = server();

    let mut role = role_config(-1.0);
    role.retain(|(name, _)| *name != "uid");
    let response = server
        .validate_resource_config(validate_resource_config::Request {
            type_name: "grafana_role".to_string(),
            config: encoded(&role),
        })
        .await;
    assert!(has_errors(&response.diagnostics));
    assert_eq!(
        response.diagnostics[0].attribute.as_ref().unwrap().to_string(),
        "version"
    );

    let response = server
        .validate_resource_config(validate_resource_config::Request {
            type_name: "grafana_policy".to_string(),
            config: encoded(&[
                ("org_id", Dynamic::Number(1.5)),
                ("name", Dynamic::from("readers")),
            ]),
        })
        .await;
    assert!(has_errors(&response.diagnostics));
    assert_eq!(
        response.diagnostics[0].attribute.as_ref().unwrap().to_string(),
        "org_id"
    );

    let response = server
        .validate_resource_config(validate_resource_config::Request {
            type_name: "grafana_role".to_string(),
            config: encoded(&role_config(3.0)),
        })
        .await;
    assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
}

#[tokio::test]
async fn role_lifecycle() {
    let mut grafana = Server::new_async().await;
    let create = grafana
        .mock("POST", "/api/access-control/roles")
        .match_body(Matcher::PartialJson(json!({
            "orgId": 1,
            "version": 1,
            "name": "custom:folders:reader"
        })))
        .with_body(
            r#"{"orgId":1,"uid":"r-1","version":1,"name":"custom:folders:reader",
                "permissions":[{"action":"folders:read","scope":"folders:*"}]}"#,
        )
        .create_async()
        .await;
    let get = grafana
        .mock("GET", "/api/access-control/roles/r-1")
        .with_body(
            r#"{"orgId":1,"uid":"r-1","version":1,"name":"custom:folders:reader","description":"",
                "permissions":[{"action":"folders:read","scope":"folders:*"}]}"#,
        )
        .create_async()
        .await;
    let update = grafana
        .mock("PUT", "/api/access-control/roles/r-1")
        .match_body(Matcher::PartialJson(json!({"uid": "r-1", "version": 2})))
        .with_body("{}")
        .create_async()
        .await;
    let delete = grafana
        .mock("DELETE", "/api/access-control/roles/r-1")
        .with_body(r#"{"message":"Role deleted"}"#)
        .create_async()
        .await;

    let server = configured(&grafana.url()).await;

    // create
    let config = encoded(&role_config(1.0));
    let mut proposed = role_config(1.0);
    proposed.push(("id", Dynamic::Null));
    let plan = server
        .plan_resource_change(plan_resource_change::Request {
            type_name: "grafana_role".to_string(),
            prior_state: EncodedValue::null(),
            proposed_new_state: encoded(&proposed),
            config: config.clone(),
        })
        .await;
    assert!(plan.diagnostics.is_empty(), "{:?}", plan.diagnostics);
    let planned = plan.planned_state.decode().unwrap();
    assert_eq!(planned.get(&AttributePath::new("uid")), Dynamic::Unknown);

    let created = server
        .apply_resource_change(apply_resource_change::Request {
            type_name: "grafana_role".to_string(),
            prior_state: EncodedValue::null(),
            planned_state: plan.planned_state,
            config,
        })
        .await;
    assert!(created.diagnostics.is_empty(), "{:?}", created.diagnostics);
    let state = created.new_state.decode().unwrap();
    assert_eq!(state.get_string(&AttributePath::new("id")).unwrap(), "r-1");
    assert_eq!(state.get_string(&AttributePath::new("uid")).unwrap(), "r-1");

    // refresh
    let read = server
        .read_resource(read_resource::Request {
            type_name: "grafana_role".to_string(),
            current_state: created.new_state.clone(),
        })
        .await;
    assert!(read.diagnostics.is_empty());
    assert_eq!(read.new_state.decode().unwrap(), state);

    // bump version
    let config = encoded(&role_config(2.0));
    let mut proposed = state.clone();
    proposed.set_number(&AttributePath::new("version"), 2.0).unwrap();
    let plan = server
        .plan_resource_change(plan_resource_change::Request {
            type_name: "grafana_role".to_string(),
            prior_state: read.new_state.clone(),
            proposed_new_state: EncodedValue::from_value(&proposed).unwrap(),
            config: config.clone(),
        })
        .await;
    assert!(plan.requires_replace.is_empty());
    assert_eq!(
        plan.planned_state.decode().unwrap().get(&AttributePath::new("uid")),
        Dynamic::from("r-1")
    );

    let updated = server
        .apply_resource_change(apply_resource_change::Request {
            type_name: "grafana_role".to_string(),
            prior_state: read.new_state,
            planned_state: plan.planned_state,
            config,
        })
        .await;
    assert!(updated.diagnostics.is_empty(), "{:?}", updated.diagnostics);

    // destroy
    let destroyed = server
        .apply_resource_change(apply_resource_change::Request {
            type_name: "grafana_role".to_string(),
            prior_state: updated.new_state,
            planned_state: EncodedValue::null(),
            config: EncodedValue::null(),
        })
        .await;
    assert!(destroyed.diagnostics.is_empty());
    assert!(destroyed.new_state.decode().unwrap().is_null());

    create.assert_async().await;
    get.assert_async().await;
    update.assert_async().await;
    delete.assert_async().await;
}

#[tokio::test]
async fn changing_builtin_role_name_requires_replacement() {
    let grafana = Server::new_async().await;
    let server = configured(&grafana.url()).await;

    let roles = Dynamic::List(vec![Dynamic::from("a")]);
    let prior = encoded(&[
        ("id", Dynamic::from("Viewer")),
        ("name", Dynamic::from("Viewer")),
        ("roles", roles.clone()),
    ]);
    let plan = server
        .plan_resource_change(plan_resource_change::Request {
            type_name: "grafana_builtin_role".to_string(),
            prior_state: prior,
            proposed_new_state: encoded(&[
                ("id", Dynamic::from("Viewer")),
                ("name", Dynamic::from("Editor")),
                ("roles", roles.clone()),
            ]),
            config: encoded(&[("name", Dynamic::from("Editor")), ("roles", roles)]),
        })
        .await;

    assert!(plan.diagnostics.is_empty());
    assert_eq!(plan.requires_replace, vec![AttributePath::new("name")]);
}

#[tokio::test]
async fn user_import_fills_state_from_grafana() {
    let mut grafana = Server::new_async().await;
    grafana
        .mock("GET", "/api/users/7")
        .with_body(
            r#"{"id":7,"email":"jane@example.com","name":"Jane","login":"jane",
                "isGrafanaAdmin":false}"#,
        )
        .create_async()
        .await;
    grafana
        .mock("GET", "/api/access-control/users/7/roles")
        .with_body(r#"[{"uid":"reports_reader","name":"custom:reports:reader","version":1}]"#)
        .create_async()
        .await;

    let server = configured(&grafana.url()).await;
    let response = server
        .import_resource_state(import_resource_state::Request {
            type_name: "grafana_user".to_string(),
            id: "7".to_string(),
        })
        .await;

    assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
    let state = response.imported_resources[0].state.decode().unwrap();
    assert_eq!(
        state.get_string(&AttributePath::new("email")).unwrap(),
        "jane@example.com"
    );
    assert_eq!(
        state.get_string_list(&AttributePath::new("roles")).unwrap(),
        vec!["reports_reader".to_string()]
    );
    assert!(!state.get_bool(&AttributePath::new("is_admin")).unwrap());
}

#[tokio::test]
async fn policy_apply_needs_configured_provider() {
    let response = server()
        .apply_resource_change(apply_resource_change::Request {
            type_name: "grafana_policy".to_string(),
            prior_state: EncodedValue::null(),
            planned_state: encoded(&[
                ("id", Dynamic::Unknown),
                ("org_id", Dynamic::Number(1.0)),
                ("name", Dynamic::from("readers")),
            ]),
            config: encoded(&[
                ("org_id", Dynamic::Number(1.0)),
                ("name", Dynamic::from("readers")),
            ]),
        })
        .await;

    assert!(has_errors(&response.diagnostics));
    assert_eq!(response.diagnostics[0].summary, "Provider not configured");
}
