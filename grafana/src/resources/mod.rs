//! Resource implementations

pub mod builtin_role;
pub mod policy;
pub mod role;
pub mod role_changes;
pub mod user;

pub use builtin_role::BuiltInRoleResource;
pub use policy::PolicyResource;
pub use role::RoleResource;
pub use user::UserResource;

use tfplug::resource::{ConfigureResourceRequest, ConfigureResourceResponse};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};

use crate::GrafanaProviderData;

/// Shared `configure` body: pull the Grafana client out of provider data
pub(crate) fn configure_provider_data(
    request: ConfigureResourceRequest,
) -> (Option<GrafanaProviderData>, ConfigureResourceResponse) {
    let mut diagnostics = vec![];
    let mut provider_data = None;

    match request.provider_data {
        Some(data) => match data.downcast_ref::<GrafanaProviderData>() {
            Some(grafana) => provider_data = Some(grafana.clone()),
            None => diagnostics.push(Diagnostic::error(
                "Invalid provider data",
                "Failed to extract GrafanaProviderData from provider data",
            )),
        },
        None => diagnostics.push(Diagnostic::error(
            "No provider data",
            "No provider data was provided to the resource",
        )),
    }

    (provider_data, ConfigureResourceResponse { diagnostics })
}

pub(crate) fn not_configured() -> Diagnostic {
    Diagnostic::error(
        "Provider not configured",
        "Provider data was not properly configured",
    )
}

/// String attribute, treating null and unknown as empty
pub(crate) fn string_attr(value: &DynamicValue, name: &str) -> String {
    match value.get(&AttributePath::new(name)) {
        Dynamic::String(s) => s,
        _ => String::new(),
    }
}

/// Empty strings coming back from Grafana are stored as null
pub(crate) fn string_or_null(value: String) -> Dynamic {
    if value.is_empty() {
        Dynamic::Null
    } else {
        Dynamic::String(value)
    }
}

/// List attribute value; an empty list stays a list only if it was one before
pub(crate) fn list_or_null(items: Vec<Dynamic>, keep_empty: bool) -> Dynamic {
    if items.is_empty() && !keep_empty {
        Dynamic::Null
    } else {
        Dynamic::List(items)
    }
}

pub(crate) fn is_list(value: &DynamicValue, name: &str) -> bool {
    matches!(value.get(&AttributePath::new(name)), Dynamic::List(_))
}

pub(crate) fn attribute_changed(prior: &DynamicValue, planned: &DynamicValue, name: &str) -> bool {
    let path = AttributePath::new(name);
    prior.get(&path) != planned.get(&path)
}

/// Object built from attribute name/value pairs
pub(crate) fn object(pairs: Vec<(&str, Dynamic)>) -> DynamicValue {
    DynamicValue::new(Dynamic::Map(
        pairs
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::sync::Arc;

    #[test]
    fn configure_rejects_foreign_provider_data() {
        let (data, response) = configure_provider_data(ConfigureResourceRequest {
            provider_data: Some(Arc::new("not grafana".to_string()) as Arc<dyn Any + Send + Sync>),
        });
        assert!(data.is_none());
        assert_eq!(response.diagnostics[0].summary, "Invalid provider data");

        let (data, response) = configure_provider_data(ConfigureResourceRequest {
            provider_data: None,
        });
        assert!(data.is_none());
        assert_eq!(response.diagnostics[0].summary, "No provider data");
    }

    #[test]
    fn empty_values_become_null() {
        assert_eq!(string_or_null(String::new()), Dynamic::Null);
        assert_eq!(string_or_null("x".to_string()), Dynamic::String("x".into()));
        assert_eq!(list_or_null(vec![], false), Dynamic::Null);
        assert_eq!(list_or_null(vec![], true), Dynamic::List(vec![]));
    }

    #[test]
    fn string_attr_reads_unknown_as_empty() {
        let value = object(vec![("uid", Dynamic::Unknown), ("name", "Viewer".into())]);
        assert_eq!(string_attr(&value, "uid"), "");
        assert_eq!(string_attr(&value, "name"), "Viewer");
        assert_eq!(string_attr(&value, "missing"), "");
    }
}
