//! Provider block resolution with `GRAFANA_*` environment fallbacks

use thiserror::Error;
use tfplug::types::{AttributePath, Dynamic, DynamicValue};

use crate::api::ClientConfig;

pub const ENV_URL: &str = "GRAFANA_URL";
pub const ENV_AUTH: &str = "GRAFANA_AUTH";
pub const ENV_ORG_ID: &str = "GRAFANA_ORG_ID";
pub const ENV_RETRIES: &str = "GRAFANA_RETRIES";

const DEFAULT_ORG_ID: i64 = 1;
const DEFAULT_RETRIES: u32 = 3;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("url is required (set in provider config or GRAFANA_URL env var)")]
    MissingUrl,

    #[error("auth is required (set in provider config or GRAFANA_AUTH env var)")]
    MissingAuth,

    #[error("{name} must be a non-negative whole number, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },
}

impl ConfigError {
    /// Provider block attribute the error is about
    pub fn attribute(&self) -> AttributePath {
        match self {
            ConfigError::MissingUrl => AttributePath::new("url"),
            ConfigError::MissingAuth => AttributePath::new("auth"),
            ConfigError::InvalidNumber { name, .. } => AttributePath::new(name),
        }
    }
}

/// Resolve the client settings; every problem found is reported
pub fn resolve(config: &DynamicValue) -> Result<ClientConfig, Vec<ConfigError>> {
    let mut errors = Vec::new();

    let url = string_setting(config, "url", ENV_URL);
    if url.is_none() {
        errors.push(ConfigError::MissingUrl);
    }
    let auth = string_setting(config, "auth", ENV_AUTH);
    if auth.is_none() {
        errors.push(ConfigError::MissingAuth);
    }

    let org_id = number_setting(config, "org_id", ENV_ORG_ID)
        .unwrap_or_else(|e| {
            errors.push(e);
            None
        })
        .unwrap_or(DEFAULT_ORG_ID as u64);
    let retries = number_setting(config, "retries", ENV_RETRIES)
        .unwrap_or_else(|e| {
            errors.push(e);
            None
        })
        .unwrap_or(DEFAULT_RETRIES as u64);

    match (url, auth) {
        (Some(url), Some(auth)) if errors.is_empty() => Ok(ClientConfig {
            url,
            auth,
            org_id: org_id as i64,
            retries: retries.min(u32::MAX as u64) as u32,
            ..Default::default()
        }),
        _ => Err(errors),
    }
}

fn string_setting(config: &DynamicValue, name: &str, env: &str) -> Option<String> {
    match config.get(&AttributePath::new(name)) {
        Dynamic::String(s) if !s.is_empty() => Some(s),
        _ => std::env::var(env).ok().filter(|v| !v.is_empty()),
    }
}

fn number_setting(
    config: &DynamicValue,
    name: &'static str,
    env: &str,
) -> Result<Option<u64>, ConfigError> {
    let invalid = |value: String| ConfigError::InvalidNumber { name, value };

    match config.get(&AttributePath::new(name)) {
        Dynamic::Number(n) if n >= 0.0 && n.fract() == 0.0 => Ok(Some(n as u64)),
        Dynamic::Number(n) => Err(invalid(n.to_string())),
        _ => match std::env::var(env) {
            Ok(value) if !value.is_empty() => {
                value.trim().parse::<u64>().map(Some).map_err(|_| invalid(value))
            }
            _ => Ok(None),
        },
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in [ENV_URL, ENV_AUTH, ENV_ORG_ID, ENV_RETRIES] {
            std::env::remove_var(var);
        }
    }

    fn block(pairs: &[(&str, Dynamic)]) -> DynamicValue {
        let mut value = DynamicValue::object();
        for (name, v) in pairs {
            value.set_value(&AttributePath::new(name), v.clone()).unwrap();
        }
        value
    }

    #[test]
    #[serial]
    fn block_values_win_over_env() {
        clear_env();
        std::env::set_var(ENV_URL, "http://env:3000");
        std::env::set_var(ENV_ORG_ID, "5");

        let config = resolve(&block(&[
            ("url", "http://block:3000".into()),
            ("auth", "admin:admin".into()),
            ("org_id", Dynamic::Number(2.0)),
        ]))
        .unwrap();

        assert_eq!(config.url, "http://block:3000");
        assert_eq!(config.auth, "admin:admin");
        assert_eq!(config.org_id, 2);
        assert_eq!(config.retries, 3);

        clear_env();
    }

    #[test]
    #[serial]
    fn env_fills_missing_values() {
        clear_env();
        std::env::set_var(ENV_URL, "http://env:3000");
        std::env::set_var(ENV_AUTH, "glsa_key");
        std::env::set_var(ENV_RETRIES, "0");

        let config = resolve(&DynamicValue::null()).unwrap();
        assert_eq!(config.url, "http://env:3000");
        assert_eq!(config.auth, "glsa_key");
        assert_eq!(config.org_id, 1);
        assert_eq!(config.retries, 0);

        clear_env();
    }

    #[test]
    #[serial]
    fn missing_url_and_auth_are_both_reported() {
        clear_env();

        let errors = resolve(&DynamicValue::null()).unwrap_err();
        assert_eq!(errors, vec![ConfigError::MissingUrl, ConfigError::MissingAuth]);
        assert_eq!(
            errors[0].to_string(),
            "url is required (set in provider config or GRAFANA_URL env var)"
        );
    }

    #[test]
    #[serial]
    fn bad_numbers_are_rejected() {
        clear_env();
        std::env::set_var(ENV_RETRIES, "many");

        let errors = resolve(&block(&[
            ("url", "http://block:3000".into()),
            ("auth", "key".into()),
            ("org_id", Dynamic::Number(-1.0)),
        ]))
        .unwrap_err();

        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].attribute().to_string(), "org_id");
        assert_eq!(
            errors[1].to_string(),
            "retries must be a non-negative whole number, got 'many'"
        );

        clear_env();
    }
}
