//! Wire-level request and response messages handled by `ProviderServer`
//!
//! Values travel the way Terraform sends them: a `DynamicValue` encoded as
//! msgpack, or as JSON when msgpack is empty. One submodule per protocol call.

use crate::error::Result;
use crate::types::{DynamicValue, RawState};

/// An encoded Terraform value as found in protocol messages
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodedValue {
    pub msgpack: Vec<u8>,
    pub json: Vec<u8>,
}

impl EncodedValue {
    pub fn from_value(value: &DynamicValue) -> Result<Self> {
        Ok(Self {
            msgpack: value.encode_msgpack()?,
            json: Vec::new(),
        })
    }

    pub fn null() -> Self {
        Self::from_value(&DynamicValue::null()).unwrap_or_default()
    }

    /// Decode, preferring msgpack; an empty message is a null value
    pub fn decode(&self) -> Result<DynamicValue> {
        if !self.msgpack.is_empty() {
            DynamicValue::decode_msgpack(&self.msgpack)
        } else {
            DynamicValue::decode_json(&self.json)
        }
    }
}

pub mod get_provider_schema {
    use crate::schema::Schema;
    use crate::types::Diagnostic;
    use std::collections::HashMap;

    pub struct Response {
        pub provider: Option<Schema>,
        pub resource_schemas: HashMap<String, Schema>,
        pub diagnostics: Vec<Diagnostic>,
    }
}

pub mod configure_provider {
    use super::EncodedValue;
    use crate::types::Diagnostic;

    pub struct Request {
        pub terraform_version: String,
        pub config: EncodedValue,
    }

    pub struct Response {
        pub diagnostics: Vec<Diagnostic>,
    }
}

pub mod validate_resource_config {
    use super::EncodedValue;
    use crate::types::Diagnostic;

    pub struct Request {
        pub type_name: String,
        pub config: EncodedValue,
    }

    pub struct Response {
        pub diagnostics: Vec<Diagnostic>,
    }
}

pub mod plan_resource_change {
    use super::EncodedValue;
    use crate::types::{AttributePath, Diagnostic};

    pub struct Request {
        pub type_name: String,
        pub prior_state: EncodedValue,
        pub proposed_new_state: EncodedValue,
        pub config: EncodedValue,
    }

    pub struct Response {
        pub planned_state: EncodedValue,
        pub requires_replace: Vec<AttributePath>,
        pub diagnostics: Vec<Diagnostic>,
    }
}

pub mod apply_resource_change {
    use super::EncodedValue;
    use crate::types::Diagnostic;

    pub struct Request {
        pub type_name: String,
        pub prior_state: EncodedValue,
        pub planned_state: EncodedValue,
        pub config: EncodedValue,
    }

    pub struct Response {
        pub new_state: EncodedValue,
        pub diagnostics: Vec<Diagnostic>,
    }
}

pub mod read_resource {
    use super::EncodedValue;
    use crate::types::Diagnostic;

    pub struct Request {
        pub type_name: String,
        pub current_state: EncodedValue,
    }

    pub struct Response {
        pub new_state: EncodedValue,
        pub diagnostics: Vec<Diagnostic>,
    }
}

pub mod import_resource_state {
    use super::EncodedValue;
    use crate::types::Diagnostic;

    pub struct Request {
        pub type_name: String,
        pub id: String,
    }

    pub struct ImportedResource {
        pub type_name: String,
        pub state: EncodedValue,
    }

    pub struct Response {
        pub imported_resources: Vec<ImportedResource>,
        pub diagnostics: Vec<Diagnostic>,
    }
}

pub mod upgrade_resource_state {
    use super::{EncodedValue, RawState};
    use crate::types::Diagnostic;

    pub struct Request {
        pub type_name: String,
        pub version: i64,
        pub raw_state: RawState,
    }

    pub struct Response {
        pub upgraded_state: EncodedValue,
        pub diagnostics: Vec<Diagnostic>,
    }
}

pub mod stop_provider {
    pub struct Response {
        /// Empty on success
        pub error: String,
    }
}
