use crate::schema::{Validator, ValidatorRequest, ValidatorResponse};
use crate::types::{Diagnostic, Dynamic};

/// Restricts a string attribute to a fixed set of values (case-sensitive)
pub struct StringOneOf {
    allowed: Vec<String>,
}

impl StringOneOf {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }
}

impl Validator for StringOneOf {
    fn description(&self) -> String {
        format!("value must be one of: {}", self.allowed.join(", "))
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let mut diagnostics = Vec::new();

        match &request.config_value {
            Dynamic::String(s) if self.allowed.iter().any(|a| a == s) => {}
            Dynamic::String(s) => diagnostics.push(
                Diagnostic::error(
                    format!("{} must be one of {}", request.path, self.allowed.join(", ")),
                    format!("Got \"{}\"", s),
                )
                .with_attribute(request.path.clone()),
            ),
            other => diagnostics.push(
                Diagnostic::error(
                    format!("{} must be a string", request.path),
                    format!("Got {}", other.type_name()),
                )
                .with_attribute(request.path.clone()),
            ),
        }

        ValidatorResponse { diagnostics }
    }
}

/// Requires a whole number no lower than `min`
pub struct NumberAtLeast {
    min: i64,
}

impl NumberAtLeast {
    pub fn new(min: i64) -> Self {
        Self { min }
    }
}

impl Validator for NumberAtLeast {
    fn description(&self) -> String {
        format!("value must be a whole number of at least {}", self.min)
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let mut diagnostics = Vec::new();

        if let Some(n) = request.config_value.as_number() {
            if n.fract() != 0.0 {
                diagnostics.push(
                    Diagnostic::error(
                        format!("{} must be a whole number", request.path),
                        format!("Got {}", n),
                    )
                    .with_attribute(request.path.clone()),
                );
            } else if (n as i64) < self.min {
                diagnostics.push(
                    Diagnostic::error(
                        format!("{} must be at least {}", request.path, self.min),
                        format!("Got {}", n),
                    )
                    .with_attribute(request.path.clone()),
                );
            }
        }

        ValidatorResponse { diagnostics }
    }
}
