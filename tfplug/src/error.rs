//! Error types for tfplug

/// Error type for tfplug operations
#[derive(Debug, thiserror::Error)]
pub enum TfplugError {
    #[error("Resource type not found: {0}")]
    ResourceNotFound(String),

    #[error("Provider not configured")]
    ProviderNotConfigured,

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Attribute not found: {0}")]
    AttributeNotFound(String),

    #[error("Invalid attribute path: {0}")]
    InvalidPath(String),

    #[error("Import not supported for resource type: {0}")]
    ImportNotSupported(String),

    #[error("Upgrade failed: {0}")]
    UpgradeFailed(String),

    #[error("{0}")]
    Custom(String),
}

/// Result type alias for tfplug operations
pub type Result<T> = std::result::Result<T, TfplugError>;

impl From<String> for TfplugError {
    fn from(s: String) -> Self {
        TfplugError::Custom(s)
    }
}

impl From<&str> for TfplugError {
    fn from(s: &str) -> Self {
        TfplugError::Custom(s.to_string())
    }
}

impl From<rmp_serde::decode::Error> for TfplugError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        TfplugError::DecodingError(format!("msgpack decoding failed: {}", e))
    }
}

impl From<rmp_serde::encode::Error> for TfplugError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        TfplugError::EncodingError(format!("msgpack encoding failed: {}", e))
    }
}
