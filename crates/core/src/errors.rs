use thiserror::Error;

/// Failure reported by the host platform or the key-value store behind it.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("host rejected the request: {0}")]
    Forbidden(String),
    #[error("host request failed: {0}")]
    Transport(String),
    #[error("host response could not be decoded: {0}")]
    Decode(String),
    #[error("key-value store failure: {0}")]
    Kv(String),
}

impl HostError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Plugin configuration that could not be turned into welcome messages.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("plugin configuration must be a JSON object")]
    NotAnObject,
    #[error("WelcomeMessages is not valid JSON: {0}")]
    EmbeddedJson(String),
    #[error("WelcomeMessages must be a list of messages")]
    NotAList,
    #[error("welcome message #{index}: {reason}")]
    InvalidMessage { index: usize, reason: String },
}

impl SettingsError {
    pub fn invalid(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidMessage { index, reason: reason.into() }
    }
}
