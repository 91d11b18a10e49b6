//! Error taxonomy shared by the management API and the dispatcher.

use thiserror::Error;

/// Errors surfaced to callers of the engine.
///
/// Every variant maps to exactly one HTTP status via [`MockError::status`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MockError {
    /// Malformed create/update input. `field` names the first failing field.
    #[error("{message}")]
    Validation { field: &'static str, message: String },

    /// Unknown definition id.
    #[error("Mock definition not found: {0}")]
    NotFound(String),

    /// Owner identifier mismatch on update/delete.
    #[error("Not authorized to modify this mock definition")]
    Forbidden,

    /// Missing or wrong credential on invocation.
    #[error("{0}")]
    Unauthorized(String),

    /// The definition's expiry has elapsed.
    #[error("Mock definition has expired")]
    Expired,

    /// Inbound method differs from the configured one.
    #[error("Method not allowed. Expected {expected}")]
    MethodNotAllowed { expected: String },

    /// Both the durable and the in-process store failed.
    #[error("Storage unavailable")]
    Storage,
}

impl MockError {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        MockError::Validation {
            field,
            message: message.into(),
        }
    }

    /// HTTP status code for this error.
    pub fn status(&self) -> u16 {
        match self {
            MockError::Validation { .. } => 400,
            MockError::Unauthorized(_) => 401,
            MockError::Forbidden => 403,
            MockError::NotFound(_) => 404,
            MockError::MethodNotAllowed { .. } => 405,
            MockError::Expired => 410,
            MockError::Storage => 500,
        }
    }

    /// Field name for validation errors.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            MockError::Validation { field, .. } => Some(field),
            _ => None,
        }
    }

    /// JSON body returned to callers.
    pub fn to_json(&self) -> serde_json::Value {
        let mut body = serde_json::json!({ "error": self.to_string() });
        if let Some(field) = self.field() {
            body["field"] = serde_json::json!(field);
        }
        body
    }
}

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),
}
