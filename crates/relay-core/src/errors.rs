//! Protocol error types.

use thiserror::Error;

/// Reasons an inbound payload cannot be dispatched.
///
/// None of these are ever reported back to the sender; the router logs them
/// and drops the single offending message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The payload is valid JSON but not an object.
    #[error("message is not a JSON object")]
    NotAnObject,

    /// The object has no string `type` field.
    #[error("message has no string `type` field")]
    MissingType,

    /// A field required by the message type is absent or not a string.
    #[error("`{kind}` message is missing string field `{field}`")]
    MissingField {
        /// The message `type`.
        kind: String,
        /// The required field name.
        field: &'static str,
    },
}

impl ProtocolError {
    /// Short, stable label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "invalid_json",
            Self::NotAnObject => "not_an_object",
            Self::MissingType => "missing_type",
            Self::MissingField { .. } => "missing_field",
        }
    }
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
