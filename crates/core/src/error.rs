use thiserror::Error;

/// Errors produced while decoding an inbound message.
///
/// Every variant describes a single malformed message. Callers log and skip
/// it; none of them are fatal to stream processing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The payload was not valid JSON, or did not match the expected shape.
    #[error("invalid json: {0}")]
    Json(String),

    /// The payload was valid JSON but not an object.
    #[error("expected a json object")]
    NotAnObject,

    /// A required field was absent.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// A field was present but could not be interpreted.
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        /// Name of the offending field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl From<serde_json::Error> for RecordError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}
