use std::time::Duration;

use thiserror::Error;

/// Errors raised while provisioning or publishing to an output channel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    /// The channel is already provisioned. Callers treat this as success.
    #[error("channel already exists: {0}")]
    ChannelExists(String),

    /// The sink did not respond within the allowed duration.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// A network or transport-level error occurred.
    #[error("connection error: {0}")]
    Connection(String),

    /// The destination is temporarily unable to accept messages.
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    /// The destination refused the message permanently.
    #[error("publish rejected: {0}")]
    Rejected(String),

    /// The sink was given invalid configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The record could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl SinkError {
    /// Returns `true` if the error is transient and the publish may succeed
    /// on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Connection(_) | Self::Unavailable(_)
        )
    }

    /// Short machine-readable code for logs and activity entries.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ChannelExists(_) => "CHANNEL_EXISTS",
            Self::Timeout(_) => "TIMEOUT",
            Self::Connection(_) => "CONNECTION",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::Rejected(_) => "REJECTED",
            Self::Configuration(_) => "CONFIGURATION",
            Self::Serialization(_) => "SERIALIZATION",
        }
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
