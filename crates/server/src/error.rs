use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use gatekeeper_engine::RelayError;
use gatekeeper_router::SinkError;

/// Errors that can occur when running the gatekeeper server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error (e.g. reading the config or binding the listener).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The relay could not be assembled.
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    /// The output sink could not be created.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The relay is not ready to serve traffic.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) | Self::Io(_) | Self::Relay(_) | Self::Sink(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
