use thiserror::Error;

/// Errors surfaced by the relay outside of per-record publishing.
///
/// Publish failures are reported per record through
/// [`PublishOutcome`](gatekeeper_executor::PublishOutcome) and never appear
/// here.
#[derive(Debug, Error)]
pub enum RelayError {
    /// An inbound message could not be decoded.
    #[error("malformed message: {0}")]
    Record(#[from] gatekeeper_core::RecordError),

    /// A sink operation failed outside the retry loop.
    #[error("sink error: {0}")]
    Sink(#[from] gatekeeper_router::SinkError),

    /// An inbound stream failed.
    #[error("transport error: {0}")]
    Transport(#[from] gatekeeper_transport::TransportError),

    /// The relay was misconfigured.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The relay worker has stopped and no longer accepts messages.
    #[error("relay worker stopped")]
    Closed,
}
