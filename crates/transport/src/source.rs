use async_trait::async_trait;

use crate::error::TransportError;

/// An ordered, at-least-once stream of message payloads.
///
/// Messages are yielded strictly in arrival order, one at a time.
#[async_trait]
pub trait EventSource: Send {
    /// Name used in logs and health output.
    fn name(&self) -> &str;

    /// Connect or subscribe. Safe to call again after a failure.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Wait for the next payload. `Ok(None)` means the stream has ended and
    /// will never yield again.
    async fn next(&mut self) -> Result<Option<Vec<u8>>, TransportError>;
}

/// Consumer group name for `stream`, optionally suffixed with a run id so
/// concurrent relays do not split the stream's partitions between them.
pub fn consumer_group(base: &str, stream: &str, run_id: Option<&str>) -> String {
    match run_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(run_id) => format!("{base}-{stream}-{run_id}"),
        None => format!("{base}-{stream}"),
    }
}
