use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use gatekeeper_core::{ChannelName, ConsentKey, MinimalRecord};
use tracing::{debug, info};

use crate::error::SinkError;
use crate::message::OutboundMessage;
use crate::sink::DynChannelSink;

/// Default retention applied to newly provisioned channels (7 days).
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Resolves consent keys to their output channel and publishes to it.
///
/// Channels are provisioned lazily on the first resolve for a key and cached
/// afterwards; the relay never deletes them.
pub struct OutputRouter {
    sink: Arc<dyn DynChannelSink>,
    prefix: String,
    retention: Duration,
    channels: DashMap<ConsentKey, ChannelName>,
}

impl OutputRouter {
    /// Create a router naming channels `<prefix>.<rp>.<case>.<subject>`.
    pub fn new(sink: Arc<dyn DynChannelSink>, prefix: impl Into<String>) -> Self {
        Self {
            sink,
            prefix: prefix.into(),
            retention: DEFAULT_RETENTION,
            channels: DashMap::new(),
        }
    }

    /// Set the retention requested when provisioning channels.
    #[must_use]
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Name of the underlying sink.
    pub fn sink_name(&self) -> &str {
        self.sink.name()
    }

    /// The channel prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Return the channel for `key`, provisioning it on first use.
    ///
    /// Idempotent. A channel that already exists at the sink is adopted.
    /// On any other provisioning failure nothing is cached, so the next call
    /// tries again.
    pub async fn resolve(&self, key: &ConsentKey) -> Result<ChannelName, SinkError> {
        if let Some(channel) = self.channels.get(key) {
            return Ok(channel.clone());
        }

        let channel = ChannelName::for_key(&self.prefix, key);
        match self.sink.ensure_channel(&channel, self.retention).await {
            Ok(()) => {
                info!(
                    channel = %channel,
                    retention_secs = self.retention.as_secs(),
                    "provisioned output channel"
                );
            }
            Err(SinkError::ChannelExists(_)) => {
                debug!(channel = %channel, "output channel already exists");
            }
            Err(err) => return Err(err),
        }

        self.channels.insert(key.clone(), channel.clone());
        Ok(channel)
    }

    /// Name the channel for `key` has or would have, without provisioning.
    pub fn channel_for(&self, key: &ConsentKey) -> ChannelName {
        ChannelName::for_key(&self.prefix, key)
    }

    /// Publish `record` on `channel`. Errors are returned to the caller,
    /// never swallowed.
    pub async fn publish(
        &self,
        channel: &ChannelName,
        key: &ConsentKey,
        record: &MinimalRecord,
    ) -> Result<(), SinkError> {
        let message = OutboundMessage::for_record(key, record)?;
        self.sink.publish(channel, &message).await
    }

    /// Every channel resolved so far, ordered by key.
    pub fn channels(&self) -> Vec<(ConsentKey, ChannelName)> {
        let mut channels: Vec<_> = self
            .channels
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        channels.sort();
        channels
    }

    /// Check the underlying sink.
    pub async fn health_check(&self) -> Result<(), SinkError> {
        self.sink.health_check().await
    }
}
