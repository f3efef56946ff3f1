//! Kafka topic subscription as an [`EventSource`].

use async_trait::async_trait;
use rdkafka::ClientConfig;
use rdkafka::Message;
use rdkafka::consumer::{Consumer, StreamConsumer};
use tracing::info;

use crate::error::TransportError;
use crate::source::EventSource;

/// Subscription settings for [`KafkaSource`].
#[derive(Debug, Clone)]
pub struct KafkaSourceConfig {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
    /// Where to start when the group has no committed offset. Offsets are
    /// never committed, so this applies on every start.
    pub offset_reset: String,
}

/// Consumes one topic through a consumer group.
///
/// Relay state lives in memory only, so offsets are never committed: every
/// start reads from `offset_reset` and rebuilds consent state and buffers
/// from the topics themselves. Committing would make a restart under the
/// same group skip the grants it had already seen.
pub struct KafkaSource {
    name: String,
    config: KafkaSourceConfig,
    consumer: Option<StreamConsumer>,
}

impl KafkaSource {
    pub fn new(name: impl Into<String>, config: KafkaSourceConfig) -> Self {
        Self {
            name: name.into(),
            config,
            consumer: None,
        }
    }

    fn client_config(&self) -> ClientConfig {
        let mut client = ClientConfig::new();
        client
            .set("bootstrap.servers", &self.config.brokers)
            .set("group.id", &self.config.group_id)
            .set("auto.offset.reset", &self.config.offset_reset)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false");
        client
    }
}

#[async_trait]
impl EventSource for KafkaSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        self.consumer = None;
        let consumer: StreamConsumer = self
            .client_config()
            .create()
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        consumer
            .subscribe(&[self.config.topic.as_str()])
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        info!(
            source = %self.name,
            topic = %self.config.topic,
            group_id = %self.config.group_id,
            "subscribed"
        );
        self.consumer = Some(consumer);
        Ok(())
    }

    async fn next(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let consumer = self.consumer.as_ref().ok_or(TransportError::NotConnected)?;
        loop {
            let message = consumer
                .recv()
                .await
                .map_err(|e| TransportError::Receive(e.to_string()))?;
            // Tombstones carry no payload and are not messages for the relay.
            if let Some(payload) = message.payload() {
                return Ok(Some(payload.to_vec()));
            }
        }
    }
}
