//! Kafka-backed output channels: one topic per consent key.

use std::time::Duration;

use gatekeeper_core::ChannelName;
use rdkafka::ClientConfig;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::error::RDKafkaErrorCode;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tracing::debug;

use crate::error::SinkError;
use crate::message::OutboundMessage;
use crate::sink::ChannelSink;

/// Connection settings for [`KafkaSink`].
#[derive(Debug, Clone)]
pub struct KafkaSinkConfig {
    pub brokers: String,
    pub client_id: String,
    pub partitions: i32,
    pub replication: i32,
    pub send_timeout: Duration,
}

impl Default for KafkaSinkConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".into(),
            client_id: "gatekeeper".into(),
            partitions: 1,
            replication: 1,
            send_timeout: Duration::from_secs(5),
        }
    }
}

/// Publishes minimal records to per-case Kafka topics.
pub struct KafkaSink {
    config: KafkaSinkConfig,
    producer: FutureProducer,
    admin: AdminClient<DefaultClientContext>,
}

impl KafkaSink {
    pub fn new(config: KafkaSinkConfig) -> Result<Self, SinkError> {
        let mut client = ClientConfig::new();
        client
            .set("bootstrap.servers", &config.brokers)
            .set("client.id", &config.client_id);

        let producer: FutureProducer = client
            .create()
            .map_err(|e| SinkError::Configuration(e.to_string()))?;
        let admin: AdminClient<DefaultClientContext> = client
            .create()
            .map_err(|e| SinkError::Configuration(e.to_string()))?;

        Ok(Self {
            config,
            producer,
            admin,
        })
    }
}

impl ChannelSink for KafkaSink {
    fn name(&self) -> &str {
        "kafka"
    }

    async fn ensure_channel(
        &self,
        channel: &ChannelName,
        retention: Duration,
    ) -> Result<(), SinkError> {
        let retention_ms = retention.as_millis().to_string();
        let topic = NewTopic::new(
            channel.as_str(),
            self.config.partitions,
            TopicReplication::Fixed(self.config.replication),
        )
        .set("retention.ms", &retention_ms);

        let results = self
            .admin
            .create_topics([&topic], &AdminOptions::new())
            .await
            .map_err(|e| SinkError::Connection(e.to_string()))?;

        for result in results {
            match result {
                Ok(name) => debug!(topic = %name, "created topic"),
                Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    return Err(SinkError::ChannelExists(name));
                }
                Err((name, code)) => {
                    return Err(SinkError::Unavailable(format!("{name}: {code}")));
                }
            }
        }
        Ok(())
    }

    async fn publish(
        &self,
        channel: &ChannelName,
        message: &OutboundMessage,
    ) -> Result<(), SinkError> {
        let headers = message
            .headers
            .iter()
            .fold(OwnedHeaders::new(), |headers, (key, value)| {
                headers.insert(Header {
                    key,
                    value: Some(value.as_bytes()),
                })
            });

        let record = FutureRecord::to(channel.as_str())
            .key(&message.key)
            .payload(&message.payload)
            .headers(headers);

        self.producer
            .send(record, Timeout::After(self.config.send_timeout))
            .await
            .map(|_| ())
            .map_err(|(err, _)| SinkError::Connection(err.to_string()))
    }

    async fn health_check(&self) -> Result<(), SinkError> {
        let producer = self.producer.clone();
        let timeout = self.config.send_timeout;
        tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(None, Timeout::After(timeout))
                .map(|_| ())
        })
        .await
        .map_err(|e| SinkError::Unavailable(e.to_string()))?
        .map_err(|e| SinkError::Connection(e.to_string()))
    }
}
