use std::time::Duration;

use gatekeeper_core::ChannelName;
use tracing::info;

use crate::error::SinkError;
use crate::message::OutboundMessage;
use crate::sink::ChannelSink;

/// A sink that logs every provisioning and publish and performs no I/O.
///
/// Useful for local runs where no broker is available.
pub struct LogSink {
    name: String,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ChannelSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[allow(clippy::unused_async)]
    async fn ensure_channel(
        &self,
        channel: &ChannelName,
        retention: Duration,
    ) -> Result<(), SinkError> {
        info!(
            sink = %self.name,
            channel = %channel,
            retention_secs = retention.as_secs(),
            "log sink provisioned channel"
        );
        Ok(())
    }

    #[allow(clippy::unused_async)]
    async fn publish(
        &self,
        channel: &ChannelName,
        message: &OutboundMessage,
    ) -> Result<(), SinkError> {
        info!(
            sink = %self.name,
            channel = %channel,
            key = %message.key,
            bytes = message.payload.len(),
            payload = %String::from_utf8_lossy(&message.payload),
            "log sink published record"
        );
        Ok(())
    }

    #[allow(clippy::unused_async)]
    async fn health_check(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use gatekeeper_core::ConsentKey;

    use super::*;

    #[test]
    fn log_sink_name() {
        let sink = LogSink::new("stdout");
        assert_eq!(ChannelSink::name(&sink), "stdout");
    }

    #[tokio::test]
    async fn log_sink_accepts_everything() {
        let sink = LogSink::new("stdout");
        let channel = ChannelName::for_key("views.permitted", &ConsentKey::new("dwp", "4711", "nhs-999"));
        ChannelSink::ensure_channel(&sink, &channel, Duration::from_secs(60))
            .await
            .unwrap();
        let message = OutboundMessage {
            key: "nhs-999".into(),
            headers: Vec::new(),
            payload: b"{}".to_vec(),
        };
        ChannelSink::publish(&sink, &channel, &message).await.unwrap();
        ChannelSink::health_check(&sink).await.unwrap();
    }
}
