use std::time::Duration;

use async_trait::async_trait;
use gatekeeper_core::ChannelName;

use crate::error::SinkError;
use crate::message::OutboundMessage;

/// A destination that can provision named channels and publish to them.
///
/// Uses native `async fn` and is therefore not object-safe. Implement this
/// trait and use [`DynChannelSink`] for dynamic dispatch; the blanket
/// implementation bridges the two.
pub trait ChannelSink: Send + Sync {
    /// Returns the name of this sink, used in logs.
    fn name(&self) -> &str;

    /// Create `channel` with the given retention if it does not exist.
    ///
    /// May return [`SinkError::ChannelExists`]; callers treat that as
    /// success.
    fn ensure_channel(
        &self,
        channel: &ChannelName,
        retention: Duration,
    ) -> impl std::future::Future<Output = Result<(), SinkError>> + Send;

    /// Send one message. At-least-once: a returned error means the message
    /// may or may not have been delivered.
    fn publish(
        &self,
        channel: &ChannelName,
        message: &OutboundMessage,
    ) -> impl std::future::Future<Output = Result<(), SinkError>> + Send;

    /// Verify the sink is reachable.
    fn health_check(&self) -> impl std::future::Future<Output = Result<(), SinkError>> + Send;
}

/// Object-safe sink for use behind `Arc<dyn DynChannelSink>`.
#[async_trait]
pub trait DynChannelSink: Send + Sync {
    fn name(&self) -> &str;

    async fn ensure_channel(
        &self,
        channel: &ChannelName,
        retention: Duration,
    ) -> Result<(), SinkError>;

    async fn publish(
        &self,
        channel: &ChannelName,
        message: &OutboundMessage,
    ) -> Result<(), SinkError>;

    async fn health_check(&self) -> Result<(), SinkError>;
}

#[async_trait]
impl<T: ChannelSink + Sync> DynChannelSink for T {
    fn name(&self) -> &str {
        ChannelSink::name(self)
    }

    async fn ensure_channel(
        &self,
        channel: &ChannelName,
        retention: Duration,
    ) -> Result<(), SinkError> {
        ChannelSink::ensure_channel(self, channel, retention).await
    }

    async fn publish(
        &self,
        channel: &ChannelName,
        message: &OutboundMessage,
    ) -> Result<(), SinkError> {
        ChannelSink::publish(self, channel, message).await
    }

    async fn health_check(&self) -> Result<(), SinkError> {
        ChannelSink::health_check(self).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gatekeeper_core::ConsentKey;

    use super::*;

    struct NullSink {
        healthy: bool,
    }

    impl ChannelSink for NullSink {
        fn name(&self) -> &str {
            "null"
        }

        async fn ensure_channel(
            &self,
            _channel: &ChannelName,
            _retention: Duration,
        ) -> Result<(), SinkError> {
            Ok(())
        }

        async fn publish(
            &self,
            _channel: &ChannelName,
            _message: &OutboundMessage,
        ) -> Result<(), SinkError> {
            Ok(())
        }

        async fn health_check(&self) -> Result<(), SinkError> {
            if self.healthy {
                Ok(())
            } else {
                Err(SinkError::Connection("down".into()))
            }
        }
    }

    #[tokio::test]
    async fn blanket_dyn_sink_impl() {
        let sink: Arc<dyn DynChannelSink> = Arc::new(NullSink { healthy: true });
        assert_eq!(sink.name(), "null");

        let channel = ChannelName::for_key("views", &ConsentKey::new("dwp", "1", "s"));
        sink.ensure_channel(&channel, Duration::from_secs(1))
            .await
            .unwrap();
        let message = OutboundMessage {
            key: "s".into(),
            headers: Vec::new(),
            payload: b"{}".to_vec(),
        };
        sink.publish(&channel, &message).await.unwrap();
        sink.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn dyn_sink_health_check_failure() {
        let sink: Arc<dyn DynChannelSink> = Arc::new(NullSink { healthy: false });
        let err = sink.health_check().await.unwrap_err();
        assert!(err.is_retryable());
    }
}
