use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use gatekeeper_core::ChannelName;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::SinkError;
use crate::message::OutboundMessage;
use crate::sink::ChannelSink;

/// One message accepted by a [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub channel: ChannelName,
    pub message: OutboundMessage,
}

type RejectFn = Box<dyn Fn(&OutboundMessage) -> bool + Send + Sync>;

/// An in-process sink that keeps every delivery in memory.
///
/// Failure injection hooks make it usable as a test double for transient and
/// permanent publish failures.
#[derive(Default)]
pub struct MemorySink {
    deliveries: Mutex<Vec<Delivery>>,
    channels: Mutex<BTreeMap<ChannelName, Duration>>,
    preexisting: Mutex<BTreeSet<ChannelName>>,
    fail_next: AtomicU32,
    publish_attempts: AtomicU32,
    reject: Mutex<Option<RejectFn>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend `channel` was created by someone else before the relay
    /// started. Provisioning it reports [`SinkError::ChannelExists`].
    #[must_use]
    pub fn with_existing_channel(self, channel: ChannelName) -> Self {
        self.preexisting.lock().insert(channel);
        self
    }

    /// Fail the next `n` publish calls with a retryable connection error.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Fail every publish for which `predicate` returns `true` with a
    /// retryable error. Replaces any earlier predicate.
    pub fn fail_when(&self, predicate: impl Fn(&OutboundMessage) -> bool + Send + Sync + 'static) {
        *self.reject.lock() = Some(Box::new(predicate));
    }

    /// Stop failing messages matched by [`fail_when`](Self::fail_when).
    pub fn heal(&self) {
        *self.reject.lock() = None;
        self.fail_next.store(0, Ordering::SeqCst);
    }

    /// Every accepted delivery, in publish order.
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    /// Decoded payloads delivered to `channel`, in publish order.
    pub fn payloads_to(&self, channel: &str) -> Vec<Value> {
        self.deliveries
            .lock()
            .iter()
            .filter(|d| d.channel.as_str() == channel)
            .filter_map(|d| serde_json::from_slice(&d.message.payload).ok())
            .collect()
    }

    /// Number of messages accepted on `channel`.
    pub fn count_to(&self, channel: &str) -> usize {
        self.deliveries
            .lock()
            .iter()
            .filter(|d| d.channel.as_str() == channel)
            .count()
    }

    /// Channels provisioned through this sink, with their retention.
    pub fn provisioned(&self) -> BTreeMap<ChannelName, Duration> {
        self.channels.lock().clone()
    }

    /// Total publish calls, including failed ones.
    pub fn publish_attempts(&self) -> u32 {
        self.publish_attempts.load(Ordering::SeqCst)
    }
}

impl ChannelSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    #[allow(clippy::unused_async)]
    async fn ensure_channel(
        &self,
        channel: &ChannelName,
        retention: Duration,
    ) -> Result<(), SinkError> {
        if self.preexisting.lock().contains(channel) {
            return Err(SinkError::ChannelExists(channel.to_string()));
        }
        let mut channels = self.channels.lock();
        if channels.contains_key(channel) {
            return Err(SinkError::ChannelExists(channel.to_string()));
        }
        channels.insert(channel.clone(), retention);
        Ok(())
    }

    #[allow(clippy::unused_async)]
    async fn publish(
        &self,
        channel: &ChannelName,
        message: &OutboundMessage,
    ) -> Result<(), SinkError> {
        self.publish_attempts.fetch_add(1, Ordering::SeqCst);

        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(SinkError::Connection("injected failure".into()));
        }
        if self.reject.lock().as_ref().is_some_and(|f| f(message)) {
            return Err(SinkError::Unavailable("injected failure".into()));
        }

        self.deliveries.lock().push(Delivery {
            channel: channel.clone(),
            message: message.clone(),
        });
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

    fn channel() -> ChannelName {
        ChannelName::for_key("views.permitted", &ConsentKey::new("dwp", "4711", "nhs-999"))
    }

    fn message(payload: &str) -> OutboundMessage {
        OutboundMessage {
            key: "nhs-999".into(),
            headers: Vec::new(),
            payload: payload.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn records_deliveries_in_order() {
        let sink = MemorySink::new();
        sink.publish(&channel(), &message(r#"{"n":1}"#)).await.unwrap();
        sink.publish(&channel(), &message(r#"{"n":2}"#)).await.unwrap();
        let payloads = sink.payloads_to(channel().as_str());
        assert_eq!(payloads, vec![serde_json::json!({"n":1}), serde_json::json!({"n":2})]);
        assert_eq!(sink.count_to(channel().as_str()), 2);
    }

    #[tokio::test]
    async fn fail_next_is_consumed() {
        let sink = MemorySink::new();
        sink.fail_next(2);
        assert!(sink.publish(&channel(), &message("{}")).await.is_err());
        assert!(sink.publish(&channel(), &message("{}")).await.is_err());
        assert!(sink.publish(&channel(), &message("{}")).await.is_ok());
        assert_eq!(sink.publish_attempts(), 3);
        assert_eq!(sink.deliveries().len(), 1);
    }

    #[tokio::test]
    async fn predicate_failures_until_healed() {
        let sink = MemorySink::new();
        sink.fail_when(|m| m.payload == b"bad");
        let err = sink.publish(&channel(), &message("bad")).await.unwrap_err();
        assert!(err.is_retryable());
        sink.publish(&channel(), &message("good")).await.unwrap();
        sink.heal();
        sink.publish(&channel(), &message("bad")).await.unwrap();
        assert_eq!(sink.deliveries().len(), 2);
    }

    #[tokio::test]
    async fn second_provision_reports_exists() {
        let sink = MemorySink::new();
        sink.ensure_channel(&channel(), Duration::from_secs(10)).await.unwrap();
        let err = sink
            .ensure_channel(&channel(), Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::ChannelExists(_)));
        assert_eq!(sink.provisioned().len(), 1);
    }
}
