//! Adapters from inbound streams to the relay inbox.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use gatekeeper_core::{ConsentDecision, RecordError, RedactionPolicy};
use gatekeeper_executor::RetryStrategy;
use gatekeeper_transport::{EventSource, TransportError};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::RelayMetrics;
use crate::worker::{Inbound, RelayHandle};

/// Connection state of one inbound stream, shared with the query surface.
#[derive(Debug)]
pub struct IngestStatus {
    stream: &'static str,
    connected: AtomicBool,
    ended: AtomicBool,
    received: AtomicU64,
    malformed: AtomicU64,
    reconnects: AtomicU64,
    last_error: Mutex<Option<(DateTime<Utc>, String)>>,
}

/// Point-in-time copy of an [`IngestStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestSnapshot {
    pub stream: String,
    pub connected: bool,
    pub ended: bool,
    pub received: u64,
    pub malformed: u64,
    pub reconnects: u64,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
}

impl IngestStatus {
    pub fn new(stream: &'static str) -> Self {
        Self {
            stream,
            connected: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            received: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            last_error: Mutex::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    fn set_error(&self, err: &TransportError) {
        *self.last_error.lock() = Some((Utc::now(), err.to_string()));
    }

    pub fn snapshot(&self) -> IngestSnapshot {
        let last_error = self.last_error.lock().clone();
        IngestSnapshot {
            stream: self.stream.to_owned(),
            connected: self.connected.load(Ordering::Relaxed),
            ended: self.ended.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            last_error_at: last_error.as_ref().map(|(at, _)| *at),
            last_error: last_error.map(|(_, msg)| msg),
        }
    }
}

/// How payloads of a stream are decoded.
enum Decoder {
    Raw(RedactionPolicy),
    Consent,
}

impl Decoder {
    fn decode(&self, bytes: &[u8]) -> Result<Inbound, RecordError> {
        match self {
            Self::Raw(policy) => policy.parse(bytes).map(Inbound::Raw),
            Self::Consent => ConsentDecision::from_slice(bytes).map(Inbound::Consent),
        }
    }
}

/// Decodes payloads and hands them to the relay inbox.
struct Forwarder {
    decoder: Decoder,
    handle: RelayHandle,
    status: Arc<IngestStatus>,
    metrics: Arc<RelayMetrics>,
}

impl Forwarder {
    /// Decode and submit one payload. Malformed payloads are logged and
    /// skipped. Returns `false` once the worker is gone.
    async fn forward(&self, bytes: &[u8]) -> bool {
        match self.decoder.decode(bytes) {
            Ok(message) => self.handle.send(message).await.is_ok(),
            Err(err) => {
                self.status.malformed.fetch_add(1, Ordering::Relaxed);
                self.metrics.increment_malformed();
                warn!(
                    stream = self.status.stream,
                    error = %err,
                    bytes = bytes.len(),
                    "skipping malformed message"
                );
                true
            }
        }
    }
}

/// Shared run loop behind both ingesters.
struct StreamIngester {
    source: Box<dyn EventSource>,
    forwarder: Forwarder,
    backoff: RetryStrategy,
}

fn default_backoff() -> RetryStrategy {
    RetryStrategy::exponential(Duration::from_millis(500), Duration::from_secs(30))
}

impl StreamIngester {
    async fn run(mut self, cancel: CancellationToken) {
        let status = Arc::clone(&self.forwarder.status);
        let stream = status.stream;
        let mut attempt: u32 = 0;

        'connect: loop {
            let connected = tokio::select! {
                () = cancel.cancelled() => break 'connect,
                result = self.source.connect() => result,
            };
            if let Err(err) = connected {
                status.set_connected(false);
                status.set_error(&err);
                let delay = self.backoff.delay_for(attempt);
                warn!(
                    stream,
                    source = %self.source.name(),
                    attempt,
                    error = %err,
                    delay_ms = %delay.as_millis(),
                    "stream unavailable, will retry"
                );
                attempt = attempt.saturating_add(1).min(32);
                tokio::select! {
                    () = cancel.cancelled() => break 'connect,
                    () = tokio::time::sleep(delay) => continue 'connect,
                }
            }

            status.set_connected(true);
            info!(stream, source = %self.source.name(), "stream connected");

            loop {
                let next = tokio::select! {
                    () = cancel.cancelled() => break 'connect,
                    next = self.source.next() => next,
                };
                match next {
                    Ok(Some(bytes)) => {
                        attempt = 0;
                        status.received.fetch_add(1, Ordering::Relaxed);
                        if !self.forwarder.forward(&bytes).await {
                            info!(stream, "relay worker stopped, ingester exiting");
                            break 'connect;
                        }
                    }
                    Ok(None) => {
                        info!(stream, "stream ended");
                        status.ended.store(true, Ordering::Relaxed);
                        break 'connect;
                    }
                    Err(err) => {
                        status.set_connected(false);
                        status.set_error(&err);
                        status.reconnects.fetch_add(1, Ordering::Relaxed);
                        let delay = self.backoff.delay_for(attempt);
                        warn!(
                            stream,
                            attempt,
                            error = %err,
                            delay_ms = %delay.as_millis(),
                            "stream receive failed, reconnecting"
                        );
                        attempt = attempt.saturating_add(1).min(32);
                        tokio::select! {
                            () = cancel.cancelled() => break 'connect,
                            () = tokio::time::sleep(delay) => continue 'connect,
                        }
                    }
                }
            }
        }

        status.set_connected(false);
        debug!(stream, "ingester stopped");
    }
}

/// Feeds raw records from a source into the relay, in arrival order.
pub struct RawEventIngester(StreamIngester);

impl RawEventIngester {
    pub fn new(
        source: Box<dyn EventSource>,
        policy: RedactionPolicy,
        handle: RelayHandle,
        status: Arc<IngestStatus>,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self(StreamIngester {
            source,
            forwarder: Forwarder {
                decoder: Decoder::Raw(policy),
                handle,
                status,
                metrics,
            },
            backoff: default_backoff(),
        })
    }

    /// Backoff between connection attempts and after receive failures.
    #[must_use]
    pub fn with_backoff(mut self, backoff: RetryStrategy) -> Self {
        self.0.backoff = backoff;
        self
    }

    /// Run until the stream ends, the worker stops, or `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        self.0.run(cancel).await;
    }
}

/// Feeds consent decisions from a source into the relay, in arrival order.
pub struct ConsentEventIngester(StreamIngester);

impl ConsentEventIngester {
    pub fn new(
        source: Box<dyn EventSource>,
        handle: RelayHandle,
        status: Arc<IngestStatus>,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self(StreamIngester {
            source,
            forwarder: Forwarder {
                decoder: Decoder::Consent,
                handle,
                status,
                metrics,
            },
            backoff: default_backoff(),
        })
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: RetryStrategy) -> Self {
        self.0.backoff = backoff;
        self
    }

    pub async fn run(self, cancel: CancellationToken) {
        self.0.run(cancel).await;
    }
}
