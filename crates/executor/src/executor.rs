use gatekeeper_core::{ChannelName, ConsentKey, MinimalRecord};
use gatekeeper_router::{OutputRouter, SinkError};
use tracing::{debug, error, instrument, warn};

use crate::config::ExecutorConfig;

/// Result of delivering one record to one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered {
        channel: ChannelName,
        attempts: u32,
    },
    /// Retries were exhausted or the error was permanent. The record was not
    /// delivered.
    Failed {
        channel: ChannelName,
        attempts: u32,
        error: SinkError,
    },
    /// The permission check failed before an attempt, so the record was not
    /// sent. `attempts` counts the attempts made before that.
    Withdrawn {
        channel: ChannelName,
        attempts: u32,
    },
}

impl PublishOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    pub fn channel(&self) -> &ChannelName {
        match self {
            Self::Delivered { channel, .. }
            | Self::Failed { channel, .. }
            | Self::Withdrawn { channel, .. } => channel,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Delivered { attempts, .. }
            | Self::Failed { attempts, .. }
            | Self::Withdrawn { attempts, .. } => *attempts,
        }
    }
}

/// Delivers single records through an [`OutputRouter`], retrying transient
/// failures with backoff.
///
/// Each call is an independent unit of work: a failure is reported in the
/// returned outcome and never affects other records.
#[derive(Debug, Clone, Default)]
pub struct PublishExecutor {
    config: ExecutorConfig,
}

impl PublishExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Resolve the channel for `key` and publish `record` to it.
    ///
    /// Each attempt covers provisioning and the publish itself and is bounded
    /// by [`ExecutorConfig::publish_timeout`]. Retryable errors and timeouts
    /// are retried up to [`ExecutorConfig::max_retries`] times.
    pub async fn publish(
        &self,
        router: &OutputRouter,
        key: &ConsentKey,
        record: &MinimalRecord,
    ) -> PublishOutcome {
        self.publish_while(router, key, record, || true).await
    }

    /// Like [`publish`](Self::publish), but `permitted` is asked before every
    /// attempt, retries included. When it answers `false` the record is not
    /// sent and [`PublishOutcome::Withdrawn`] is returned.
    #[instrument(
        skip(self, router, record, permitted),
        fields(key = %key.canonical(), attempt)
    )]
    pub async fn publish_while(
        &self,
        router: &OutputRouter,
        key: &ConsentKey,
        record: &MinimalRecord,
        permitted: impl Fn() -> bool,
    ) -> PublishOutcome {
        let max_retries = self.config.max_retries;
        let mut attempt = 0;

        loop {
            tracing::Span::current().record("attempt", attempt);

            if !permitted() {
                debug!(attempt, "no longer permitted, publish abandoned");
                return PublishOutcome::Withdrawn {
                    channel: router.channel_for(key),
                    attempts: attempt,
                };
            }

            let result =
                tokio::time::timeout(self.config.publish_timeout, attempt_once(router, key, record))
                    .await
                    .unwrap_or(Err(SinkError::Timeout(self.config.publish_timeout)));

            let err = match result {
                Ok(channel) => {
                    debug!(channel = %channel, attempt, "record published");
                    return PublishOutcome::Delivered {
                        channel,
                        attempts: attempt + 1,
                    };
                }
                Err(err) => err,
            };

            if !err.is_retryable() || attempt >= max_retries {
                error!(
                    attempt,
                    error = %err,
                    code = err.code(),
                    retryable = err.is_retryable(),
                    "publish failed, record left in buffer"
                );
                return PublishOutcome::Failed {
                    channel: router.channel_for(key),
                    attempts: attempt + 1,
                    error: err,
                };
            }

            let delay = self.config.retry_strategy.delay_for(attempt);
            warn!(
                attempt,
                error = %err,
                delay_ms = %delay.as_millis(),
                "retryable publish error, will retry"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

async fn attempt_once(
    router: &OutputRouter,
    key: &ConsentKey,
    record: &MinimalRecord,
) -> Result<ChannelName, SinkError> {
    let channel = router.resolve(key).await?;
    router.publish(&channel, key, record).await?;
    Ok(channel)
}

#[cfg(test)]
#[allow(clippy::unnecessary_literal_bound)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use chrono::Utc;
    use gatekeeper_core::SubjectId;
    use gatekeeper_router::{ChannelSink, MemorySink, OutboundMessage};

    use super::*;
    use crate::retry::RetryStrategy;

    // -- Mock sinks --------------------------------------------------------

    /// Rejects every publish permanently.
    struct RejectingSink;

    impl ChannelSink for RejectingSink {
        fn name(&self) -> &str {
            "rejecting"
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
            Err(SinkError::Rejected("schema mismatch".into()))
        }

        async fn health_check(&self) -> Result<(), SinkError> {
            Ok(())
        }
    }

    /// Never answers.
    struct SlowSink;

    impl ChannelSink for SlowSink {
        fn name(&self) -> &str {
            "slow"
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
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        async fn health_check(&self) -> Result<(), SinkError> {
            Ok(())
        }
    }

    /// Fails provisioning the first N times.
    struct FlakyProvisioning {
        failures_left: AtomicU32,
    }

    impl ChannelSink for FlakyProvisioning {
        fn name(&self) -> &str {
            "flaky-provisioning"
        }

        async fn ensure_channel(
            &self,
            _channel: &ChannelName,
            _retention: Duration,
        ) -> Result<(), SinkError> {
            let ok = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_err();
            if ok {
                Ok(())
            } else {
                Err(SinkError::Connection("broker not ready".into()))
            }
        }

        async fn publish(
            &self,
            _channel: &ChannelName,
            _message: &OutboundMessage,
        ) -> Result<(), SinkError> {
            Ok(())
        }

        async fn health_check(&self) -> Result<(), SinkError> {
            Ok(())
        }
    }

    // -- Helpers -----------------------------------------------------------

    fn key() -> ConsentKey {
        ConsentKey::new("dwp", "4711", "nhs-999")
    }

    fn record() -> MinimalRecord {
        MinimalRecord {
            subject_id: SubjectId::new("nhs-999"),
            recorded_at: Utc::now(),
            fields: serde_json::Map::new(),
        }
    }

    fn fast_config() -> ExecutorConfig {
        ExecutorConfig {
            max_retries: 3,
            retry_strategy: RetryStrategy::Constant {
                delay: Duration::from_millis(1),
            },
            publish_timeout: Duration::from_secs(5),
        }
    }

    // -- Tests -------------------------------------------------------------

    #[tokio::test]
    async fn publish_success_first_attempt() {
        let sink = Arc::new(MemorySink::new());
        let router = OutputRouter::new(sink.clone(), "views.permitted");
        let executor = PublishExecutor::new(fast_config());

        let outcome = executor.publish(&router, &key(), &record()).await;
        assert!(outcome.is_delivered());
        assert_eq!(outcome.attempts(), 1);
        assert_eq!(outcome.channel().as_str(), "views.permitted.dwp.4711.nhs-999");
        assert_eq!(sink.deliveries().len(), 1);
    }

    #[tokio::test]
    async fn publish_recovers_after_transient_failures() {
        let sink = Arc::new(MemorySink::new());
        sink.fail_next(2);
        let router = OutputRouter::new(sink.clone(), "views.permitted");
        let executor = PublishExecutor::new(fast_config());

        let outcome = executor.publish(&router, &key(), &record()).await;
        assert!(outcome.is_delivered());
        assert_eq!(outcome.attempts(), 3);
        assert_eq!(sink.deliveries().len(), 1);
    }

    #[tokio::test]
    async fn publish_gives_up_after_max_retries() {
        let sink = Arc::new(MemorySink::new());
        sink.fail_next(100);
        let router = OutputRouter::new(sink.clone(), "views.permitted");
        let executor = PublishExecutor::new(fast_config());

        match executor.publish(&router, &key(), &record()).await {
            PublishOutcome::Failed {
                attempts, error, ..
            } => {
                assert_eq!(attempts, 4, "1 initial + 3 retries");
                assert!(error.is_retryable());
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(sink.publish_attempts(), 4);
        assert!(sink.deliveries().is_empty());
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let router = OutputRouter::new(Arc::new(RejectingSink), "views.permitted");
        let executor = PublishExecutor::new(fast_config());

        match executor.publish(&router, &key(), &record()).await {
            PublishOutcome::Failed {
                attempts, error, ..
            } => {
                assert_eq!(attempts, 1);
                assert_eq!(error.code(), "REJECTED");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn provisioning_failures_are_retried() {
        let sink = Arc::new(FlakyProvisioning {
            failures_left: AtomicU32::new(1),
        });
        let router = OutputRouter::new(sink, "views.permitted");
        let executor = PublishExecutor::new(fast_config());

        let outcome = executor.publish(&router, &key(), &record()).await;
        assert!(outcome.is_delivered());
        assert_eq!(outcome.attempts(), 2);
        assert_eq!(router.channels().len(), 1);
    }

    #[tokio::test]
    async fn retry_stops_once_permission_is_withdrawn() {
        let sink = Arc::new(MemorySink::new());
        sink.fail_next(100);
        let router = OutputRouter::new(sink.clone(), "views.permitted");
        let executor = PublishExecutor::new(fast_config());
        let checks = AtomicU32::new(0);

        // Permitted for the first attempt only.
        let outcome = executor
            .publish_while(&router, &key(), &record(), || {
                checks.fetch_add(1, Ordering::SeqCst) == 0
            })
            .await;

        assert_eq!(
            outcome,
            PublishOutcome::Withdrawn {
                channel: router.channel_for(&key()),
                attempts: 1,
            }
        );
        assert_eq!(sink.publish_attempts(), 1);
        assert!(sink.deliveries().is_empty());
    }

    #[tokio::test]
    async fn nothing_is_sent_when_never_permitted() {
        let sink = Arc::new(MemorySink::new());
        let router = OutputRouter::new(sink.clone(), "views.permitted");
        let executor = PublishExecutor::new(fast_config());

        let outcome = executor
            .publish_while(&router, &key(), &record(), || false)
            .await;

        assert!(!outcome.is_delivered());
        assert_eq!(outcome.attempts(), 0);
        assert_eq!(sink.publish_attempts(), 0);
    }

    #[tokio::test]
    async fn publish_timeout() {
        tokio::time::pause();
        let config = ExecutorConfig {
            max_retries: 1,
            retry_strategy: RetryStrategy::Constant {
                delay: Duration::from_millis(1),
            },
            publish_timeout: Duration::from_millis(100),
        };
        let router = OutputRouter::new(Arc::new(SlowSink), "views.permitted");
        let executor = PublishExecutor::new(config);

        match executor.publish(&router, &key(), &record()).await {
            PublishOutcome::Failed {
                attempts, error, ..
            } => {
                assert_eq!(attempts, 2);
                assert_eq!(error, SinkError::Timeout(Duration::from_millis(100)));
            }
            other => panic!("expected Failed(Timeout), got {other:?}"),
        }
    }
}
