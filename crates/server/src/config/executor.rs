use std::time::Duration;

use gatekeeper_executor::RetryStrategy;
use serde::Deserialize;

/// Configuration for the publish executor. Unset fields keep the executor's
/// defaults.
#[derive(Debug, Default, Deserialize)]
pub struct ExecutorConfig {
    /// Retries after the first failed publish attempt.
    pub max_retries: Option<u32>,
    /// Per-attempt timeout in seconds, covering provisioning and publish.
    pub timeout_seconds: Option<u64>,
    /// First backoff delay in milliseconds.
    pub retry_base_ms: Option<u64>,
    /// Backoff ceiling in milliseconds.
    pub retry_max_ms: Option<u64>,
}

impl ExecutorConfig {
    pub fn to_executor_config(&self) -> gatekeeper_executor::ExecutorConfig {
        let mut config = gatekeeper_executor::ExecutorConfig::default();
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        if let Some(timeout) = self.timeout_seconds {
            config.publish_timeout = Duration::from_secs(timeout);
        }
        if self.retry_base_ms.is_some() || self.retry_max_ms.is_some() {
            let base = Duration::from_millis(self.retry_base_ms.unwrap_or(100));
            let max = Duration::from_millis(self.retry_max_ms.unwrap_or(30_000));
            config.retry_strategy = RetryStrategy::exponential(base, max.max(base));
        }
        config
    }
}
