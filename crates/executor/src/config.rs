use std::time::Duration;

use crate::retry::RetryStrategy;

/// Settings for the [`PublishExecutor`](crate::PublishExecutor).
///
/// ```
/// use gatekeeper_executor::ExecutorConfig;
///
/// let config = ExecutorConfig::default();
/// assert_eq!(config.max_retries, 3);
/// ```
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Retries after the first attempt before a record is given up on.
    pub max_retries: u32,
    pub retry_strategy: RetryStrategy,
    /// Upper bound on one provisioning + publish attempt.
    pub publish_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_strategy: RetryStrategy::default(),
            publish_timeout: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ExecutorConfig::default();
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.publish_timeout, Duration::from_secs(10));
        assert_eq!(cfg.retry_strategy, RetryStrategy::default());
    }
}
