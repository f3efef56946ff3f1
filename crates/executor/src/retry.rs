use std::time::Duration;

/// Backoff curve used between publish attempts.
///
/// Every variant is capped so a single wait never exceeds its maximum.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// `base * multiplier^attempt`.
    Exponential {
        base: Duration,
        max: Duration,
        multiplier: f64,
        /// Multiply each delay by `1.0 + 0.1 * (attempt % 5)`. This is a
        /// fixed function of the attempt number, not random jitter: two
        /// callers on the same attempt wait exactly as long.
        stretch: bool,
    },
    /// `delay * (attempt + 1)`.
    Linear { delay: Duration, max: Duration },
    /// The same delay before every retry.
    Constant { delay: Duration },
}

impl RetryStrategy {
    /// Doubling, stretched backoff between `base` and `max`.
    pub fn exponential(base: Duration, max: Duration) -> Self {
        Self::Exponential {
            base,
            max,
            multiplier: 2.0,
            stretch: true,
        }
    }

    /// Delay to wait after the zero-based `attempt` failed.
    ///
    /// ```
    /// use std::time::Duration;
    /// use gatekeeper_executor::RetryStrategy;
    ///
    /// let strategy = RetryStrategy::Linear {
    ///     delay: Duration::from_millis(200),
    ///     max: Duration::from_secs(1),
    /// };
    /// assert_eq!(strategy.delay_for(1), Duration::from_millis(400));
    /// assert_eq!(strategy.delay_for(9), Duration::from_secs(1));
    /// ```
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Self::Exponential {
                base,
                max,
                multiplier,
                stretch,
            } => {
                // Retry counts are tiny, the cast cannot wrap.
                #[allow(clippy::cast_possible_wrap)]
                let mut secs = base.as_secs_f64() * multiplier.powi(attempt as i32);
                if *stretch {
                    secs *= 1.0 + 0.1 * f64::from(attempt % 5);
                }
                capped(secs, *max)
            }
            Self::Linear { delay, max } => {
                capped(delay.as_secs_f64() * f64::from(attempt + 1), *max)
            }
            Self::Constant { delay } => *delay,
        }
    }
}

fn capped(secs: f64, max: Duration) -> Duration {
    Duration::from_secs_f64(secs.min(max.as_secs_f64()))
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::exponential(Duration::from_millis(100), Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_doubles_without_stretch() {
        let strategy = RetryStrategy::Exponential {
            base: Duration::from_millis(50),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            stretch: false,
        };
        let delays: Vec<Duration> = (0..4).map(|a| strategy.delay_for(a)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(50),
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
            ]
        );
    }

    #[test]
    fn exponential_is_capped() {
        let strategy = RetryStrategy::Exponential {
            base: Duration::from_secs(1),
            max: Duration::from_secs(5),
            multiplier: 3.0,
            stretch: false,
        };
        assert_eq!(strategy.delay_for(2), Duration::from_secs(5));
        assert_eq!(strategy.delay_for(20), Duration::from_secs(5));
    }

    #[test]
    fn stretch_is_deterministic() {
        let strategy = RetryStrategy::exponential(Duration::from_millis(100), Duration::from_secs(60));
        assert_eq!(strategy.delay_for(0), Duration::from_millis(100));
        assert_eq!(strategy.delay_for(1), Duration::from_millis(220));
        assert_eq!(strategy.delay_for(1), strategy.delay_for(1));
    }

    #[test]
    fn linear_grows_then_caps() {
        let strategy = RetryStrategy::Linear {
            delay: Duration::from_millis(500),
            max: Duration::from_secs(2),
        };
        assert_eq!(strategy.delay_for(0), Duration::from_millis(500));
        assert_eq!(strategy.delay_for(2), Duration::from_millis(1500));
        assert_eq!(strategy.delay_for(5), Duration::from_secs(2));
    }

    #[test]
    fn constant_never_changes() {
        let strategy = RetryStrategy::Constant {
            delay: Duration::from_millis(5),
        };
        assert!((0..10).all(|a| strategy.delay_for(a) == Duration::from_millis(5)));
    }

    #[test]
    fn default_backoff_bounds() {
        assert_eq!(
            RetryStrategy::default(),
            RetryStrategy::exponential(Duration::from_millis(100), Duration::from_secs(30))
        );
    }
}
