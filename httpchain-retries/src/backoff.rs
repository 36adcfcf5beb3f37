//! Backoff strategies.

use rand::Rng;
use std::time::Duration;

/// Computes how long to wait before a retry.
pub trait BackoffStrategy: Send + Sync {
    /// Delay before retry number `attempt` (1-based).
    fn time_to_wait(&self, attempt: u32) -> Duration;
}

/// Exponential backoff with jitter.
///
/// The delay for attempt `k` is `base * 2^k` plus a random jitter of up to
/// half that value, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Base delay.
    pub base_delay: Duration,
    /// Maximum delay.
    pub max_delay: Duration,
    /// Whether to add random jitter.
    pub jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl ExponentialBackoff {
    /// Create an exponential backoff with jitter.
    #[must_use]
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            jitter: true,
        }
    }

    /// Create a builder.
    #[must_use]
    pub fn builder() -> ExponentialBackoffBuilder {
        ExponentialBackoffBuilder::default()
    }

    /// Calculate delay for an attempt.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.base_delay.min(self.max_delay);
        }

        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let backoff = self.base_delay.saturating_mul(factor);
        let jitter = if self.jitter {
            rand_jitter(backoff / 2)
        } else {
            Duration::ZERO
        };

        backoff.saturating_add(jitter).min(self.max_delay)
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn time_to_wait(&self, attempt: u32) -> Duration {
        self.calculate_delay(attempt)
    }
}

/// Builder for ExponentialBackoff.
#[derive(Debug, Default)]
pub struct ExponentialBackoffBuilder {
    base_delay: Option<Duration>,
    max_delay: Option<Duration>,
    jitter: Option<bool>,
}

impl ExponentialBackoffBuilder {
    /// Set base delay.
    #[must_use]
    pub fn base_delay(mut self, d: Duration) -> Self {
        self.base_delay = Some(d);
        self
    }

    /// Set max delay.
    #[must_use]
    pub fn max_delay(mut self, d: Duration) -> Self {
        self.max_delay = Some(d);
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = Some(enabled);
        self
    }

    /// Build the backoff strategy.
    #[must_use]
    pub fn build(self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff::default();
        if let Some(v) = self.base_delay {
            backoff.base_delay = v;
        }
        if let Some(v) = self.max_delay {
            backoff.max_delay = v;
        }
        if let Some(v) = self.jitter {
            backoff.jitter = v;
        }
        backoff
    }
}

/// Same delay before every retry.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    /// Delay between retries.
    pub delay: Duration,
}

impl LinearBackoff {
    /// Create a new linear backoff.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl BackoffStrategy for LinearBackoff {
    fn time_to_wait(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

/// Retry immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackoff;

impl BackoffStrategy for NoBackoff {
    fn time_to_wait(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

/// Uniform random duration in `[0, upper)`.
fn rand_jitter(upper: Duration) -> Duration {
    let upper = u64::try_from(upper.as_nanos()).unwrap_or(u64::MAX);
    if upper == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(rand::thread_rng().gen_range(0..upper))
}
