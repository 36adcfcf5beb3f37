//! Retry configuration.

use crate::backoff::{BackoffStrategy, ExponentialBackoff, LinearBackoff};
use crate::store::{DEFAULT_IDLE_TTL, DEFAULT_SWEEP_INTERVAL};
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries.
    pub max_retries: u32,
    /// Wait strategy.
    pub wait: WaitStrategy,
    /// How long an idle attempt counter is kept.
    pub idle_ttl: Duration,
    /// How often expired attempt counters are swept.
    pub sweep_interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            wait: WaitStrategy::Exponential {
                base: Duration::from_millis(500),
                max: Duration::from_secs(60),
            },
            idle_ttl: DEFAULT_IDLE_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl RetryConfig {
    /// Create a new default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max retries.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set the wait strategy.
    pub fn wait(mut self, strategy: WaitStrategy) -> Self {
        self.wait = strategy;
        self
    }

    /// Use exponential backoff with jitter.
    pub fn exponential(mut self, base: Duration, max: Duration) -> Self {
        self.wait = WaitStrategy::Exponential { base, max };
        self
    }

    /// Use the same delay before every retry.
    pub fn linear(mut self, delay: Duration) -> Self {
        self.wait = WaitStrategy::Linear(delay);
        self
    }

    /// Retry without waiting.
    pub fn no_wait(mut self) -> Self {
        self.wait = WaitStrategy::None;
        self
    }

    /// Set the idle lifetime of attempt counters.
    pub fn idle_ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = ttl;
        self
    }

    /// Set the sweep interval of attempt counters.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Create config that never retries.
    pub fn no_retry() -> Self {
        Self::new().max_retries(0)
    }
}

/// Strategy for waiting between retries.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitStrategy {
    /// No waiting.
    None,
    /// Same delay before every retry.
    Linear(Duration),
    /// Exponential backoff with jitter, capped at `max`.
    Exponential {
        /// Base delay.
        base: Duration,
        /// Maximum delay.
        max: Duration,
    },
}

impl WaitStrategy {
    /// Calculate the wait duration for a given attempt.
    pub fn calculate(&self, attempt: u32) -> Duration {
        match self {
            WaitStrategy::None => Duration::ZERO,
            WaitStrategy::Linear(delay) => LinearBackoff::new(*delay).time_to_wait(attempt),
            WaitStrategy::Exponential { base, max } => {
                ExponentialBackoff::new(*base, *max).calculate_delay(attempt)
            }
        }
    }
}

impl BackoffStrategy for WaitStrategy {
    fn time_to_wait(&self, attempt: u32) -> Duration {
        self.calculate(attempt)
    }
}
