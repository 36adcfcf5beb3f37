//! # httpchain-retries
//!
//! Retry interceptor and backoff strategies for httpchain.
//!
//! ## Core Concepts
//!
//! - **[`Retrier`]**: Interceptor that replays failed calls through the chain
//! - **[`BackoffStrategy`]**: How long to wait before each retry
//! - **[`RetryDecider`]**: Whether an outcome is retried, kept, or exhausted
//! - **[`AttemptStore`]**: Attempt counters per correlation id with idle expiry
//! - **[`RetryConfig`]**: Declarative retry settings
//!
//! ## Wait Strategies
//!
//! - [`ExponentialBackoff`]: `base * 2^k` plus jitter, capped
//! - [`LinearBackoff`]: Constant delay between attempts
//! - [`NoBackoff`]: Retry immediately
//!
//! ## Example
//!
//! ```ignore
//! use httpchain_core::{Chain, ReqwestTransport};
//! use httpchain_retries::{Retrier, RetryConfig};
//! use std::time::Duration;
//!
//! let chain = Chain::new(ReqwestTransport::new());
//! chain.add_interceptor(Retrier::from_config(
//!     &RetryConfig::new()
//!         .max_retries(3)
//!         .exponential(Duration::from_millis(100), Duration::from_secs(10)),
//! ));
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod backoff;
pub mod config;
pub mod policy;
pub mod retrier;
pub mod store;

// Re-exports
pub use backoff::{
    BackoffStrategy, ExponentialBackoff, ExponentialBackoffBuilder, LinearBackoff, NoBackoff,
};
pub use config::{RetryConfig, WaitStrategy};
pub use policy::{RetryAll, RetryDecider, RetryDecision, RetryState, StatusCodePolicy};
pub use retrier::Retrier;
pub use store::{AttemptStore, DEFAULT_IDLE_TTL, DEFAULT_SWEEP_INTERVAL};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        BackoffStrategy, ExponentialBackoff, LinearBackoff, Retrier, RetryAll, RetryConfig,
        RetryDecider, RetryDecision, WaitStrategy,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;

        let config = RetryConfig::new().max_retries(5);
        assert_eq!(config.max_retries, 5);
        let _ = Retrier::from_config(&config);
    }

    #[test]
    fn test_exponential_defaults() {
        let backoff = ExponentialBackoff::default();
        assert_eq!(backoff.base_delay, Duration::from_millis(500));
        assert_eq!(backoff.max_delay, Duration::from_secs(60));
    }
}
