//! # httpchain - Interceptor Pipeline for HTTP Clients
//!
//! httpchain wraps outbound HTTP calls in a chain of composable interceptors.
//! Each call runs every interceptor's `before_request` hook in registration
//! order, performs at most one network exchange, then runs every
//! `after_response` hook in the same order.
//!
//! ## Quick Start
//!
//! ```ignore
//! use httpchain::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pipeline = Pipeline::builder()
//!         .bearer(std::env::var("API_TOKEN")?)
//!         .logger(LoggerOptions::default().skip_header("authorization"))
//!         .classify_errors()
//!         .retry(&RetryConfig::new().max_retries(3))
//!         .build()?;
//!
//!     let response = pipeline
//!         .execute(HttpRequest::get("https://api.example.com/v1/servers")?)
//!         .await?;
//!     println!("{}", response.text().await?);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`httpchain_core`] - Call context, interceptor trait, chain executor, transports
//! - [`httpchain_interceptors`] - Authenticator, Logger, ErrorClassifier
//! - [`httpchain_retries`] - Retrier, backoff strategies, attempt store
//! - [`httpchain_breaker`] - Circuit breaker state machine and interceptor
//!
//! ## Interceptor Order
//!
//! [`Pipeline::builder`] installs the stock interceptors as authenticator,
//! logger, error classifier, circuit breaker, retrier. The retrier sits last
//! so it sees errors set by everything before it, and its replays pass
//! through the whole chain again.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod pipeline;

// Component crates
pub use httpchain_breaker as breaker;
pub use httpchain_core as core;
pub use httpchain_interceptors as interceptors;
pub use httpchain_retries as retries;

// Re-exports
pub use config::{
    BackoffSettings, BreakerSettings, ConfigError, LoggerSettings, PipelineConfig, RetrySettings,
};
pub use pipeline::{with_default_auth, Pipeline, PipelineBuilder};

pub use httpchain_breaker::{
    BreakerConfig, CircuitBreaker, CircuitBreakerInterceptor, CircuitState, Counts,
};
pub use httpchain_core::{
    CallContext, CallOptions, CallOrigin, CallScope, Chain, ChainError, CorrelationId,
    HttpRequest, HttpResponse, Interceptor, Replay, ReqwestTransport, Result, Transport,
};
pub use httpchain_interceptors::{
    Authenticator, ErrorClassifier, ErrorDetector, LogSink, Logger, LoggerOptions,
    StatusErrorDetector, TracingSink,
};
pub use httpchain_retries::{
    BackoffStrategy, ExponentialBackoff, LinearBackoff, NoBackoff, Retrier, RetryAll,
    RetryConfig, RetryDecider, RetryDecision, StatusCodePolicy, WaitStrategy,
};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        Authenticator, BreakerConfig, CallContext, CallOptions, CallScope, Chain, ChainError,
        CircuitBreaker, CircuitBreakerInterceptor, ErrorClassifier, HttpRequest, HttpResponse,
        Interceptor, Logger, LoggerOptions, Pipeline, PipelineConfig, Retrier, RetryConfig,
    };
    pub use httpchain_core::async_trait;
}
