//! # httpchain-breaker
//!
//! Circuit breaking for httpchain.
//!
//! A [`CircuitBreaker`] is a long-lived shared state machine. Wrap it in an
//! `Arc` and register a [`CircuitBreakerInterceptor`] on every chain that
//! talks to the protected backend.
//!
//! ## Example
//!
//! ```ignore
//! use httpchain_breaker::{BreakerConfig, CircuitBreaker, CircuitBreakerInterceptor};
//! use std::sync::Arc;
//!
//! let breaker = Arc::new(CircuitBreaker::new(BreakerConfig::default()));
//! chain.add_interceptor(CircuitBreakerInterceptor::new(breaker.clone(), true));
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod breaker;
pub mod config;
pub mod interceptor;

// Re-exports
pub use breaker::{CircuitBreaker, CircuitState, Counts, Ticket};
pub use config::{BreakerConfig, TripPredicate};
pub use interceptor::CircuitBreakerInterceptor;
