//! # httpchain-interceptors
//!
//! Stock interceptors for httpchain.
//!
//! - **[`Authenticator`]**: Adds a bearer token to every request
//! - **[`Logger`]**: Logs requests and responses without consuming bodies
//! - **[`ErrorClassifier`]**: Turns failed responses into [`ChainError::Status`]
//!
//! [`ChainError::Status`]: httpchain_core::ChainError::Status

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod auth;
pub mod classify;
pub mod logger;

// Re-exports
pub use auth::Authenticator;
pub use classify::{ErrorClassifier, ErrorDetector, StatusErrorDetector};
pub use logger::{
    LogSink, Logger, LoggerOptions, TracingSink, DEFAULT_MAX_BODY_LOG_SIZE, TRUNCATED_MARKER,
};
