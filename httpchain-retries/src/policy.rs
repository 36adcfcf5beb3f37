//! Retry decision policies.

use httpchain_core::{ChainError, HttpResponse, Result};

/// Bookkeeping handed to a decider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    /// How many times this call has been evaluated, starting at 1.
    pub retry_count: u32,
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait, then replay the request.
    Retry,
    /// Keep the current outcome.
    Stop,
    /// The outcome is a failure but the retry budget is spent.
    Exhausted,
}

/// Decides whether a call should be retried.
///
/// Returning `Err` is a hook failure: it stops the chain and is not retried.
pub trait RetryDecider: Send + Sync {
    /// Inspect the latest outcome.
    fn decide(
        &self,
        response: Option<&HttpResponse>,
        error: Option<&ChainError>,
        state: &RetryState,
    ) -> Result<RetryDecision>;
}

/// Retries every failure up to `max_retries` times.
///
/// A failure is a retryable error or a response with status >= 400.
#[derive(Debug, Clone, Copy)]
pub struct RetryAll {
    /// Maximum number of retries.
    pub max_retries: u32,
}

impl RetryAll {
    /// Create a new retry-all policy.
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }
}

impl Default for RetryAll {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RetryDecider for RetryAll {
    fn decide(
        &self,
        response: Option<&HttpResponse>,
        error: Option<&ChainError>,
        state: &RetryState,
    ) -> Result<RetryDecision> {
        let failed = match error {
            Some(err) => err.is_retryable(),
            None => response.is_some_and(|r| r.status_code() >= 400),
        };

        Ok(if !failed {
            RetryDecision::Stop
        } else if state.retry_count > self.max_retries {
            RetryDecision::Exhausted
        } else {
            RetryDecision::Retry
        })
    }
}

/// Retries transport failures and specific status codes.
#[derive(Debug, Clone)]
pub struct StatusCodePolicy {
    /// Status codes to retry.
    pub codes: Vec<u16>,
    /// Maximum number of retries.
    pub max_retries: u32,
}

impl StatusCodePolicy {
    /// Create a new status code policy.
    pub fn new(codes: Vec<u16>, max_retries: u32) -> Self {
        Self { codes, max_retries }
    }

    /// Create for server errors (5xx).
    pub fn server_errors(max_retries: u32) -> Self {
        Self::new((500..=599).collect(), max_retries)
    }

    /// Create for rate limits.
    pub fn rate_limit(max_retries: u32) -> Self {
        Self::new(vec![429], max_retries)
    }
}

impl RetryDecider for StatusCodePolicy {
    fn decide(
        &self,
        response: Option<&HttpResponse>,
        error: Option<&ChainError>,
        state: &RetryState,
    ) -> Result<RetryDecision> {
        let status = error
            .and_then(ChainError::status_code)
            .or_else(|| response.map(HttpResponse::status_code));

        let failed = match (error, status) {
            (_, Some(status)) if status >= 400 => self.codes.contains(&status),
            (Some(err), _) => err.is_transport(),
            _ => false,
        };

        Ok(if !failed {
            RetryDecision::Stop
        } else if state.retry_count > self.max_retries {
            RetryDecision::Exhausted
        } else {
            RetryDecision::Retry
        })
    }
}
