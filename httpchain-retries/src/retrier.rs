//! The retry interceptor.
//!
//! Retries are driven by an explicit loop owned by the top-level pass of a
//! call. Each iteration bumps the attempt counter for the correlation id,
//! asks the decider, waits out the backoff, and replays the pristine request
//! through the full chain. Replays carry the same id but are marked as
//! replays, and a Retrier seeing a replay pass leaves it alone, so retries
//! never nest.
//!
//! ```text
//! no-error --failure--> evaluating --Retry--> waiting --> retrying --+
//!     ^                     |  |                                     |
//!     |                     |  +--Exhausted--> exhausted (Err)       |
//!     +-------Stop----------+<---------------------------------------+
//! ```

use crate::backoff::BackoffStrategy;
use crate::config::RetryConfig;
use crate::policy::{RetryAll, RetryDecider, RetryDecision, RetryState};
use crate::store::AttemptStore;
use async_trait::async_trait;
use httpchain_core::{CallContext, ChainError, Interceptor, Replay, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// Interceptor that retries failed calls with backoff.
///
/// Register it after the interceptors whose errors it should react to
/// (error classification, circuit breaking).
pub struct Retrier {
    backoff: Arc<dyn BackoffStrategy>,
    decider: Arc<dyn RetryDecider>,
    store: Arc<AttemptStore>,
    replay: Option<Arc<dyn Replay>>,
}

impl Retrier {
    /// Create a retrier with its own attempt store.
    pub fn new(
        backoff: impl BackoffStrategy + 'static,
        decider: impl RetryDecider + 'static,
    ) -> Self {
        Self {
            backoff: Arc::new(backoff),
            decider: Arc::new(decider),
            store: Arc::new(AttemptStore::default()),
            replay: None,
        }
    }

    /// Create a retrier from a config, retrying every failure.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.wait.clone(), RetryAll::new(config.max_retries)).with_store(Arc::new(
            AttemptStore::new(config.idle_ttl, config.sweep_interval),
        ))
    }

    /// Replay through this capability instead of the executing chain.
    #[must_use]
    pub fn with_replay(mut self, replay: Arc<dyn Replay>) -> Self {
        self.replay = Some(replay);
        self
    }

    /// Use a specific attempt store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<AttemptStore>) -> Self {
        self.store = store;
        self
    }

    /// Get the attempt store.
    pub fn store(&self) -> &Arc<AttemptStore> {
        &self.store
    }

    async fn retry_loop(&self, ctx: &mut CallContext) -> Result<()> {
        let replay = self
            .replay
            .clone()
            .or_else(|| ctx.replay())
            .ok_or_else(|| ChainError::Configuration("retrier has no replay capability".into()))?;

        let outcome = self.drive(ctx, replay.as_ref()).await;
        self.store.forget(ctx.id());
        outcome
    }

    async fn drive(&self, ctx: &mut CallContext, replay: &dyn Replay) -> Result<()> {
        loop {
            let retry_count = self.store.increment(ctx.id());
            let state = RetryState { retry_count };
            let decision = self
                .decider
                .decide(ctx.response.as_ref(), ctx.error.as_ref(), &state)?;

            match decision {
                RetryDecision::Stop => return Ok(()),
                RetryDecision::Exhausted => {
                    let err = ctx.error.take().unwrap_or(ChainError::AttemptsExhausted {
                        attempts: retry_count - 1,
                    });
                    warn!(
                        correlation_id = %ctx.id(),
                        retries = retry_count - 1,
                        error = %err,
                        "Retry exhausted"
                    );
                    return Err(err);
                }
                RetryDecision::Retry => {
                    let wait = self.backoff.time_to_wait(retry_count);
                    debug!(
                        correlation_id = %ctx.id(),
                        attempt = retry_count,
                        wait_ms = wait.as_millis() as u64,
                        status = ctx.status_code(),
                        error = ctx.error.as_ref().map(tracing::field::display),
                        "Waiting before retry"
                    );
                    ctx.scope().sleep(wait).await?;

                    let outcome = replay
                        .perform_with_correlation_id(
                            ctx.pristine_request().clone(),
                            ctx.id().clone(),
                            ctx.scope().clone(),
                        )
                        .await;
                    match outcome {
                        Ok(response) => {
                            ctx.response = Some(response);
                            ctx.error = None;
                        }
                        Err(err) if err.is_cancellation() => return Err(err),
                        Err(err) => {
                            ctx.response = None;
                            ctx.error = Some(err);
                        }
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Retrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retrier")
            .field("store", &self.store)
            .field("has_replay", &self.replay.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Interceptor for Retrier {
    fn name(&self) -> &'static str {
        "retrier"
    }

    async fn before_request(&self, ctx: &mut CallContext) -> Result<()> {
        if ctx.is_replay() || !ctx.has_error() {
            return Ok(());
        }

        self.retry_loop(ctx).await?;
        match ctx.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn after_response(&self, ctx: &mut CallContext) -> Result<()> {
        if ctx.is_replay() {
            return Ok(());
        }
        self.retry_loop(ctx).await
    }
}
