//! Interceptor guarding calls with a shared [`CircuitBreaker`].

use crate::breaker::{CircuitBreaker, Ticket};
use async_trait::async_trait;
use httpchain_core::{CallContext, Interceptor, Result};
use std::sync::Arc;
use tracing::debug;

/// Tickets held by the current call, one per breaker.
///
/// A call that ends before its after phase (cancelled, past its deadline,
/// or aborted by another hook) drops its context with tickets still held;
/// they are released here so a half-open probe slot is not lost.
#[derive(Debug, Default)]
struct HeldTickets(Vec<(Arc<CircuitBreaker>, Ticket)>);

impl Drop for HeldTickets {
    fn drop(&mut self) {
        for (breaker, ticket) in self.0.drain(..) {
            breaker.release(ticket);
        }
    }
}

/// Refuses calls while the circuit is open and reports outcomes.
///
/// With `abort_on_open` a refused call fails immediately. Without it, the
/// refusal is stored as the call's error and the chain carries on, so a
/// later retrier can wait the circuit out.
#[derive(Debug, Clone)]
pub struct CircuitBreakerInterceptor {
    breaker: Arc<CircuitBreaker>,
    abort_on_open: bool,
}

impl CircuitBreakerInterceptor {
    /// Create a new interceptor around a shared breaker.
    pub fn new(breaker: Arc<CircuitBreaker>, abort_on_open: bool) -> Self {
        Self {
            breaker,
            abort_on_open,
        }
    }

    /// Get the breaker.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Check whether refused calls fail immediately.
    pub fn aborts_on_open(&self) -> bool {
        self.abort_on_open
    }
}

#[async_trait]
impl Interceptor for CircuitBreakerInterceptor {
    fn name(&self) -> &'static str {
        "circuit_breaker"
    }

    async fn before_request(&self, ctx: &mut CallContext) -> Result<()> {
        match self.breaker.try_acquire() {
            Ok(ticket) => {
                let entry = (self.breaker.clone(), ticket);
                match ctx.extensions.get_mut::<HeldTickets>() {
                    Some(held) => held.0.push(entry),
                    None => {
                        ctx.extensions.insert(HeldTickets(vec![entry]));
                    }
                }
                Ok(())
            }
            Err(err) => {
                debug!(
                    correlation_id = %ctx.id(),
                    breaker = %self.breaker.name(),
                    abort = self.abort_on_open,
                    "Circuit refused call"
                );
                if self.abort_on_open {
                    Err(err)
                } else {
                    ctx.error = Some(err);
                    Ok(())
                }
            }
        }
    }

    async fn after_response(&self, ctx: &mut CallContext) -> Result<()> {
        let Some(held) = ctx.extensions.get_mut::<HeldTickets>() else {
            return Ok(());
        };
        let Some(pos) = held
            .0
            .iter()
            .position(|(_, ticket)| ticket.breaker_id() == self.breaker.id())
        else {
            return Ok(());
        };
        let (_, ticket) = held.0.swap_remove(pos);

        match ctx.response.as_ref() {
            Some(response) => self.breaker.record(ticket, response.status_code()),
            None => self.breaker.release(ticket),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::CircuitState;
    use crate::config::BreakerConfig;
    use httpchain_core::{
        CallOptions, CallScope, Chain, ChainError, HttpRequest, MockTransport,
    };
    use std::time::Duration;
    use tokio::time::advance;

    fn request() -> HttpRequest {
        HttpRequest::get("https://api.example.com/v1/servers").unwrap()
    }

    fn shared_breaker(threshold: u32) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            BreakerConfig::new()
                .failure_threshold(threshold)
                .open_timeout(Duration::from_secs(20))
                .interval(Duration::ZERO),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_opens_circuit_and_aborts() {
        let transport = MockTransport::new().reply(429, "slow down");
        let breaker = shared_breaker(1);
        let chain = Chain::new(transport.clone());
        chain.add_interceptor(CircuitBreakerInterceptor::new(breaker.clone(), true));

        let response = chain.execute(request()).await.unwrap();
        assert_eq!(response.status_code(), 429);
        assert_eq!(breaker.state(), CircuitState::Open);

        let err = chain.execute(request()).await.unwrap_err();
        assert!(matches!(err, ChainError::CircuitOpen));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_continue_mode_sets_error_and_runs_later_hooks() {
        struct Seen(Arc<parking_lot::Mutex<Vec<String>>>);

        #[async_trait]
        impl Interceptor for Seen {
            async fn before_request(&self, ctx: &mut CallContext) -> Result<()> {
                let seen = ctx.error.as_ref().map(ToString::to_string).unwrap_or_default();
                self.0.lock().push(seen);
                Ok(())
            }
        }

        let transport = MockTransport::new().reply(429, "");
        let breaker = shared_breaker(1);
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let chain = Chain::new(transport.clone());
        chain.add_interceptor(CircuitBreakerInterceptor::new(breaker, false));
        chain.add_interceptor(Seen(seen.clone()));

        chain.execute(request()).await.unwrap();
        let err = chain.execute(request()).await.unwrap_err();

        assert!(matches!(err, ChainError::CircuitOpen));
        assert_eq!(transport.calls(), 1);
        assert_eq!(
            *seen.lock(),
            vec![String::new(), "circuit breaker is open".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_success_closes_circuit() {
        let transport = MockTransport::new().reply(429, "").reply(200, "ok");
        let breaker = shared_breaker(1);
        let chain = Chain::new(transport.clone());
        chain.add_interceptor(CircuitBreakerInterceptor::new(breaker.clone(), true));

        chain.execute(request()).await.unwrap();
        assert!(chain.execute(request()).await.is_err());

        advance(Duration::from_secs(20)).await;
        let response = chain.execute(request()).await.unwrap();
        assert_eq!(response.status_code(), 200);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_half_open_lets_one_probe_through() {
        let transport = MockTransport::new()
            .reply(429, "")
            .with_latency(Duration::from_millis(100));
        let breaker = shared_breaker(1);
        let chain = Chain::new(transport.clone());
        chain.add_interceptor(CircuitBreakerInterceptor::new(breaker.clone(), true));

        chain.execute(request()).await.unwrap();
        advance(Duration::from_secs(20)).await;

        let calls: Vec<_> = (0..5)
            .map(|_| {
                let chain = chain.clone();
                tokio::spawn(async move { chain.execute(request()).await })
            })
            .collect();
        let results = futures::future::join_all(calls).await;

        let admitted = results
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(_))))
            .count();
        assert_eq!(admitted, 1);
        assert_eq!(transport.calls(), 2);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_is_not_counted() {
        let transport = MockTransport::new().fail("refused").fail("refused");
        let breaker = shared_breaker(1);
        let chain = Chain::new(transport);
        chain.add_interceptor(CircuitBreakerInterceptor::new(breaker.clone(), true));

        assert!(chain.execute(request()).await.is_err());
        assert!(chain.execute(request()).await.is_err());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.counts().total_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breakers_sharing_a_chain_keep_separate_tickets() {
        let transport = MockTransport::new().reply(503, "");
        let rate_limits = shared_breaker(1);
        let outages = Arc::new(CircuitBreaker::new(
            BreakerConfig::new().trip_on_server_errors().interval(Duration::ZERO),
        ));
        let chain = Chain::new(transport);
        chain.add_interceptor(CircuitBreakerInterceptor::new(rate_limits.clone(), true));
        chain.add_interceptor(CircuitBreakerInterceptor::new(outages.clone(), true));

        chain.execute(request()).await.unwrap();
        assert_eq!(rate_limits.state(), CircuitState::Closed);
        assert_eq!(rate_limits.counts().total_successes, 1);
        assert_eq!(outages.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_call_past_deadline_frees_slot() {
        let breaker = shared_breaker(1);
        let fast = MockTransport::new().reply(429, "").reply(200, "ok");
        let fast_chain = Chain::new(fast.clone());
        fast_chain.add_interceptor(CircuitBreakerInterceptor::new(breaker.clone(), true));
        let slow_chain = Chain::new(MockTransport::new().with_latency(Duration::from_secs(30)));
        slow_chain.add_interceptor(CircuitBreakerInterceptor::new(breaker.clone(), true));

        fast_chain.execute(request()).await.unwrap();
        advance(Duration::from_secs(20)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let options =
            CallOptions::new().scope(CallScope::new().with_timeout(Duration::from_millis(100)));
        let err = slow_chain.execute_with(request(), options).await.unwrap_err();
        assert!(matches!(err, ChainError::DeadlineExceeded));

        let response = fast_chain.execute(request()).await.unwrap();
        assert_eq!(response.status_code(), 200);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_call_aborted_by_later_hook_frees_slot() {
        struct Reject;

        #[async_trait]
        impl Interceptor for Reject {
            async fn before_request(&self, _ctx: &mut CallContext) -> Result<()> {
                Err(ChainError::interceptor("reject", "no"))
            }
        }

        let breaker = shared_breaker(1);
        let transport = MockTransport::new().reply(429, "").reply(200, "ok");
        let chain = Chain::new(transport.clone());
        chain.add_interceptor(CircuitBreakerInterceptor::new(breaker.clone(), true));
        let rejecting = Chain::new(MockTransport::new());
        rejecting.add_interceptor(CircuitBreakerInterceptor::new(breaker.clone(), true));
        rejecting.add_interceptor(Reject);

        chain.execute(request()).await.unwrap();
        advance(Duration::from_secs(20)).await;

        let err = rejecting.execute(request()).await.unwrap_err();
        assert!(matches!(err, ChainError::Interceptor { .. }));

        chain.execute(request()).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(transport.calls(), 2);
    }
}
