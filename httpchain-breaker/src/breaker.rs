//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: requests pass through, failures are counted
//! - Open: requests are refused until the open timeout elapses
//! - Half-Open: a single probe is let through to test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold
//! Open → Half-Open: after open timeout
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails
//! ```
//!
//! Every transition starts a new generation. Outcomes reported against an
//! older generation are dropped, so a slow call admitted before the circuit
//! opened cannot close it again.

use crate::config::BreakerConfig;
use httpchain_core::{ChainError, Result};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;
use tracing::{debug, info, warn};

static NEXT_BREAKER_ID: AtomicU64 = AtomicU64::new(1);

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Failing fast.
    Open,
    /// Testing recovery with a single probe.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        };
        f.write_str(s)
    }
}

/// Request and outcome counts for the current generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    /// Calls admitted.
    pub requests: u32,
    /// Successful outcomes.
    pub total_successes: u32,
    /// Failed outcomes.
    pub total_failures: u32,
    /// Successes since the last failure.
    pub consecutive_successes: u32,
    /// Failures since the last success.
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }
}

/// Admission handed out by [`CircuitBreaker::try_acquire`].
///
/// Report it back through [`CircuitBreaker::record`] or
/// [`CircuitBreaker::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    breaker: u64,
    generation: u64,
    probe: bool,
}

impl Ticket {
    /// Generation the call was admitted in.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether this call is the half-open probe.
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub(crate) fn breaker_id(&self) -> u64 {
        self.breaker
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    /// End of the current interval (closed) or open period (open).
    expiry: Option<Instant>,
    /// When the outstanding half-open probe was admitted.
    probe_since: Option<Instant>,
}

/// Shared circuit breaker.
///
/// Wrap it in an `Arc` and hand it to every
/// [`CircuitBreakerInterceptor`](crate::CircuitBreakerInterceptor) that
/// should share its state.
pub struct CircuitBreaker {
    id: u64,
    config: BreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a closed circuit breaker.
    pub fn new(config: BreakerConfig) -> Self {
        let now = Instant::now();
        let expiry = closed_expiry(&config, now);
        Self {
            id: NEXT_BREAKER_ID.fetch_add(1, Ordering::Relaxed),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry,
                probe_since: None,
            }),
        }
    }

    /// Get the config.
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Get the name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Current state, after applying elapsed timeouts.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner, Instant::now());
        inner.state
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner, Instant::now());
        inner.generation
    }

    /// Snapshot of the current counts.
    pub fn counts(&self) -> Counts {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner, Instant::now());
        inner.counts
    }

    /// Ask to let a call through.
    ///
    /// Fails with [`ChainError::CircuitOpen`] while open, and while half-open
    /// with the probe still outstanding.
    pub fn try_acquire(&self) -> Result<Ticket> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        self.refresh(&mut inner, now);

        let probe = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => return Err(ChainError::CircuitOpen),
            CircuitState::HalfOpen => {
                let abandoned = inner
                    .probe_since
                    .map_or(true, |since| now.duration_since(since) >= self.config.open_timeout);
                if !abandoned {
                    return Err(ChainError::CircuitOpen);
                }
                if inner.probe_since.is_some() {
                    debug!(breaker = %self.config.name, "Releasing abandoned probe slot");
                }
                inner.probe_since = Some(now);
                true
            }
        };

        inner.counts.on_request();
        Ok(Ticket {
            breaker: self.id,
            generation: inner.generation,
            probe,
        })
    }

    /// Report the status a call admitted with `ticket` received.
    pub fn record(&self, ticket: Ticket, status: u16) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        self.refresh(&mut inner, now);

        if ticket.breaker != self.id || ticket.generation != inner.generation {
            debug!(
                breaker = %self.config.name,
                ticket_generation = ticket.generation,
                generation = inner.generation,
                "Ignoring outcome from stale generation"
            );
            return;
        }

        if self.config.is_failure(status) {
            self.on_failure(&mut inner, now, status);
        } else {
            self.on_success(&mut inner, now);
        }
    }

    /// Give a ticket back without an outcome.
    ///
    /// A half-open probe slot is freed so the next call can probe.
    pub fn release(&self, ticket: Ticket) {
        let mut inner = self.inner.lock();
        if ticket.breaker == self.id
            && ticket.probe
            && ticket.generation == inner.generation
            && inner.state == CircuitState::HalfOpen
        {
            inner.probe_since = None;
        }
    }

    fn on_success(&self, inner: &mut BreakerState, now: Instant) {
        match inner.state {
            CircuitState::Closed => inner.counts.on_success(),
            CircuitState::HalfOpen => {
                inner.counts.on_success();
                self.transition(inner, CircuitState::Closed, now);
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, inner: &mut BreakerState, now: Instant, status: u16) {
        match inner.state {
            CircuitState::Closed => {
                inner.counts.on_failure();
                if inner.counts.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        breaker = %self.config.name,
                        status,
                        consecutive_failures = inner.counts.consecutive_failures,
                        "Failure threshold reached"
                    );
                    self.transition(inner, CircuitState::Open, now);
                }
            }
            CircuitState::HalfOpen => {
                inner.counts.on_failure();
                self.transition(inner, CircuitState::Open, now);
            }
            CircuitState::Open => {}
        }
    }

    /// Apply elapsed timeouts.
    fn refresh(&self, inner: &mut BreakerState, now: Instant) {
        let expired = inner.expiry.is_some_and(|expiry| now >= expiry);
        if !expired {
            return;
        }
        match inner.state {
            CircuitState::Closed => self.new_generation(inner, now),
            CircuitState::Open => self.transition(inner, CircuitState::HalfOpen, now),
            CircuitState::HalfOpen => {}
        }
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState, now: Instant) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        self.new_generation(inner, now);
        info!(
            breaker = %self.config.name,
            %from,
            %to,
            generation = inner.generation,
            "Circuit breaker state changed"
        );
    }

    fn new_generation(&self, inner: &mut BreakerState, now: Instant) {
        inner.generation = inner.generation.wrapping_add(1);
        inner.counts = Counts::default();
        inner.probe_since = None;
        inner.expiry = match inner.state {
            CircuitState::Closed => closed_expiry(&self.config, now),
            CircuitState::Open => Some(now + self.config.open_timeout),
            CircuitState::HalfOpen => None,
        };
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.config.name)
            .field("state", &inner.state)
            .field("generation", &inner.generation)
            .field("counts", &inner.counts)
            .finish()
    }
}

fn closed_expiry(config: &BreakerConfig, now: Instant) -> Option<Instant> {
    (!config.interval.is_zero()).then(|| now + config.interval)
}
