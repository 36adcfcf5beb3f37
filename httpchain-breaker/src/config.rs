//! Circuit breaker configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Predicate deciding whether a status code counts as a failure.
pub type TripPredicate = Arc<dyn Fn(u16) -> bool + Send + Sync>;

/// Configuration for a [`CircuitBreaker`](crate::CircuitBreaker).
///
/// The defaults describe a breaker that opens on the first `429` and stays
/// open for 20 seconds.
#[derive(Clone)]
pub struct BreakerConfig {
    /// Name used in log events.
    pub name: String,
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before letting a probe through.
    pub open_timeout: Duration,
    /// Period after which closed-state counts are cleared. Zero never clears.
    pub interval: Duration,
    /// Which statuses count as failures.
    pub trip_on: TripPredicate,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            name: "default".into(),
            failure_threshold: 1,
            open_timeout: Duration::from_secs(20),
            interval: Duration::from_secs(10),
            trip_on: Arc::new(|status| status == 429),
        }
    }
}

impl BreakerConfig {
    /// Create a new default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the failure threshold. Values below 1 are treated as 1.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Set the open timeout.
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Set the counting interval.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Count statuses matching `predicate` as failures.
    pub fn trip_on(mut self, predicate: impl Fn(u16) -> bool + Send + Sync + 'static) -> Self {
        self.trip_on = Arc::new(predicate);
        self
    }

    /// Count exactly these statuses as failures.
    pub fn trip_on_statuses(self, statuses: impl IntoIterator<Item = u16>) -> Self {
        let statuses: Vec<u16> = statuses.into_iter().collect();
        self.trip_on(move |status| statuses.contains(&status))
    }

    /// Count every server error as a failure.
    pub fn trip_on_server_errors(self) -> Self {
        self.trip_on(|status| status >= 500)
    }

    pub(crate) fn is_failure(&self, status: u16) -> bool {
        (self.trip_on)(status)
    }
}

impl fmt::Debug for BreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerConfig")
            .field("name", &self.name)
            .field("failure_threshold", &self.failure_threshold)
            .field("open_timeout", &self.open_timeout)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
