//! Attempt counters keyed by correlation id.
//!
//! Entries expire after a period without access. Expired entries are dropped
//! lazily when touched, and a full sweep runs at most once per sweep interval
//! on the next access after it elapses.

use httpchain_core::CorrelationId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Default idle lifetime of an entry.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(60);

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy)]
struct AttemptRecord {
    attempts: u32,
    touched: Instant,
}

#[derive(Debug)]
struct StoreInner {
    records: HashMap<CorrelationId, AttemptRecord>,
    last_sweep: Instant,
}

/// Thread-safe attempt counters with idle expiry.
#[derive(Debug)]
pub struct AttemptStore {
    inner: Mutex<StoreInner>,
    idle_ttl: Duration,
    sweep_interval: Duration,
}

impl Default for AttemptStore {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_TTL, DEFAULT_SWEEP_INTERVAL)
    }
}

impl AttemptStore {
    /// Create a store.
    pub fn new(idle_ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                records: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            idle_ttl,
            sweep_interval,
        }
    }

    /// Increment the counter for `id` and return the new value.
    ///
    /// The first call for an id (or the first after it expired) returns 1.
    pub fn increment(&self, id: &CorrelationId) -> u32 {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        self.maybe_sweep(&mut inner, now);

        let idle_ttl = self.idle_ttl;
        let record = inner
            .records
            .entry(id.clone())
            .or_insert(AttemptRecord {
                attempts: 0,
                touched: now,
            });
        if now.duration_since(record.touched) > idle_ttl {
            record.attempts = 0;
        }
        record.attempts = record.attempts.saturating_add(1);
        record.touched = now;
        record.attempts
    }

    /// Current counter for `id`, if it has a live entry.
    pub fn get(&self, id: &CorrelationId) -> Option<u32> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let live = inner
            .records
            .get(id)
            .map(|record| (record.attempts, now.duration_since(record.touched) <= self.idle_ttl));
        match live {
            Some((attempts, true)) => Some(attempts),
            Some((_, false)) => {
                inner.records.remove(id);
                None
            }
            None => None,
        }
    }

    /// Drop the entry for `id`.
    pub fn forget(&self, id: &CorrelationId) {
        self.inner.lock().records.remove(id);
    }

    /// Drop every expired entry now, returning how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        Self::sweep_locked(&mut inner, now, self.idle_ttl)
    }

    /// Number of entries held, expired or not.
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Check whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }

    fn maybe_sweep(&self, inner: &mut StoreInner, now: Instant) {
        if now.duration_since(inner.last_sweep) >= self.sweep_interval {
            Self::sweep_locked(inner, now, self.idle_ttl);
        }
    }

    fn sweep_locked(inner: &mut StoreInner, now: Instant, idle_ttl: Duration) -> usize {
        let before = inner.records.len();
        inner
            .records
            .retain(|_, record| now.duration_since(record.touched) <= idle_ttl);
        inner.last_sweep = now;

        let removed = before - inner.records.len();
        if removed > 0 {
            trace!(removed, "Swept expired attempt records");
        }
        removed
    }
}
