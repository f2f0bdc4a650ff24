//! Clock abstractions used by the sliding-window throttle and the in-memory cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Clock abstraction so timing can be faked in tests.
///
/// Timestamps are seconds since the UNIX epoch. They end up in a shared cache, so they
/// must be comparable across processes; a monotonic `Instant` is not.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_secs(&self) -> f64;
}

/// Wall clock backed by `SystemTime::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> f64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or_default()
    }
}

/// Manually driven clock with millisecond resolution. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    /// Start at `secs` since the epoch.
    pub fn new(secs: f64) -> Self {
        let clock = Self::default();
        clock.set(secs);
        clock
    }

    /// Jump to an absolute time.
    pub fn set(&self, secs: f64) {
        self.millis.store((secs.max(0.0) * 1000.0) as u64, Ordering::SeqCst);
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: Duration) {
        let delta = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.millis.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> f64 {
        self.millis.load(Ordering::SeqCst) as f64 / 1000.0
    }
}
