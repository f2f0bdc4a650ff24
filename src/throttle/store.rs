use crate::clock::{Clock, SystemClock};
use crate::error::CacheError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Bound on each cache call before the throttle gives up and admits.
pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_millis(100);

/// Storage contract for throttle windows.
///
/// Implementations only need plain get and set; no atomicity is assumed. A pipeline
/// configured without a cache does not throttle at all.
#[async_trait]
pub trait ThrottleCache: Send + Sync {
    /// Fetch the stored history (timestamps in seconds, most recent first).
    async fn get(&self, key: &str) -> Result<Option<Vec<f64>>, CacheError>;

    /// Overwrite the history, expiring it after `ttl`.
    async fn set(&self, key: &str, history: Vec<f64>, ttl: Duration) -> Result<(), CacheError>;
}

/// Seconds between sweeps of expired entries.
const SWEEP_INTERVAL_SECS: f64 = 1.0;

/// Simple in-memory cache. Entries expire against the injected clock.
///
/// Expired entries are dropped when read, and `set` sweeps the whole map at most once
/// per second so keys that are never read again do not accumulate.
#[derive(Clone, Debug)]
pub struct InMemoryCache {
    data: Arc<Mutex<Entries>>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Default)]
struct Entries {
    // key -> (history, expires_at_secs)
    map: HashMap<String, (Vec<f64>, f64)>,
    next_sweep: f64,
}

impl Entries {
    fn sweep(&mut self, now: f64) {
        if now < self.next_sweep {
            return;
        }
        self.map.retain(|_, (_, expires)| *expires > now);
        self.next_sweep = now + SWEEP_INTERVAL_SECS;
    }
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { data: Arc::default(), clock }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now_secs();
        self.data
            .lock()
            .map(|guard| guard.map.values().filter(|(_, expires)| *expires > now).count())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> CacheError {
    CacheError::Backend("in-memory cache lock poisoned".into())
}

#[async_trait]
impl ThrottleCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<f64>>, CacheError> {
        let now = self.clock.now_secs();
        let mut guard = self.data.lock().map_err(poisoned)?;
        match guard.map.get(key) {
            Some((history, expires)) if *expires > now => Ok(Some(history.clone())),
            Some(_) => {
                guard.map.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, history: Vec<f64>, ttl: Duration) -> Result<(), CacheError> {
        let now = self.clock.now_secs();
        let mut guard = self.data.lock().map_err(poisoned)?;
        guard.sweep(now);
        guard.map.insert(key.to_string(), (history, now + ttl.as_secs_f64()));
        Ok(())
    }
}

/// A cache paired with the clock that stamps its entries and a per-call timeout.
#[derive(Clone)]
pub struct ThrottleBackend {
    cache: Arc<dyn ThrottleCache>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl ThrottleBackend {
    pub fn new(cache: Arc<dyn ThrottleCache>) -> Self {
        Self { cache, clock: Arc::new(SystemClock), timeout: DEFAULT_CACHE_TIMEOUT }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn cache(&self) -> &Arc<dyn ThrottleCache> {
        &self.cache
    }

    pub(crate) fn now(&self) -> f64 {
        self.clock.now_secs()
    }

    pub(crate) async fn get(&self, key: &str) -> Result<Option<Vec<f64>>, CacheError> {
        tokio::time::timeout(self.timeout, self.cache.get(key))
            .await
            .map_err(|_| CacheError::Timeout(self.timeout))?
    }

    pub(crate) async fn set(
        &self,
        key: &str,
        history: Vec<f64>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        tokio::time::timeout(self.timeout, self.cache.set(key, history, ttl))
            .await
            .map_err(|_| CacheError::Timeout(self.timeout))?
    }
}

impl std::fmt::Debug for ThrottleBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottleBackend")
            .field("clock", &self.clock)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
