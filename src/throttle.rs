//! Sliding-window request throttling.
//!
//! This module provides the building blocks for throttling:
//! - [`Rate`]: a parsed `"<count>/<unit>"` budget.
//! - [`ThrottleKey`]: how a request maps to a cache key (anonymous IP, user id, ...).
//! - [`Throttle`]: one scope, pairing a keying strategy with a rate.
//! - [`ThrottleCache`]: the two-call storage contract the window lives in.
//!
//! # Algorithm
//!
//! Each key stores the timestamps of its admitted requests, most recent first. On every
//! check the tail is pruned of entries older than the window; if what remains fills the
//! budget the request is denied and storage is left alone, otherwise `now` is pushed on
//! the front and written back with a TTL of one window.
//!
//! # Consistency
//!
//! The read-modify-write is not atomic. Two requests racing on one key can both read the
//! same history and both be admitted, so a scope may over-admit under contention. It never
//! under-admits. Throttling also fails open: with no cache configured, or when the cache
//! errors or times out, requests are admitted.

use crate::error::{CacheError, ConfigError};
use crate::request::RequestContext;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub mod store;
pub mod strategies;
pub use store::{InMemoryCache, ThrottleBackend, ThrottleCache, DEFAULT_CACHE_TIMEOUT};
pub use strategies::{AnonRateThrottle, UserRateThrottle};

/// Request budget: at most `num_requests` per `duration_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    num_requests: u64,
    duration_secs: u64,
}

impl Rate {
    pub fn new(num_requests: u64, duration_secs: u64) -> Self {
        Self { num_requests, duration_secs }
    }

    /// Parse `"<count>/<unit>"`. Only the first character of the unit counts, so
    /// `"10/minute"` and `"10/m"` are the same rate.
    pub fn parse(rate: &str) -> Result<Self, ConfigError> {
        let invalid = |reason| ConfigError::InvalidRate { rate: rate.to_string(), reason };
        let (num, period) = rate.split_once('/').ok_or_else(|| invalid("expected <count>/<unit>"))?;
        let num_requests =
            num.trim().parse::<u64>().map_err(|_| invalid("count is not a non-negative integer"))?;
        let duration_secs = match period.trim().chars().next() {
            Some('s') => 1,
            Some('m') => 60,
            Some('h') => 3600,
            Some('d') => 86400,
            _ => return Err(invalid("unit must start with s, m, h or d")),
        };
        Ok(Self { num_requests, duration_secs })
    }

    pub fn num_requests(&self) -> u64 {
        self.num_requests
    }

    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Drop tail entries that have left the window ending at `now`.
    pub fn prune(&self, history: &mut Vec<f64>, now: f64) {
        let horizon = now - self.duration_secs as f64;
        while history.last().is_some_and(|&oldest| oldest <= horizon) {
            history.pop();
        }
    }

    /// True when a pruned history leaves room for one more request.
    pub fn has_capacity(&self, history: &[f64]) -> bool {
        (history.len() as u64) < self.num_requests
    }

    /// Estimated wait until the next admission, or `None` when a request would be
    /// admitted now. `history` must already be pruned.
    pub fn wait(&self, history: &[f64], now: f64) -> Option<Duration> {
        if self.has_capacity(history) {
            return None;
        }
        let window = self.duration_secs as f64;
        let remaining = match history.last() {
            Some(&oldest) => window - (now - oldest),
            None => window,
        };
        let available = (self.num_requests + 1).saturating_sub(history.len() as u64).max(1);
        let secs = remaining / available as f64;
        Some(if secs.is_finite() && secs > 0.0 {
            Duration::from_secs_f64(secs)
        } else {
            Duration::ZERO
        })
    }
}

impl FromStr for Rate {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}s", self.num_requests, self.duration_secs)
    }
}

/// Maps a request to the cache key of its window.
pub trait ThrottleKey: Send + Sync {
    /// Unique name of this strategy.
    fn name(&self) -> &'static str;

    /// Key for `scope`, or `None` when this strategy does not govern the request.
    fn cache_key(&self, scope: &str, ctx: &RequestContext) -> Option<String>;
}

/// Outcome of a throttle check.
#[derive(Debug, Clone, PartialEq)]
pub enum ThrottleDecision {
    /// The request fits the budget.
    Allowed,
    /// The budget is exhausted.
    Denied {
        /// Estimated time until the next admission. Useful for `Retry-After`.
        wait: Option<Duration>,
    },
}

impl ThrottleDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, ThrottleDecision::Allowed)
    }
}

/// One throttle scope: a named bucket with a keying strategy and an optional rate.
///
/// A scope without a rate is inert.
#[derive(Clone)]
pub struct Throttle {
    scope: String,
    key: Arc<dyn ThrottleKey>,
    rate: Option<Rate>,
}

impl Throttle {
    pub fn new(scope: impl Into<String>, key: Arc<dyn ThrottleKey>, rate: Option<Rate>) -> Self {
        Self { scope: scope.into(), key, rate }
    }

    /// Anonymous-only scope named `anon`.
    pub fn anon(rate: Rate) -> Self {
        Self::new(AnonRateThrottle::SCOPE, Arc::new(AnonRateThrottle), Some(rate))
    }

    /// Every-caller scope named `user`.
    pub fn user(rate: Rate) -> Self {
        Self::new(UserRateThrottle::SCOPE, Arc::new(UserRateThrottle), Some(rate))
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn rate(&self) -> Option<Rate> {
        self.rate
    }

    /// Name of the keying strategy.
    pub fn strategy(&self) -> &'static str {
        self.key.name()
    }

    /// Key this scope would use for the request.
    pub fn cache_key(&self, ctx: &RequestContext) -> Option<String> {
        self.key.cache_key(&self.scope, ctx)
    }

    /// Check the request against this scope and record it when admitted.
    pub async fn allow_request(
        &self,
        ctx: &RequestContext,
        backend: Option<&ThrottleBackend>,
    ) -> ThrottleDecision {
        let (Some(backend), Some(rate)) = (backend, self.rate) else {
            return ThrottleDecision::Allowed;
        };
        let Some(key) = self.cache_key(ctx) else {
            tracing::debug!(scope = %self.scope, "no throttle key for request");
            return ThrottleDecision::Allowed;
        };

        let now = backend.now();
        let mut history = match backend.get(&key).await {
            Ok(history) => history.unwrap_or_default(),
            Err(err) => return fail_open(&self.scope, &key, &err),
        };
        rate.prune(&mut history, now);

        if !rate.has_capacity(&history) {
            let wait = rate.wait(&history, now);
            tracing::warn!(scope = %self.scope, key = %key, rate = %rate, "request throttled");
            return ThrottleDecision::Denied { wait };
        }

        history.insert(0, now);
        if let Err(err) = backend.set(&key, history, rate.duration()).await {
            return fail_open(&self.scope, &key, &err);
        }
        ThrottleDecision::Allowed
    }

    /// Estimated wait for the request's key without recording anything.
    pub async fn wait(
        &self,
        ctx: &RequestContext,
        backend: Option<&ThrottleBackend>,
    ) -> Option<Duration> {
        let (backend, rate) = (backend?, self.rate?);
        let key = self.cache_key(ctx)?;
        let now = backend.now();
        let mut history = backend.get(&key).await.ok()?.unwrap_or_default();
        rate.prune(&mut history, now);
        rate.wait(&history, now)
    }
}

impl fmt::Debug for Throttle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttle")
            .field("scope", &self.scope)
            .field("strategy", &self.key.name())
            .field("rate", &self.rate)
            .finish()
    }
}

fn fail_open(scope: &str, key: &str, err: &CacheError) -> ThrottleDecision {
    tracing::warn!(scope, key, error = %err, "throttle cache unavailable, admitting request");
    ThrottleDecision::Allowed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_maps_units_to_seconds() {
        for (unit, secs) in [("s", 1), ("m", 60), ("h", 3600), ("d", 86400)] {
            let rate = Rate::parse(&format!("7/{unit}")).unwrap();
            assert_eq!(rate, Rate::new(7, secs));
        }
        assert_eq!("100/day".parse::<Rate>().unwrap(), Rate::new(100, 86400));
        assert_eq!(Rate::parse("1/minute").unwrap().duration(), Duration::from_secs(60));
    }

    #[test]
    fn parse_rejects_malformed_rates() {
        for bad in ["10", "10/w", "10/", "x/s", "-1/s", ""] {
            let err = Rate::parse(bad).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidRate { .. }), "{bad}: {err}");
        }
    }

    #[test]
    fn prune_trims_tail_only() {
        let rate = Rate::new(10, 60);
        let mut history = vec![100.0, 90.0, 41.0, 40.0, 10.0];
        rate.prune(&mut history, 100.0);
        assert_eq!(history, vec![100.0, 90.0, 41.0]);
    }

    #[test]
    fn wait_is_none_with_capacity() {
        let rate = Rate::new(2, 60);
        assert_eq!(rate.wait(&[10.0], 20.0), None);
    }

    #[test]
    fn wait_counts_down_from_oldest_entry() {
        let rate = Rate::new(2, 60);
        assert_eq!(rate.wait(&[30.0, 10.0], 20.0), Some(Duration::from_secs(50)));
    }

    #[test]
    fn zero_budget_waits_a_full_window() {
        let rate = Rate::new(0, 60);
        assert_eq!(rate.wait(&[], 0.0), Some(Duration::from_secs(60)));
    }
}
