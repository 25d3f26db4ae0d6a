//! Staleness policy and cache reads that carry their age.

use chrono::{DateTime, Utc};
use concierge_core::{CacheSettings, ResourceKey};
use std::collections::HashMap;
use std::time::Duration;

/// Default stale time applied when a resource has no override (5 minutes).
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(5 * 60);

/// Per-resource stale times.
///
/// An entry is stale once strictly more than its stale time has elapsed since
/// it was written; an entry exactly `stale_time` old is still fresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalePolicy {
    default_stale_time: Duration,
    overrides: HashMap<ResourceKey, Duration>,
}

impl Default for StalePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_TIME)
    }
}

impl StalePolicy {
    pub fn new(default_stale_time: Duration) -> Self {
        Self {
            default_stale_time,
            overrides: HashMap::new(),
        }
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        let overrides = settings
            .stale_time_overrides_ms
            .iter()
            .map(|(key, ms)| (ResourceKey::new(key.clone()), Duration::from_millis(*ms)))
            .collect();
        Self {
            default_stale_time: Duration::from_millis(settings.default_stale_time_ms),
            overrides,
        }
    }

    pub fn with_override(mut self, key: impl Into<ResourceKey>, stale_time: Duration) -> Self {
        self.overrides.insert(key.into(), stale_time);
        self
    }

    pub fn stale_time_for(&self, key: &ResourceKey) -> Duration {
        self.overrides
            .get(key)
            .copied()
            .unwrap_or(self.default_stale_time)
    }

    pub fn is_stale(&self, key: &ResourceKey, cached_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        age(cached_at, now) > self.stale_time_for(key)
    }
}

/// Time elapsed between `cached_at` and `now`, zero if `cached_at` is ahead.
pub fn age(cached_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    now.signed_duration_since(cached_at)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// Result of a cache read, carrying the time the value was written.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead<T> {
    value: T,
    cached_at: DateTime<Utc>,
}

impl<T> CacheRead<T> {
    pub fn new(value: T, cached_at: DateTime<Utc>) -> Self {
        Self { value, cached_at }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn cached_at(&self) -> DateTime<Utc> {
        self.cached_at
    }

    /// How old the value is as of `now`.
    pub fn staleness(&self, now: DateTime<Utc>) -> Duration {
        age(self.cached_at, now)
    }

    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            cached_at: self.cached_at,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}
