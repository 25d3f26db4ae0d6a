//! Bookkeeping for user-initiated retries.
//!
//! Independent of the automatic fetch retries in [`crate::resource`]: this
//! only counts how often the user asked to retry an operation so views can
//! stop offering the affordance after [`MAX_RETRY_ATTEMPTS`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use concierge_core::Clock;

pub const MAX_RETRY_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryRecord {
    pub count: u32,
    pub last_attempt: DateTime<Utc>,
}

/// Retry counters keyed by `operation_type:operation_id`.
///
/// Records never expire on their own; call [`reset_retry`](Self::reset_retry)
/// on success and [`clear_all`](Self::clear_all) on sign-out.
pub struct KeyedRetryTracker {
    records: Mutex<HashMap<String, RetryRecord>>,
    clock: Arc<dyn Clock>,
}

impl KeyedRetryTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn can_retry(&self, operation_type: &str, operation_id: &str) -> bool {
        self.records()
            .get(&retry_key(operation_type, operation_id))
            .map_or(true, |record| record.count < MAX_RETRY_ATTEMPTS)
    }

    /// Record a failed attempt and return the new count.
    pub fn increment_retry(&self, operation_type: &str, operation_id: &str) -> u32 {
        let now = self.clock.now();
        let mut records = self.records();
        let record = records
            .entry(retry_key(operation_type, operation_id))
            .or_insert(RetryRecord {
                count: 0,
                last_attempt: now,
            });
        record.count = (record.count + 1).min(MAX_RETRY_ATTEMPTS);
        record.last_attempt = now;
        record.count
    }

    pub fn reset_retry(&self, operation_type: &str, operation_id: &str) {
        self.records()
            .remove(&retry_key(operation_type, operation_id));
    }

    pub fn clear_all(&self) {
        self.records().clear();
    }

    pub fn retry_count(&self, operation_type: &str, operation_id: &str) -> u32 {
        self.record(operation_type, operation_id)
            .map_or(0, |record| record.count)
    }

    pub fn record(&self, operation_type: &str, operation_id: &str) -> Option<RetryRecord> {
        self.records()
            .get(&retry_key(operation_type, operation_id))
            .copied()
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, RetryRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn retry_key(operation_type: &str, operation_id: &str) -> String {
    format!("{}:{}", operation_type, operation_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_core::ManualClock;
    use std::time::Duration;

    #[test]
    fn test_count_is_capped() {
        let tracker = KeyedRetryTracker::new(Arc::new(ManualClock::starting_now()));
        for _ in 0..5 {
            tracker.increment_retry("upload", "photo-1");
        }
        assert_eq!(tracker.retry_count("upload", "photo-1"), MAX_RETRY_ATTEMPTS);
        assert!(!tracker.can_retry("upload", "photo-1"));
    }

    #[test]
    fn test_keys_are_independent() {
        let tracker = KeyedRetryTracker::new(Arc::new(ManualClock::starting_now()));
        tracker.increment_retry("resource", "users");
        assert_eq!(tracker.retry_count("resource", "users"), 1);
        assert_eq!(tracker.retry_count("resource", "rooms"), 0);
        assert_eq!(tracker.retry_count("download", "users"), 0);

        tracker.clear_all();
        assert!(tracker.record("resource", "users").is_none());
    }

    #[test]
    fn test_last_attempt_is_stamped() {
        let clock = Arc::new(ManualClock::starting_now());
        let tracker = KeyedRetryTracker::new(clock.clone());
        tracker.increment_retry("resource", "users");
        let first = tracker.record("resource", "users").unwrap().last_attempt;

        clock.advance(Duration::from_secs(30));
        tracker.increment_retry("resource", "users");
        let second = tracker.record("resource", "users").unwrap().last_attempt;
        assert_eq!(second - first, chrono::Duration::seconds(30));
    }
}
