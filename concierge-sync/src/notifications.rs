//! User-facing notifications derived from resource and memory state.

use chrono::{DateTime, Utc};
use concierge_core::{Clock, FailureKind, ResourceKey};

use crate::memory::MemoryWarning;
use crate::resource::{ResourceState, ResourceStatus, RESOURCE_RETRY_OPERATION};
use crate::retry::{KeyedRetryTracker, MAX_RETRY_ATTEMPTS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    Retry,
    Reconnect,
    Dismiss,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub action: Option<NotificationAction>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        level: NotificationLevel,
        message: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            level,
            message: message.into(),
            action: None,
            created_at,
        }
    }

    pub fn with_action(mut self, action: NotificationAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Describe a failed resource, if its state shows a failure.
    ///
    /// Stale data gets a warning, no data an error. The retry affordance is
    /// offered while `tracker` still allows user retries; a transport
    /// failure offers to reconnect instead.
    pub fn for_resource_state(
        resource: &ResourceKey,
        state: &ResourceState,
        tracker: &KeyedRetryTracker,
        clock: &dyn Clock,
    ) -> Option<Self> {
        let error = state.error.as_ref()?;
        let (level, summary) = match state.status() {
            ResourceStatus::ShowingStale => (
                NotificationLevel::Warning,
                format!("Showing saved {} data; refresh failed", resource),
            ),
            ResourceStatus::HardFailure => (
                NotificationLevel::Error,
                format!("Could not load {}", resource),
            ),
            _ => return None,
        };

        let attempts = tracker.retry_count(RESOURCE_RETRY_OPERATION, resource.as_str());
        let mut message = format!("{}: {}", summary, error.message);
        if attempts > 0 {
            message.push_str(&format!(" (attempt {} of {})", attempts, MAX_RETRY_ATTEMPTS));
        }

        let notification = Notification::new(level, message, clock.now());
        let action = if !tracker.can_retry(RESOURCE_RETRY_OPERATION, resource.as_str()) {
            NotificationAction::Dismiss
        } else if error.kind == FailureKind::Transport {
            NotificationAction::Reconnect
        } else {
            NotificationAction::Retry
        };
        Some(notification.with_action(action))
    }

    pub fn for_memory_warning(warning: MemoryWarning, clock: &dyn Clock) -> Self {
        let level = match warning {
            MemoryWarning::High => NotificationLevel::Info,
            MemoryWarning::Low => NotificationLevel::Warning,
        };
        Notification::new(level, warning.message(), clock.now()).with_action(NotificationAction::Dismiss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_core::{FetchError, ManualClock};
    use serde_json::json;
    use std::sync::Arc;

    fn failed(data: Option<serde_json::Value>, error: FetchError) -> ResourceState {
        ResourceState {
            data,
            error: Some(error),
            failure_count: 1,
            ..ResourceState::empty()
        }
    }

    fn clock_and_tracker() -> (Arc<ManualClock>, KeyedRetryTracker) {
        let clock = Arc::new(ManualClock::starting_now());
        let tracker = KeyedRetryTracker::new(clock.clone());
        (clock, tracker)
    }

    #[test]
    fn test_no_notification_without_error() {
        let (clock, tracker) = clock_and_tracker();
        let state = ResourceState {
            data: Some(json!([])),
            ..ResourceState::empty()
        };
        assert!(Notification::for_resource_state(&ResourceKey::new("users"), &state, &tracker, clock.as_ref()).is_none());
    }

    #[test]
    fn test_stale_and_hard_failures() {
        let (clock, tracker) = clock_and_tracker();
        let users = ResourceKey::new("users");

        let stale = failed(Some(json!([])), FetchError::from_status(500, "boom"));
        let n = Notification::for_resource_state(&users, &stale, &tracker, clock.as_ref()).unwrap();
        assert_eq!(n.level, NotificationLevel::Warning);
        assert_eq!(n.action, Some(NotificationAction::Retry));

        let hard = failed(None, FetchError::transport("offline"));
        let n = Notification::for_resource_state(&users, &hard, &tracker, clock.as_ref()).unwrap();
        assert_eq!(n.level, NotificationLevel::Error);
        assert_eq!(n.action, Some(NotificationAction::Reconnect));
        assert!(n.message.contains("offline"));
    }

    #[test]
    fn test_exhausted_retries_offer_dismiss() {
        let (clock, tracker) = clock_and_tracker();
        for _ in 0..MAX_RETRY_ATTEMPTS {
            tracker.increment_retry(RESOURCE_RETRY_OPERATION, "rooms");
        }
        let state = failed(None, FetchError::from_status(503, "unavailable"));
        let n = Notification::for_resource_state(&ResourceKey::new("rooms"), &state, &tracker, clock.as_ref()).unwrap();
        assert_eq!(n.action, Some(NotificationAction::Dismiss));
        assert!(n.message.ends_with("(attempt 3 of 3)"));
    }

    #[test]
    fn test_memory_notifications() {
        let clock = ManualClock::starting_now();
        let n = Notification::for_memory_warning(MemoryWarning::Low, &clock);
        assert_eq!(n.level, NotificationLevel::Warning);
        assert_eq!(n.action, Some(NotificationAction::Dismiss));
    }

    #[test]
    fn test_created_at_comes_from_clock() {
        let (clock, tracker) = clock_and_tracker();
        let pinned = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        clock.set(pinned);

        let state = failed(None, FetchError::from_status(500, "boom"));
        let n = Notification::for_resource_state(&ResourceKey::new("users"), &state, &tracker, clock.as_ref())
            .unwrap();
        assert_eq!(n.created_at, pinned);

        clock.advance(std::time::Duration::from_secs(5));
        let n = Notification::for_memory_warning(MemoryWarning::High, clock.as_ref());
        assert_eq!(n.created_at, pinned + chrono::Duration::seconds(5));
    }
}
