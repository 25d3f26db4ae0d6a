//! Role-aware polling.
//!
//! Whether the panel polls, and how often, is derived from the signed-in
//! role, the stored preference and page visibility. Nothing but the
//! preference itself is persisted; the interval is recomputed on every
//! evaluation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use concierge_core::{RealtimeSettings, Role, Session};
use concierge_storage::HostStorage;
use tokio::sync::watch;

use crate::query::{QueryKey, QueryStore};
use crate::task::TaskHandle;

/// Host storage key of the persisted preference.
pub const REALTIME_PREFERENCE_KEY: &str = "realtime_updates_enabled";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealtimeInputs {
    pub role: Option<Role>,
    pub stored_preference: Option<bool>,
    pub page_visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealtimeState {
    pub can_toggle: bool,
    pub is_enabled: bool,
    /// Polling interval for the role, whether or not polling is active.
    pub interval: Duration,
    /// Interval actually used; zero means no polling.
    pub effective_interval: Duration,
}

impl RealtimeState {
    pub fn is_polling(&self) -> bool {
        !self.effective_interval.is_zero()
    }
}

/// Derive the realtime state from its inputs.
pub fn evaluate(settings: &RealtimeSettings, inputs: &RealtimeInputs) -> RealtimeState {
    let regular = Duration::from_millis(settings.regular_interval_ms);
    let Some(role) = inputs.role else {
        return RealtimeState {
            can_toggle: false,
            is_enabled: false,
            interval: regular,
            effective_interval: Duration::ZERO,
        };
    };

    let can_toggle = role.is_privileged() || settings.enable_for_users;
    let interval = if role.is_privileged() {
        Duration::from_millis(settings.privileged_interval_ms)
    } else {
        regular
    };
    let is_enabled = can_toggle && inputs.stored_preference.unwrap_or(role.is_highest());
    let effective_interval = if is_enabled && inputs.page_visible {
        interval
    } else {
        Duration::ZERO
    };

    RealtimeState {
        can_toggle,
        is_enabled,
        interval,
        effective_interval,
    }
}

pub struct SmartRealtimeController {
    settings: RealtimeSettings,
    session: Arc<Session>,
    storage: Arc<dyn HostStorage>,
    page_visible: AtomicBool,
    state: watch::Sender<RealtimeState>,
}

impl SmartRealtimeController {
    /// The page starts out visible.
    pub fn new(settings: RealtimeSettings, session: Arc<Session>, storage: Arc<dyn HostStorage>) -> Self {
        let inputs = RealtimeInputs {
            role: session.role(),
            stored_preference: read_preference(storage.as_ref()),
            page_visible: true,
        };
        let (state, _) = watch::channel(evaluate(&settings, &inputs));
        Self {
            settings,
            session,
            storage,
            page_visible: AtomicBool::new(true),
            state,
        }
    }

    pub fn state(&self) -> RealtimeState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RealtimeState> {
        self.state.subscribe()
    }

    pub fn set_page_visible(&self, visible: bool) -> RealtimeState {
        self.page_visible.store(visible, Ordering::SeqCst);
        self.recompute()
    }

    /// Flip the preference. No-op for roles that may not poll.
    pub fn toggle(&self) -> RealtimeState {
        let current = self.state();
        self.set_enabled(!current.is_enabled)
    }

    pub fn set_enabled(&self, enabled: bool) -> RealtimeState {
        let current = self.recompute();
        if !current.can_toggle {
            tracing::debug!(role = ?self.session.role(), "realtime toggle ignored for ineligible role");
            return current;
        }
        let value = if enabled { "true" } else { "false" };
        if let Err(err) = self.storage.set_item(REALTIME_PREFERENCE_KEY, value) {
            tracing::warn!(error = %err, "failed to persist realtime preference");
        }
        tracing::info!(enabled, "realtime updates toggled");
        self.recompute()
    }

    /// Re-evaluate after a sign-in, sign-out or role change.
    pub fn on_session_changed(&self) -> RealtimeState {
        self.recompute()
    }

    /// Invalidate `keys` every effective interval. Idles while polling is
    /// off and reacts to visibility and preference changes immediately.
    pub fn spawn_polling(&self, store: Arc<dyn QueryStore>, keys: Vec<QueryKey>) -> TaskHandle {
        let mut rx = self.state.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                let interval = rx.borrow_and_update().effective_interval;
                if interval.is_zero() {
                    if rx.changed().await.is_err() {
                        break;
                    }
                    continue;
                }
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        tracing::debug!(queries = keys.len(), "realtime poll");
                        for key in &keys {
                            store.invalidate(key);
                        }
                    }
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        TaskHandle::new("realtime-polling", handle)
    }

    fn inputs(&self) -> RealtimeInputs {
        RealtimeInputs {
            role: self.session.role(),
            stored_preference: read_preference(self.storage.as_ref()),
            page_visible: self.page_visible.load(Ordering::SeqCst),
        }
    }

    fn recompute(&self) -> RealtimeState {
        let next = evaluate(&self.settings, &self.inputs());
        self.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
        next
    }
}

fn read_preference(storage: &dyn HostStorage) -> Option<bool> {
    match storage.get_item(REALTIME_PREFERENCE_KEY) {
        Ok(Some(raw)) => match raw.as_str() {
            "true" => Some(true),
            "false" => Some(false),
            other => {
                tracing::warn!(value = other, "ignoring unrecognised realtime preference");
                None
            }
        },
        Ok(None) => None,
        Err(err) => {
            tracing::warn!(error = %err, "failed to read realtime preference");
            None
        }
    }
}
