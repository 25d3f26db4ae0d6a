//! Wires every component together for one signed-in profile.

use std::sync::Arc;
use std::time::Duration;

use concierge_core::{Clock, ConciergeConfig, ResourceKey, Session, UserIdentity};
use concierge_storage::{HostStorage, PersistentCache, StalePolicy};

use crate::fetcher::ResourceFetcher;
use crate::memory::{HostMemory, MemoryMonitor, MemorySubscription, MemoryWarning};
use crate::notifications::Notification;
use crate::query::{InMemoryQueryStore, QueryKey, QueryOptions, QueryStore};
use crate::realtime::SmartRealtimeController;
use crate::resource::{CachedResource, ResourceStatus};
use crate::retry::KeyedRetryTracker;
use crate::task::TaskHandle;

/// Background work started by [`SyncAgent::start`]. Dropping it stops
/// everything.
#[must_use = "dropping the tasks stops them"]
pub struct AgentTasks {
    handles: Vec<TaskHandle>,
    _memory_subscription: MemorySubscription,
}

impl AgentTasks {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn stop_all(self) {
        drop(self);
    }
}

pub struct SyncAgent {
    config: ConciergeConfig,
    session: Arc<Session>,
    cache: Arc<PersistentCache>,
    store: Arc<InMemoryQueryStore>,
    resources: Vec<CachedResource>,
    realtime: SmartRealtimeController,
    retries: Arc<KeyedRetryTracker>,
    memory: MemoryMonitor,
    clock: Arc<dyn Clock>,
}

impl SyncAgent {
    /// Build the agent and sign in the configured user.
    pub fn build(
        config: ConciergeConfig,
        storage: Arc<dyn HostStorage>,
        fetcher: Arc<dyn ResourceFetcher>,
        host_memory: Arc<dyn HostMemory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let session = Arc::new(Session::signed_in(config.session.identity()));
        let cache = Arc::new(PersistentCache::new(
            Arc::clone(&storage),
            Arc::clone(&session),
            Arc::clone(&clock),
            StalePolicy::from_settings(&config.cache),
        ));
        let store = Arc::new(InMemoryQueryStore::new(Arc::clone(&clock), config.cache.gc_time()));

        let resources = config
            .resources
            .iter()
            .map(|settings| {
                let key = ResourceKey::new(settings.key.clone());
                let options = QueryOptions::from_settings(&config.cache, &key);
                CachedResource::new(
                    key,
                    Arc::clone(&fetcher),
                    Arc::clone(&cache),
                    store.clone(),
                    config.retry.clone(),
                    options,
                )
            })
            .collect();

        let realtime =
            SmartRealtimeController::new(config.realtime.clone(), Arc::clone(&session), storage);

        Self {
            session,
            cache,
            store,
            resources,
            realtime,
            retries: Arc::new(KeyedRetryTracker::new(Arc::clone(&clock))),
            memory: MemoryMonitor::new(host_memory),
            clock,
            config,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn cache(&self) -> &Arc<PersistentCache> {
        &self.cache
    }

    pub fn store(&self) -> &Arc<InMemoryQueryStore> {
        &self.store
    }

    pub fn resources(&self) -> &[CachedResource] {
        &self.resources
    }

    pub fn resource(&self, key: &str) -> Option<&CachedResource> {
        self.resources.iter().find(|r| r.key().as_str() == key)
    }

    pub fn realtime(&self) -> &SmartRealtimeController {
        &self.realtime
    }

    pub fn retries(&self) -> &Arc<KeyedRetryTracker> {
        &self.retries
    }

    pub fn memory(&self) -> &MemoryMonitor {
        &self.memory
    }

    /// Refresh every resource once. Returns how many failed.
    pub async fn refresh_all(&self) -> usize {
        let mut failures = 0;
        for resource in &self.resources {
            if let Err(err) = resource.refresh().await {
                tracing::warn!(resource = %resource.key(), error = %err, "initial refresh failed");
                failures += 1;
            }
        }
        failures
    }

    /// Start background refresh, invalidation listeners, realtime polling,
    /// memory monitoring, query garbage collection and state logging.
    pub fn start(&self) -> AgentTasks {
        let background = self.config.cache.background_refresh_interval();
        let mut handles = Vec::new();

        for resource in &self.resources {
            handles.push(log_state_changes(
                resource.clone(),
                Arc::clone(&self.retries),
                Arc::clone(&self.clock),
            ));
            handles.push(resource.spawn_invalidation_listener());
            handles.push(resource.spawn_background_updates(background));
        }

        let keys: Vec<QueryKey> = self.resources.iter().map(|r| r.key().clone()).collect();
        let store: Arc<dyn QueryStore> = self.store.clone();
        handles.push(self.realtime.spawn_polling(store, keys));

        let sample_interval = Duration::from_millis(self.config.memory.sample_interval_ms);
        handles.push(self.memory.start_monitoring(sample_interval));
        handles.push(self.store.spawn_garbage_collection(self.config.cache.gc_time()));

        let clock = Arc::clone(&self.clock);
        let subscription = self.memory.subscribe(move |sample| {
            if let Some(warning) = MemoryWarning::for_sample(sample) {
                let notification = Notification::for_memory_warning(warning, clock.as_ref());
                tracing::info!(
                    level = ?notification.level,
                    display_limit = sample.recommended_display_limit(),
                    "{}",
                    notification.message
                );
            }
        });

        let realtime = self.realtime.state();
        tracing::info!(
            resources = self.resources.len(),
            polling = realtime.is_polling(),
            interval_ms = realtime.effective_interval.as_millis() as u64,
            "sync agent started"
        );

        AgentTasks {
            handles,
            _memory_subscription: subscription,
        }
    }

    /// Switch to another user. Their cached data is painted at once.
    pub fn sign_in(&self, identity: UserIdentity) {
        let previous = self.session.sign_in(identity);
        if let Some(previous) = previous {
            tracing::info!(previous = %previous.id, "switching user");
        }
        self.store.clear();
        for resource in &self.resources {
            resource.reseed();
        }
        self.retries.clear_all();
        self.realtime.on_session_changed();
    }

    /// Remove the current user's cached data and sign out. Returns how many
    /// persisted entries were removed.
    pub fn sign_out(&self) -> usize {
        let removed = match self.session.user_id() {
            Some(owner) => self.cache.clear_owner(&owner),
            None => 0,
        };
        self.session.sign_out();
        for resource in &self.resources {
            resource.reset();
        }
        self.store.clear();
        self.retries.clear_all();
        self.realtime.on_session_changed();
        tracing::info!(removed, "signed out");
        removed
    }
}

fn log_state_changes(
    resource: CachedResource,
    retries: Arc<KeyedRetryTracker>,
    clock: Arc<dyn Clock>,
) -> TaskHandle {
    let mut rx = resource.subscribe();
    let key = resource.key().clone();
    // The task must not keep the resource alive.
    drop(resource);

    let handle = tokio::spawn(async move {
        let mut last_status = rx.borrow_and_update().status();
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            let status = state.status();
            if status == last_status {
                continue;
            }
            last_status = status;
            match status {
                ResourceStatus::ShowingStale | ResourceStatus::HardFailure => {
                    if let Some(notification) =
                        Notification::for_resource_state(&key, &state, &retries, clock.as_ref())
                    {
                        tracing::warn!(
                            resource = %key,
                            ?status,
                            action = ?notification.action,
                            "{}",
                            notification.message
                        );
                    }
                }
                _ => tracing::info!(resource = %key, ?status, source = ?state.source, "resource state"),
            }
        }
    });
    TaskHandle::new("state-log", handle)
}
