//! Query store: the in-memory layer between views and the network.
//!
//! Entries are keyed by [`QueryKey`] and carry the time their data was
//! fetched. An entry is stale once it is older than the caller's stale time
//! or has been explicitly invalidated. Entries with no observers are dropped
//! by [`InMemoryQueryStore::collect_garbage`] after `gc_time`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use concierge_core::{CacheSettings, Clock, FetchError, ResourceKey};
use concierge_storage::cache::age;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::fetcher::ResourceFetcher;
use crate::task::TaskHandle;

pub type QueryKey = ResourceKey;

const EVENT_CAPACITY: usize = 256;

/// Per-query refetch options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    pub stale_time: Duration,
    pub refetch_on_window_focus: bool,
    pub refetch_on_reconnect: bool,
}

impl QueryOptions {
    pub fn from_settings(settings: &CacheSettings, key: &QueryKey) -> Self {
        Self {
            stale_time: settings.stale_time_for(key),
            refetch_on_window_focus: settings.refetch_on_window_focus,
            refetch_on_reconnect: settings.refetch_on_reconnect,
        }
    }
}

/// Changes broadcast by a query store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryEvent {
    Updated(QueryKey),
    Invalidated(QueryKey),
    Removed(QueryKey),
    Cleared,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub data: Value,
    pub updated_at: DateTime<Utc>,
    /// Whether the data came from the fetcher during this call.
    pub fetched: bool,
}

/// Keeps a query's entry alive while held. Released on drop.
pub struct QueryObserver {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl QueryObserver {
    pub fn new(release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for QueryObserver {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for QueryObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryObserver")
            .field("attached", &self.release.is_some())
            .finish()
    }
}

#[async_trait]
pub trait QueryStore: Send + Sync {
    fn get(&self, key: &QueryKey) -> Option<QueryResult>;

    fn set(&self, key: &QueryKey, data: Value);

    /// Mark the entry as wanting refresh. Its data stays readable.
    fn invalidate(&self, key: &QueryKey);

    /// Like [`invalidate`](Self::invalidate) without telling listeners. For
    /// callers about to fetch the entry themselves.
    fn mark_stale(&self, key: &QueryKey);

    fn remove(&self, key: &QueryKey);

    fn clear(&self);

    /// True when there is no entry, it was invalidated, or it is older than
    /// `stale_time`.
    fn is_stale(&self, key: &QueryKey, stale_time: Duration) -> bool;

    fn observe(&self, key: &QueryKey) -> QueryObserver;

    fn subscribe(&self) -> broadcast::Receiver<QueryEvent>;

    /// Return the entry if fresh, otherwise fetch, store and return it.
    async fn get_or_fetch(
        &self,
        key: &QueryKey,
        stale_time: Duration,
        fetcher: &dyn ResourceFetcher,
    ) -> Result<QueryResult, FetchError>;
}

#[derive(Debug, Clone)]
struct QueryEntry {
    data: Value,
    updated_at: DateTime<Utc>,
    invalidated: bool,
}

pub struct InMemoryQueryStore {
    entries: DashMap<QueryKey, QueryEntry>,
    observers: Arc<DashMap<QueryKey, usize>>,
    clock: Arc<dyn Clock>,
    gc_time: Duration,
    events: broadcast::Sender<QueryEvent>,
}

impl InMemoryQueryStore {
    pub fn new(clock: Arc<dyn Clock>, gc_time: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: DashMap::new(),
            observers: Arc::new(DashMap::new()),
            clock,
            gc_time,
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn observer_count(&self, key: &QueryKey) -> usize {
        self.observers.get(key).map_or(0, |count| *count)
    }

    /// Drop unobserved entries last updated more than `gc_time` ago.
    /// Returns how many were dropped.
    pub fn collect_garbage(&self) -> usize {
        let now = self.clock.now();
        let expired: Vec<QueryKey> = self
            .entries
            .iter()
            .filter(|entry| self.observer_count(entry.key()) == 0)
            .filter(|entry| age(entry.value().updated_at, now) > self.gc_time)
            .map(|entry| entry.key().clone())
            .collect();

        for key in &expired {
            self.entries.remove(key);
            self.emit(QueryEvent::Removed(key.clone()));
        }
        if !expired.is_empty() {
            tracing::debug!(removed = expired.len(), "collected unobserved queries");
        }
        expired.len()
    }

    /// Run [`collect_garbage`](Self::collect_garbage) every `interval` until
    /// the handle or the store is dropped.
    pub fn spawn_garbage_collection(self: &Arc<Self>, interval: Duration) -> TaskHandle {
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(store) = weak.upgrade() else {
                    break;
                };
                store.collect_garbage();
            }
        });
        TaskHandle::new("query-gc", handle)
    }

    fn emit(&self, event: QueryEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl QueryStore for InMemoryQueryStore {
    fn get(&self, key: &QueryKey) -> Option<QueryResult> {
        self.entries.get(key).map(|entry| QueryResult {
            data: entry.data.clone(),
            updated_at: entry.updated_at,
            fetched: false,
        })
    }

    fn set(&self, key: &QueryKey, data: Value) {
        let entry = QueryEntry {
            data,
            updated_at: self.clock.now(),
            invalidated: false,
        };
        self.entries.insert(key.clone(), entry);
        self.emit(QueryEvent::Updated(key.clone()));
    }

    fn invalidate(&self, key: &QueryKey) {
        self.mark_stale(key);
        self.emit(QueryEvent::Invalidated(key.clone()));
    }

    fn mark_stale(&self, key: &QueryKey) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.invalidated = true;
        }
    }

    fn remove(&self, key: &QueryKey) {
        if self.entries.remove(key).is_some() {
            self.emit(QueryEvent::Removed(key.clone()));
        }
    }

    fn clear(&self) {
        self.entries.clear();
        self.emit(QueryEvent::Cleared);
    }

    fn is_stale(&self, key: &QueryKey, stale_time: Duration) -> bool {
        match self.entries.get(key) {
            Some(entry) => {
                entry.invalidated || age(entry.updated_at, self.clock.now()) > stale_time
            }
            None => true,
        }
    }

    fn observe(&self, key: &QueryKey) -> QueryObserver {
        *self.observers.entry(key.clone()).or_insert(0) += 1;
        let observers = Arc::clone(&self.observers);
        let key = key.clone();
        QueryObserver::new(move || {
            let now_unobserved = match observers.get_mut(&key) {
                Some(mut count) => {
                    *count = count.saturating_sub(1);
                    *count == 0
                }
                None => false,
            };
            if now_unobserved {
                observers.remove_if(&key, |_, count| *count == 0);
            }
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<QueryEvent> {
        self.events.subscribe()
    }

    async fn get_or_fetch(
        &self,
        key: &QueryKey,
        stale_time: Duration,
        fetcher: &dyn ResourceFetcher,
    ) -> Result<QueryResult, FetchError> {
        if !self.is_stale(key, stale_time) {
            if let Some(result) = self.get(key) {
                return Ok(result);
            }
        }

        let data = fetcher.fetch(key).await?;
        self.set(key, data.clone());
        let updated_at = self
            .entries
            .get(key)
            .map_or_else(|| self.clock.now(), |entry| entry.updated_at);
        Ok(QueryResult {
            data,
            updated_at,
            fetched: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_core::ManualClock;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingFetcher {
        calls: AtomicU32,
    }

    #[async_trait]
    impl ResourceFetcher for CountingFetcher {
        async fn fetch(&self, resource: &ResourceKey) -> Result<Value, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(json!({"resource": resource.as_str(), "call": n}))
        }
    }

    fn store() -> (Arc<ManualClock>, InMemoryQueryStore) {
        let clock = Arc::new(ManualClock::starting_now());
        let store = InMemoryQueryStore::new(clock.clone(), Duration::from_secs(600));
        (clock, store)
    }

    #[tokio::test]
    async fn test_get_or_fetch_respects_stale_time() {
        let (clock, store) = store();
        let fetcher = CountingFetcher {
            calls: AtomicU32::new(0),
        };
        let key = QueryKey::new("users");
        let stale = Duration::from_secs(60);

        let first = store.get_or_fetch(&key, stale, &fetcher).await.unwrap();
        assert!(first.fetched);
        let second = store.get_or_fetch(&key, stale, &fetcher).await.unwrap();
        assert!(!second.fetched);
        assert_eq!(first.data, second.data);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(61));
        let third = store.get_or_fetch(&key, stale, &fetcher).await.unwrap();
        assert!(third.fetched);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch_and_keeps_data() {
        let (_clock, store) = store();
        let fetcher = CountingFetcher {
            calls: AtomicU32::new(0),
        };
        let key = QueryKey::new("rooms");
        store.get_or_fetch(&key, Duration::from_secs(60), &fetcher).await.unwrap();

        store.invalidate(&key);
        assert!(store.is_stale(&key, Duration::from_secs(60)));
        assert!(store.get(&key).is_some());

        let refreshed = store
            .get_or_fetch(&key, Duration::from_secs(60), &fetcher)
            .await
            .unwrap();
        assert!(refreshed.fetched);
        assert!(!store.is_stale(&key, Duration::from_secs(60)));
    }

    #[test]
    fn test_mark_stale_is_silent() {
        let (_clock, store) = store();
        let key = QueryKey::new("users");
        store.set(&key, json!([]));
        let mut rx = store.subscribe();

        store.mark_stale(&key);
        assert!(store.is_stale(&key, Duration::from_secs(60)));
        assert!(store.get(&key).is_some());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_events_are_broadcast() {
        let (_clock, store) = store();
        let mut rx = store.subscribe();
        let key = QueryKey::new("users");

        store.set(&key, json!([]));
        store.invalidate(&key);
        store.remove(&key);
        store.clear();

        assert_eq!(rx.try_recv().unwrap(), QueryEvent::Updated(key.clone()));
        assert_eq!(rx.try_recv().unwrap(), QueryEvent::Invalidated(key.clone()));
        assert_eq!(rx.try_recv().unwrap(), QueryEvent::Removed(key));
        assert_eq!(rx.try_recv().unwrap(), QueryEvent::Cleared);
    }

    #[test]
    fn test_garbage_collection_skips_observed_entries() {
        let (clock, store) = store();
        let observed = QueryKey::new("users");
        let unobserved = QueryKey::new("rooms");
        store.set(&observed, json!(1));
        store.set(&unobserved, json!(2));

        let observer = store.observe(&observed);
        assert_eq!(store.observer_count(&observed), 1);

        clock.advance(Duration::from_secs(600));
        assert_eq!(store.collect_garbage(), 0);

        clock.advance(Duration::from_secs(1));
        assert_eq!(store.collect_garbage(), 1);
        assert!(store.get(&unobserved).is_none());
        assert!(store.get(&observed).is_some());

        drop(observer);
        assert_eq!(store.observer_count(&observed), 0);
        assert_eq!(store.collect_garbage(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_options_from_settings() {
        let mut settings = concierge_core::ConciergeConfig::default_for(
            "http://localhost",
            concierge_core::SessionConfig {
                user_id: "u1".to_string(),
                role: concierge_core::Role::Admin,
            },
        )
        .cache;
        settings
            .stale_time_overrides_ms
            .insert("dashboard-charts".to_string(), 600_000);

        let options = QueryOptions::from_settings(&settings, &QueryKey::new("dashboard-charts"));
        assert_eq!(options.stale_time, Duration::from_secs(600));
        assert!(options.refetch_on_reconnect);
        assert!(!options.refetch_on_window_focus);
    }
}
