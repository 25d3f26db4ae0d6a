//! Instant-then-fresh access to a named resource.
//!
//! A [`CachedResource`] publishes its [`ResourceState`] on a watch channel.
//! On construction the state is seeded from the persistent cache so a view can
//! paint immediately; fetches then replace the data once they succeed. Data
//! that has been shown is never replaced by an empty state: errors are
//! recorded next to it.
//!
//! Fetches for one resource are serialized by an async mutex. Background
//! updates skip while a fetch is running; forced refreshes wait for it and
//! invalidate its result through a generation counter, so a response that
//! arrives after a newer fetch started (or after sign-out) is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use concierge_core::{FetchError, ResourceKey, RetrySettings};
use concierge_storage::PersistentCache;
use serde_json::Value;
use tokio::sync::{broadcast, watch, Mutex};

use crate::fetcher::ResourceFetcher;
use crate::query::{QueryEvent, QueryObserver, QueryOptions, QueryResult, QueryStore};
use crate::retry::KeyedRetryTracker;
use crate::task::TaskHandle;

/// Operation type under which user retries of a resource are tracked.
pub const RESOURCE_RETRY_OPERATION: &str = "resource";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    None,
    Cache,
    Network,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStatus {
    /// Nothing to show and nothing in flight.
    Idle,
    /// First fetch in flight, nothing to show yet.
    Loading,
    Ready,
    /// The last fetch failed but earlier data is still shown.
    ShowingStale,
    /// The last fetch failed and there is nothing to show.
    HardFailure,
}

/// Snapshot published to consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceState {
    pub data: Option<Value>,
    pub source: DataSource,
    pub updated_at: Option<DateTime<Utc>>,
    pub is_fetching: bool,
    pub error: Option<FetchError>,
    /// Consecutive failed fetches, reset by a success.
    pub failure_count: u32,
}

impl ResourceState {
    pub fn empty() -> Self {
        Self {
            data: None,
            source: DataSource::None,
            updated_at: None,
            is_fetching: false,
            error: None,
            failure_count: 0,
        }
    }

    pub fn status(&self) -> ResourceStatus {
        match (&self.data, &self.error) {
            (Some(_), Some(_)) => ResourceStatus::ShowingStale,
            (None, Some(_)) => ResourceStatus::HardFailure,
            (Some(_), None) => ResourceStatus::Ready,
            (None, None) if self.is_fetching => ResourceStatus::Loading,
            (None, None) => ResourceStatus::Idle,
        }
    }
}

impl Default for ResourceState {
    fn default() -> Self {
        Self::empty()
    }
}

/// Outcome of [`CachedResource::perform_background_update`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundUpdate {
    Refreshed,
    /// Another fetch for this resource was running; nothing was done.
    AlreadyInFlight,
    /// Marked for refresh; nobody is subscribed, so no fetch was made.
    Invalidated,
    NotSignedIn,
    Failed(FetchError),
    /// A newer fetch or a reset started while this one was running.
    Superseded,
}

/// Outcome of [`CachedResource::user_retry`].
#[derive(Debug, Clone, PartialEq)]
pub enum UserRetry {
    Refreshed,
    Failed { attempt: u32, error: FetchError },
    Exhausted,
}

enum FetchOutcome {
    Published,
    Failed(FetchError),
    Superseded,
}

/// Whether a failed fetch should be attempted again.
///
/// Only transport and server failures retry, and only when no cached copy
/// can be shown in the meantime.
pub fn should_retry(error: &FetchError, retries_so_far: u32, max_retries: u32, has_fallback: bool) -> bool {
    !has_fallback && error.is_retryable() && retries_so_far < max_retries
}

#[derive(Clone)]
pub struct CachedResource {
    inner: Arc<Inner>,
}

struct Inner {
    key: ResourceKey,
    fetcher: Arc<dyn ResourceFetcher>,
    cache: Arc<PersistentCache>,
    store: Arc<dyn QueryStore>,
    retry: RetrySettings,
    options: QueryOptions,
    state: watch::Sender<ResourceState>,
    fetch_lock: Mutex<()>,
    generation: AtomicU64,
    _observer: QueryObserver,
}

impl CachedResource {
    pub fn new(
        key: ResourceKey,
        fetcher: Arc<dyn ResourceFetcher>,
        cache: Arc<PersistentCache>,
        store: Arc<dyn QueryStore>,
        retry: RetrySettings,
        options: QueryOptions,
    ) -> Self {
        let (state, _) = watch::channel(seed_state(&cache, &key));
        let observer = store.observe(&key);
        Self {
            inner: Arc::new(Inner {
                key,
                fetcher,
                cache,
                store,
                retry,
                options,
                state,
                fetch_lock: Mutex::new(()),
                generation: AtomicU64::new(0),
                _observer: observer,
            }),
        }
    }

    pub fn key(&self) -> &ResourceKey {
        &self.inner.key
    }

    pub fn options(&self) -> &QueryOptions {
        &self.inner.options
    }

    pub fn state(&self) -> ResourceState {
        self.inner.state.borrow().clone()
    }

    /// Receive every published state. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<ResourceState> {
        self.inner.state.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.state.receiver_count()
    }

    /// True when no fetch is in flight and the persisted copy is still fresh.
    pub fn is_using_cached_data(&self) -> bool {
        !self.inner.state.borrow().is_fetching && !self.inner.cache.is_cache_stale(&self.inner.key)
    }

    /// Fetch if the query is stale, otherwise publish what the store holds.
    pub async fn refresh(&self) -> Result<(), FetchError> {
        let _guard = self.inner.fetch_lock.lock().await;
        if !self.inner.store.is_stale(&self.inner.key, self.inner.options.stale_time) {
            if let Some(result) = self.inner.store.get(&self.inner.key) {
                self.publish_if_newer(result);
            }
            return Ok(());
        }
        let generation = self.inner.generation.load(Ordering::SeqCst);
        match self.fetch_locked(generation).await {
            FetchOutcome::Failed(err) => Err(err),
            FetchOutcome::Published | FetchOutcome::Superseded => Ok(()),
        }
    }

    /// Drop the persisted copy, invalidate the query and fetch immediately.
    pub async fn force_refresh(&self) -> Result<(), FetchError> {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.cache.clear_cache(&self.inner.key);

        let _guard = self.inner.fetch_lock.lock().await;
        self.inner.store.mark_stale(&self.inner.key);
        tracing::debug!(resource = %self.inner.key, "forced refresh");
        match self.fetch_locked(generation).await {
            FetchOutcome::Failed(err) => Err(err),
            FetchOutcome::Published | FetchOutcome::Superseded => Ok(()),
        }
    }

    /// Timer-driven refresh. Never runs concurrently with another fetch of
    /// this resource, and never surfaces errors beyond the returned outcome.
    pub async fn perform_background_update(&self) -> BackgroundUpdate {
        let Ok(_guard) = self.inner.fetch_lock.try_lock() else {
            tracing::debug!(resource = %self.inner.key, "background update skipped, fetch in flight");
            return BackgroundUpdate::AlreadyInFlight;
        };
        if self.inner.cache.session().user_id().is_none() {
            return BackgroundUpdate::NotSignedIn;
        }

        if self.inner.state.receiver_count() == 0 {
            self.inner.store.invalidate(&self.inner.key);
            return BackgroundUpdate::Invalidated;
        }
        // Listeners would refetch on top of this fetch.
        self.inner.store.mark_stale(&self.inner.key);

        let generation = self.inner.generation.load(Ordering::SeqCst);
        match self.fetch_locked(generation).await {
            FetchOutcome::Published => BackgroundUpdate::Refreshed,
            FetchOutcome::Superseded => BackgroundUpdate::Superseded,
            FetchOutcome::Failed(err) => {
                tracing::warn!(resource = %self.inner.key, error = %err, "background update failed");
                BackgroundUpdate::Failed(err)
            }
        }
    }

    pub async fn on_window_focus(&self) -> Result<(), FetchError> {
        if !self.inner.options.refetch_on_window_focus {
            return Ok(());
        }
        self.refresh().await
    }

    pub async fn on_reconnect(&self) -> Result<(), FetchError> {
        if !self.inner.options.refetch_on_reconnect {
            return Ok(());
        }
        self.refresh().await
    }

    /// A user-initiated retry, bounded by `tracker`.
    pub async fn user_retry(&self, tracker: &KeyedRetryTracker) -> UserRetry {
        let id = self.inner.key.as_str();
        if !tracker.can_retry(RESOURCE_RETRY_OPERATION, id) {
            return UserRetry::Exhausted;
        }
        match self.force_refresh().await {
            Ok(()) => {
                tracker.reset_retry(RESOURCE_RETRY_OPERATION, id);
                UserRetry::Refreshed
            }
            Err(error) => {
                let attempt = tracker.increment_retry(RESOURCE_RETRY_OPERATION, id);
                UserRetry::Failed { attempt, error }
            }
        }
    }

    /// Forget everything for the current user, e.g. on sign-out. A fetch in
    /// flight will not publish.
    pub fn reset(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.store.remove(&self.inner.key);
        self.inner.state.send_replace(ResourceState::empty());
    }

    /// Reload the published state from the persistent cache, e.g. after a
    /// different user signed in.
    pub fn reseed(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.store.remove(&self.inner.key);
        let seeded = seed_state(&self.inner.cache, &self.inner.key);
        self.inner.state.send_replace(seeded);
    }

    /// Run [`perform_background_update`](Self::perform_background_update)
    /// every `interval` until the handle is dropped or the resource is.
    pub fn spawn_background_updates(&self, interval: Duration) -> TaskHandle {
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(resource) = upgrade(&weak) else {
                    break;
                };
                let outcome = resource.perform_background_update().await;
                tracing::trace!(resource = %resource.key(), ?outcome, "background tick");
            }
        });
        TaskHandle::new("background-updates", handle)
    }

    /// Refetch whenever the store reports this query invalidated and someone
    /// is subscribed.
    pub fn spawn_invalidation_listener(&self) -> TaskHandle {
        let weak = Arc::downgrade(&self.inner);
        let mut events = self.inner.store.subscribe();
        let key = self.inner.key.clone();
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(QueryEvent::Invalidated(invalidated)) if invalidated == key => {
                        let Some(resource) = upgrade(&weak) else {
                            break;
                        };
                        if resource.subscriber_count() == 0 {
                            continue;
                        }
                        if let Err(err) = resource.refresh().await {
                            tracing::warn!(resource = %key, error = %err, "refetch after invalidation failed");
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(resource = %key, skipped, "query events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        TaskHandle::new("invalidation-listener", handle)
    }

    /// Run one fetch while `fetch_lock` is held.
    async fn fetch_locked(&self, generation: u64) -> FetchOutcome {
        let inner = &self.inner;
        inner.state.send_modify(|state| state.is_fetching = true);

        let fetcher = RetryingFetcher {
            inner: inner.fetcher.as_ref(),
            retry: &inner.retry,
            has_fallback: inner.cache.cached_at(&inner.key).is_some(),
        };
        let result = inner
            .store
            .get_or_fetch(&inner.key, inner.options.stale_time, &fetcher)
            .await;

        if inner.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(resource = %inner.key, "discarding superseded fetch result");
            if matches!(result, Ok(QueryResult { fetched: true, .. })) {
                inner.store.remove(&inner.key);
            }
            return FetchOutcome::Superseded;
        }

        match result {
            Ok(result) => {
                if result.fetched {
                    inner.cache.save_to_cache(&inner.key, &result.data);
                }
                inner.state.send_modify(|state| {
                    state.data = Some(result.data);
                    state.source = DataSource::Network;
                    state.updated_at = Some(result.updated_at);
                    state.is_fetching = false;
                    state.error = None;
                    state.failure_count = 0;
                });
                FetchOutcome::Published
            }
            Err(err) => {
                tracing::warn!(resource = %inner.key, error = %err, "fetch failed");
                inner.state.send_modify(|state| {
                    state.is_fetching = false;
                    state.error = Some(err.clone());
                    state.failure_count += 1;
                });
                FetchOutcome::Failed(err)
            }
        }
    }

    fn publish_if_newer(&self, result: QueryResult) {
        self.inner.state.send_if_modified(|state| {
            let newer = state
                .updated_at
                .map_or(true, |shown| result.updated_at > shown);
            if !newer && state.data.is_some() {
                return false;
            }
            state.data = Some(result.data);
            state.source = DataSource::Network;
            state.updated_at = Some(result.updated_at);
            state.error = None;
            true
        });
    }
}

impl std::fmt::Debug for CachedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedResource")
            .field("key", &self.inner.key)
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}

fn upgrade(weak: &Weak<Inner>) -> Option<CachedResource> {
    weak.upgrade().map(|inner| CachedResource { inner })
}

fn seed_state(cache: &PersistentCache, key: &ResourceKey) -> ResourceState {
    match cache.read(key) {
        Some(read) => {
            tracing::debug!(resource = %key, "seeded from persistent cache");
            ResourceState {
                updated_at: Some(read.cached_at()),
                data: Some(read.into_value()),
                source: DataSource::Cache,
                ..ResourceState::empty()
            }
        }
        None => ResourceState::empty(),
    }
}

/// Applies the automatic retry policy around the configured fetcher.
struct RetryingFetcher<'a> {
    inner: &'a dyn ResourceFetcher,
    retry: &'a RetrySettings,
    has_fallback: bool,
}

#[async_trait]
impl<'a> ResourceFetcher for RetryingFetcher<'a> {
    async fn fetch(&self, resource: &ResourceKey) -> Result<Value, FetchError> {
        let mut retries = 0;
        loop {
            match self.inner.fetch(resource).await {
                Ok(data) => return Ok(data),
                Err(err)
                    if should_retry(&err, retries, self.retry.max_fetch_retries, self.has_fallback) =>
                {
                    retries += 1;
                    let delay = self.retry.backoff_for(retries);
                    tracing::debug!(
                        resource = %resource,
                        error = %err,
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        "retrying fetch"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::InMemoryQueryStore;
    use concierge_core::{ManualClock, Role, Session, UserIdentity};
    use concierge_storage::{MemoryStorage, StalePolicy};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex as StdMutex;

    struct QueueFetcher {
        responses: StdMutex<VecDeque<Result<Value, FetchError>>>,
        calls: AtomicU32,
    }

    impl QueueFetcher {
        fn new(responses: Vec<Result<Value, FetchError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: StdMutex::new(responses.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ResourceFetcher for QueueFetcher {
        async fn fetch(&self, _resource: &ResourceKey) -> Result<Value, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::from_status(500, "script exhausted")))
        }
    }

    fn no_backoff() -> RetrySettings {
        RetrySettings {
            max_fetch_retries: 3,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    fn options() -> QueryOptions {
        QueryOptions {
            stale_time: Duration::from_secs(300),
            refetch_on_window_focus: false,
            refetch_on_reconnect: true,
        }
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        session: Arc<Session>,
        cache: Arc<PersistentCache>,
        store: Arc<InMemoryQueryStore>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::starting_now());
        let session = Arc::new(Session::signed_in(UserIdentity::new("u1", Role::Admin)));
        let cache = Arc::new(PersistentCache::new(
            Arc::new(MemoryStorage::new()),
            session.clone(),
            clock.clone(),
            StalePolicy::new(Duration::from_secs(300)),
        ));
        let store = Arc::new(InMemoryQueryStore::new(clock.clone(), Duration::from_secs(1800)));
        Fixture {
            clock,
            session,
            cache,
            store,
        }
    }

    fn resource(fx: &Fixture, fetcher: Arc<QueueFetcher>) -> CachedResource {
        CachedResource::new(
            ResourceKey::new("users"),
            fetcher,
            fx.cache.clone(),
            fx.store.clone(),
            no_backoff(),
            options(),
        )
    }

    #[test]
    fn test_status_derivation() {
        let mut state = ResourceState::empty();
        assert_eq!(state.status(), ResourceStatus::Idle);
        state.is_fetching = true;
        assert_eq!(state.status(), ResourceStatus::Loading);
        state.error = Some(FetchError::transport("offline"));
        assert_eq!(state.status(), ResourceStatus::HardFailure);
        state.data = Some(json!([]));
        assert_eq!(state.status(), ResourceStatus::ShowingStale);
        state.error = None;
        assert_eq!(state.status(), ResourceStatus::Ready);
    }

    #[test]
    fn test_should_retry_policy() {
        let server = FetchError::from_status(503, "unavailable");
        let transport = FetchError::transport("reset");
        let client = FetchError::from_status(404, "missing");

        assert!(should_retry(&server, 0, 3, false));
        assert!(should_retry(&transport, 2, 3, false));
        assert!(!should_retry(&server, 3, 3, false));
        assert!(!should_retry(&server, 0, 3, true));
        assert!(!should_retry(&client, 0, 3, false));
    }

    #[tokio::test]
    async fn test_seeds_from_cache_then_fetches() {
        let fx = fixture();
        fx.cache.save_to_cache(&ResourceKey::new("users"), &json!(["cached"]));
        let fetcher = QueueFetcher::new(vec![Ok(json!(["fresh"]))]);
        let resource = resource(&fx, fetcher.clone());

        let seeded = resource.state();
        assert_eq!(seeded.data, Some(json!(["cached"])));
        assert_eq!(seeded.source, DataSource::Cache);
        assert!(resource.is_using_cached_data());

        resource.refresh().await.unwrap();
        let state = resource.state();
        assert_eq!(state.data, Some(json!(["fresh"])));
        assert_eq!(state.source, DataSource::Network);
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(
            fx.cache.load_from_cache(&ResourceKey::new("users")),
            Some(json!(["fresh"]))
        );
    }

    #[tokio::test]
    async fn test_refresh_skips_fresh_query() {
        let fx = fixture();
        let fetcher = QueueFetcher::new(vec![Ok(json!(1)), Ok(json!(2))]);
        let resource = resource(&fx, fetcher.clone());

        resource.refresh().await.unwrap();
        resource.refresh().await.unwrap();
        assert_eq!(fetcher.calls(), 1);

        fx.clock.advance(Duration::from_secs(301));
        resource.refresh().await.unwrap();
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(resource.state().data, Some(json!(2)));
    }

    #[tokio::test]
    async fn test_error_keeps_shown_data() {
        let fx = fixture();
        fx.cache.save_to_cache(&ResourceKey::new("users"), &json!(["cached"]));
        let fetcher = QueueFetcher::new(vec![Err(FetchError::from_status(500, "boom"))]);
        let resource = resource(&fx, fetcher.clone());

        let err = resource.refresh().await.unwrap_err();
        assert_eq!(err.status, 500);
        // Cached fallback present: no automatic retry.
        assert_eq!(fetcher.calls(), 1);

        let state = resource.state();
        assert_eq!(state.data, Some(json!(["cached"])));
        assert_eq!(state.status(), ResourceStatus::ShowingStale);
        assert_eq!(state.failure_count, 1);
        assert!(!state.is_fetching);
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_staleness() {
        let fx = fixture();
        let fetcher = QueueFetcher::new(vec![Ok(json!(1)), Ok(json!(2))]);
        let resource = resource(&fx, fetcher.clone());

        resource.refresh().await.unwrap();
        resource.force_refresh().await.unwrap();
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(resource.state().data, Some(json!(2)));
        assert_eq!(
            fx.cache.load_from_cache(&ResourceKey::new("users")),
            Some(json!(2))
        );
    }

    #[tokio::test]
    async fn test_background_update_without_subscribers_only_invalidates() {
        let fx = fixture();
        let fetcher = QueueFetcher::new(vec![Ok(json!(1))]);
        let resource = resource(&fx, fetcher.clone());

        assert_eq!(
            resource.perform_background_update().await,
            BackgroundUpdate::Invalidated
        );
        assert_eq!(fetcher.calls(), 0);

        let _rx = resource.subscribe();
        assert_eq!(
            resource.perform_background_update().await,
            BackgroundUpdate::Refreshed
        );
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_background_update_signed_out() {
        let fx = fixture();
        fx.session.sign_out();
        let fetcher = QueueFetcher::new(vec![]);
        let resource = resource(&fx, fetcher.clone());
        let _rx = resource.subscribe();
        assert_eq!(
            resource.perform_background_update().await,
            BackgroundUpdate::NotSignedIn
        );
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_user_retry_is_bounded() {
        let fx = fixture();
        let failures = (0..20)
            .map(|_| Err(FetchError::from_status(404, "missing")))
            .collect();
        let fetcher = QueueFetcher::new(failures);
        let resource = resource(&fx, fetcher.clone());
        let tracker = KeyedRetryTracker::new(fx.clock.clone());

        for expected in 1..=3 {
            match resource.user_retry(&tracker).await {
                UserRetry::Failed { attempt, .. } => assert_eq!(attempt, expected),
                other => panic!("unexpected outcome {:?}", other),
            }
        }
        assert_eq!(resource.user_retry(&tracker).await, UserRetry::Exhausted);
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test]
    async fn test_reset_clears_state() {
        let fx = fixture();
        let fetcher = QueueFetcher::new(vec![Ok(json!(1))]);
        let resource = resource(&fx, fetcher);
        resource.refresh().await.unwrap();
        resource.reset();
        assert_eq!(resource.state(), ResourceState::empty());
        assert!(fx.store.get(&ResourceKey::new("users")).is_none());
    }

    #[tokio::test]
    async fn test_focus_toggle_is_respected() {
        let fx = fixture();
        let fetcher = QueueFetcher::new(vec![Ok(json!(1)), Ok(json!(2))]);
        let resource = resource(&fx, fetcher.clone());

        resource.on_window_focus().await.unwrap();
        assert_eq!(fetcher.calls(), 0);
        resource.on_reconnect().await.unwrap();
        assert_eq!(fetcher.calls(), 1);
    }
}
