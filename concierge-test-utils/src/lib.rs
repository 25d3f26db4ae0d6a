//! Concierge Test Utilities
//!
//! Shared test infrastructure for the Concierge workspace:
//! - Scripted fetchers and fixed memory hosts
//! - Fixtures that assemble a signed-in cache stack
//! - Proptest generators for identities and payloads

pub use concierge_core::{
    FailureKind, FetchError, ManualClock, ResourceKey, RetrySettings, Role, Session,
    UserIdentity,
};
pub use concierge_storage::{MemoryStorage, PersistentCache, StalePolicy};

use async_trait::async_trait;
use concierge_sync::{HeapUsage, HostMemory, ResourceFetcher};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// SCRIPTED HOSTS
// ============================================================================

/// Fetcher that answers from a per-resource queue of responses.
///
/// Once a resource's queue is empty, its last response repeats. Resources
/// with no script fail with a 404.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<ResourceKey, VecDeque<Result<Value, FetchError>>>>,
    last: Mutex<HashMap<ResourceKey, Result<Value, FetchError>>>,
    calls: Mutex<HashMap<ResourceKey, u32>>,
    total_calls: AtomicU32,
    delay: Option<Duration>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch sleeps for `delay` before answering.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn respond(self, resource: &str, response: Result<Value, FetchError>) -> Self {
        self.push(resource, response);
        self
    }

    pub fn push(&self, resource: &str, response: Result<Value, FetchError>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(ResourceKey::new(resource))
            .or_default()
            .push_back(response);
    }

    pub fn calls(&self, resource: &str) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .get(&ResourceKey::new(resource))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.total_calls.load(Ordering::SeqCst)
    }

    fn next_response(&self, resource: &ResourceKey) -> Result<Value, FetchError> {
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(resource)
            .and_then(VecDeque::pop_front);
        let mut last = self.last.lock().unwrap();
        match scripted {
            Some(response) => {
                last.insert(resource.clone(), response.clone());
                response
            }
            None => last.get(resource).cloned().unwrap_or_else(|| {
                Err(FetchError::from_status(
                    404,
                    format!("no script for {}", resource),
                ))
            }),
        }
    }
}

#[async_trait]
impl ResourceFetcher for ScriptedFetcher {
    async fn fetch(&self, resource: &ResourceKey) -> Result<Value, FetchError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls
            .lock()
            .unwrap()
            .entry(resource.clone())
            .or_insert(0) += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next_response(resource)
    }
}

/// Memory host reporting whatever usage the test sets.
#[derive(Debug)]
pub struct StaticMemory {
    usage: Mutex<Option<HeapUsage>>,
}

impl StaticMemory {
    pub fn new(used_bytes: u64, limit_bytes: u64) -> Self {
        Self {
            usage: Mutex::new(Some(HeapUsage {
                used_bytes,
                total_bytes: used_bytes,
                limit_bytes,
            })),
        }
    }

    /// Usage at `percent` of a 1000 MiB limit.
    pub fn at_percent(percent: u64) -> Self {
        let limit = 1000 * 1024 * 1024;
        Self::new(limit / 100 * percent, limit)
    }

    pub fn set(&self, used_bytes: u64, limit_bytes: u64) {
        *self.usage.lock().unwrap() = Some(HeapUsage {
            used_bytes,
            total_bytes: used_bytes,
            limit_bytes,
        });
    }
}

impl HostMemory for StaticMemory {
    fn heap_usage(&self) -> Option<HeapUsage> {
        *self.usage.lock().unwrap()
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built stacks for common scenarios.

    use super::*;
    use std::sync::Arc;

    pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(300);

    pub fn signed_in_session(user: &str, role: Role) -> Arc<Session> {
        Arc::new(Session::signed_in(UserIdentity::new(user, role)))
    }

    /// Retry policy with the default ceiling and no waiting between attempts.
    pub fn instant_retries() -> RetrySettings {
        RetrySettings {
            max_fetch_retries: 3,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    /// A persistent cache over fresh in-memory storage.
    pub struct CacheStack {
        pub clock: Arc<ManualClock>,
        pub session: Arc<Session>,
        pub storage: Arc<MemoryStorage>,
        pub cache: Arc<PersistentCache>,
    }

    pub fn cache_stack(user: &str, role: Role) -> CacheStack {
        let clock = Arc::new(ManualClock::starting_now());
        let session = signed_in_session(user, role);
        let storage = Arc::new(MemoryStorage::new());
        let cache = Arc::new(PersistentCache::new(
            storage.clone(),
            session.clone(),
            clock.clone(),
            StalePolicy::new(DEFAULT_STALE_TIME),
        ));
        CacheStack {
            clock,
            session,
            storage,
            cache,
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Concierge types.

    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    pub fn arb_role() -> impl Strategy<Value = Role> {
        prop_oneof![
            Just(Role::GeneralUser),
            Just(Role::Admin),
            Just(Role::SuperUser),
        ]
    }

    pub fn arb_user_id() -> impl Strategy<Value = String> {
        "[a-z0-9-]{1,12}"
    }

    pub fn arb_resource_key() -> impl Strategy<Value = ResourceKey> {
        "[a-z][a-z-]{0,15}".prop_map(ResourceKey::new)
    }

    /// HTTP-like status codes across all failure classes.
    pub fn arb_failure_status() -> impl Strategy<Value = u16> {
        prop_oneof![Just(0u16), 400u16..500, 500u16..600]
    }

    pub fn arb_fetch_error() -> impl Strategy<Value = FetchError> {
        (arb_failure_status(), "[a-z ]{0,20}")
            .prop_map(|(status, message)| FetchError::from_status(status, message))
    }

    pub fn arb_payload() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-zA-Z0-9 ]{0,16}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 16, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }
}
