//! Concierge Sync
//!
//! Keeps an admin panel's data fresh without blocking it: cached resources
//! that paint from the per-user persistent cache and then refetch, a query
//! store with invalidation and garbage collection, role-aware realtime
//! polling, bounded user retries and memory-pressure throttling.
//!
//! Every component takes its host capabilities (storage, fetcher, memory,
//! clock) explicitly, so the same code runs in the headless agent and in
//! tests.

pub mod agent;
pub mod error;
pub mod fetcher;
pub mod memory;
pub mod notifications;
pub mod query;
pub mod realtime;
pub mod resource;
pub mod retry;
pub mod task;
pub mod telemetry;

pub use agent::{AgentTasks, SyncAgent};
pub use error::{AgentError, AgentResult};
pub use fetcher::{decode_body, FetchResponse, FetcherError, ResourceFetcher, RestFetcher};
pub use memory::{
    display_limit_for, HeapUsage, HostMemory, MemoryMonitor, MemorySample, MemorySubscription,
    MemoryWarning, SystemMemory, UnavailableMemory,
};
pub use notifications::{Notification, NotificationAction, NotificationLevel};
pub use query::{InMemoryQueryStore, QueryEvent, QueryKey, QueryOptions, QueryResult, QueryStore};
pub use realtime::{evaluate, RealtimeInputs, RealtimeState, SmartRealtimeController};
pub use resource::{
    should_retry, BackgroundUpdate, CachedResource, DataSource, ResourceState, ResourceStatus,
    UserRetry,
};
pub use retry::{KeyedRetryTracker, RetryRecord, MAX_RETRY_ATTEMPTS};
pub use task::TaskHandle;
