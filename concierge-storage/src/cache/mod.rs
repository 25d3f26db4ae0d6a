//! Per-user persistent cache over [`HostStorage`](crate::host::HostStorage).
//!
//! Entries are keyed by owner and resource, stamped with the time they were
//! written, and refused for any user other than the one who wrote them.
//! Every storage or decoding failure is absorbed and reported as a miss; the
//! cache is an accelerator, never a source of errors for the caller.
//!
//! # Example
//!
//! ```ignore
//! let cache = PersistentCache::new(storage, session, clock, StalePolicy::default());
//!
//! cache.save_to_cache(&ResourceKey::new("users"), &json!([{"id": 1}]));
//! if !cache.is_cache_stale(&ResourceKey::new("users")) {
//!     let users = cache.load_from_cache(&ResourceKey::new("users"));
//! }
//! ```

pub mod entry;
pub mod freshness;
pub mod owner_key;
pub mod persistent;
pub mod stats;

pub use entry::{CacheEntry, CACHE_SCHEMA_VERSION};
pub use freshness::{age, CacheRead, StalePolicy, DEFAULT_STALE_TIME};
pub use owner_key::OwnerScopedKey;
pub use persistent::PersistentCache;
pub use stats::CacheStats;
