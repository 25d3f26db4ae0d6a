//! Concierge Storage
//!
//! The durable key-value capability ([`HostStorage`]) the client layer runs
//! on, its backends, and the per-user [`PersistentCache`] built over it.
//!
//! The storage is shared by every resource and, for durable backends, by
//! every process opened on the same profile. Writes are last-writer-wins.

pub mod cache;
pub mod host;
pub mod lmdb;

pub use cache::{
    CacheEntry, CacheRead, CacheStats, OwnerScopedKey, PersistentCache, StalePolicy,
    CACHE_SCHEMA_VERSION,
};
pub use host::{HostStorage, MemoryStorage, NullStorage};
pub use lmdb::{LmdbStorage, LmdbStorageError};
