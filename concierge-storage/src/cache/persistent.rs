//! The per-user persistent cache.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use concierge_core::{CacheError, Clock, ResourceKey, Session, StorageError, UserId};
use serde_json::Value;

use super::entry::CacheEntry;
use super::freshness::{CacheRead, StalePolicy};
use super::owner_key::OwnerScopedKey;
use super::stats::{CacheStats, StatsCounters};
use crate::host::HostStorage;

/// Per-user keyed storage of fetched payloads.
///
/// All operations are scoped to whoever is signed in to the shared
/// [`Session`] at call time. Without a signed-in user writes are no-ops and
/// reads miss.
pub struct PersistentCache {
    storage: Arc<dyn HostStorage>,
    session: Arc<Session>,
    clock: Arc<dyn Clock>,
    policy: StalePolicy,
    stats: StatsCounters,
}

impl PersistentCache {
    pub fn new(
        storage: Arc<dyn HostStorage>,
        session: Arc<Session>,
        clock: Arc<dyn Clock>,
        policy: StalePolicy,
    ) -> Self {
        Self {
            storage,
            session,
            clock,
            policy,
            stats: StatsCounters::default(),
        }
    }

    pub fn policy(&self) -> &StalePolicy {
        &self.policy
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Write `data` for the current user, replacing any previous entry.
    ///
    /// Returns whether the entry was written. Storage failures are logged and
    /// reported as `false`, never propagated.
    pub fn save_to_cache(&self, resource: &ResourceKey, data: &Value) -> bool {
        let Some(owner) = self.session.user_id() else {
            tracing::debug!(resource = %resource, "no signed-in user, skipping cache write");
            return false;
        };
        let key = OwnerScopedKey::new(&owner, resource).encode();
        let entry = CacheEntry::new(data.clone(), owner, self.clock.now());

        let result = entry
            .encode(&key)
            .and_then(|raw| self.storage.set_item(&key, &raw));
        match result {
            Ok(()) => {
                self.stats.write();
                tracing::debug!(resource = %resource, "cached payload");
                true
            }
            Err(err) => {
                self.stats.write_failure();
                tracing::warn!(resource = %resource, error = %err, "failed to write cache entry");
                false
            }
        }
    }

    /// The current user's payload for `resource`, if any.
    ///
    /// An entry owned by another user, written under another schema version,
    /// or that cannot be decoded is deleted and reported as a miss.
    pub fn load_from_cache(&self, resource: &ResourceKey) -> Option<Value> {
        self.read(resource).map(CacheRead::into_value)
    }

    /// Like [`load_from_cache`](Self::load_from_cache) but keeps the write time.
    pub fn read(&self, resource: &ResourceKey) -> Option<CacheRead<Value>> {
        let owner = self.session.user_id()?;
        let key = OwnerScopedKey::new(&owner, resource).encode();

        match self.read_entry(&key, &owner) {
            Ok(Some(entry)) => {
                self.stats.hit();
                Some(CacheRead::new(entry.data, entry.timestamp))
            }
            Ok(None) => {
                self.stats.miss();
                None
            }
            Err(err) => {
                self.stats.miss();
                if should_discard(&err) {
                    tracing::warn!(resource = %resource, error = %err, "discarding cache entry");
                    self.discard(&key);
                } else {
                    tracing::warn!(resource = %resource, error = %err, "cache read failed");
                }
                None
            }
        }
    }

    /// When the current user's entry for `resource` was written.
    pub fn cached_at(&self, resource: &ResourceKey) -> Option<DateTime<Utc>> {
        let owner = self.session.user_id()?;
        let key = OwnerScopedKey::new(&owner, resource).encode();
        self.read_entry(&key, &owner)
            .ok()
            .flatten()
            .map(|entry| entry.timestamp)
    }

    /// True when there is no usable entry or it is older than the resource's
    /// stale time.
    pub fn is_cache_stale(&self, resource: &ResourceKey) -> bool {
        match self.cached_at(resource) {
            Some(cached_at) => self.policy.is_stale(resource, cached_at, self.clock.now()),
            None => true,
        }
    }

    /// Remove the current user's entry for `resource`.
    pub fn clear_cache(&self, resource: &ResourceKey) {
        let Some(owner) = self.session.user_id() else {
            return;
        };
        let key = OwnerScopedKey::new(&owner, resource).encode();
        if let Err(err) = self.storage.remove_item(&key) {
            tracing::warn!(resource = %resource, error = %err, "failed to clear cache entry");
        }
    }

    /// Remove every entry of the current user. Returns how many were removed.
    pub fn clear_all_user_caches(&self) -> usize {
        let Some(owner) = self.session.user_id() else {
            return 0;
        };
        self.clear_owner(&owner)
    }

    /// Remove every entry written for `owner`, e.g. right before signing out.
    ///
    /// A key under `owner`'s prefix may belong to another user whose id
    /// extends it (`u` and `u_1`), so the stored owner decides. Entries that
    /// cannot be decoded are removed.
    pub fn clear_owner(&self, owner: &UserId) -> usize {
        let keys = match self.storage.keys() {
            Ok(keys) => keys,
            Err(err) => {
                tracing::warn!(owner = %owner, error = %err, "failed to list cache keys");
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys {
            if OwnerScopedKey::decode_for_owner(&key, owner).is_none() {
                continue;
            }
            if !self.owned_by(&key, owner) {
                continue;
            }
            match self.storage.remove_item(&key) {
                Ok(()) => removed += 1,
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "failed to remove cache entry")
                }
            }
        }
        tracing::debug!(owner = %owner, removed, "cleared user caches");
        removed
    }

    fn read_entry(&self, key: &str, owner: &UserId) -> Result<Option<CacheEntry>, CacheError> {
        let Some(raw) = self.storage.get_item(key)? else {
            return Ok(None);
        };
        let entry = CacheEntry::decode(key, &raw)?;
        entry.validate(key, owner)?;
        Ok(Some(entry))
    }

    fn owned_by(&self, key: &str, owner: &UserId) -> bool {
        match self.storage.get_item(key) {
            Ok(Some(raw)) => match CacheEntry::decode(key, &raw) {
                Ok(entry) => &entry.owner_id == owner,
                Err(_) => true,
            },
            Ok(None) => false,
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "failed to read cache entry");
                false
            }
        }
    }

    fn discard(&self, key: &str) {
        self.stats.discard();
        if let Err(err) = self.storage.remove_item(key) {
            tracing::warn!(key = %key, error = %err, "failed to discard cache entry");
        }
    }
}

/// Backend read failures leave the entry alone; anything that proves the
/// stored entry unusable removes it.
fn should_discard(err: &CacheError) -> bool {
    match err {
        CacheError::Storage(StorageError::Corrupt { .. }) => true,
        CacheError::Storage(_) => false,
        CacheError::StaleOwnerMismatch { .. } | CacheError::SchemaMismatch { .. } => true,
    }
}
