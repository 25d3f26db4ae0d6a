//! Owner-scoped cache keys.
//!
//! An [`OwnerScopedKey`] cannot be built without naming the user who owns the
//! entry, so every read and write is scoped to an owner by construction.

use concierge_core::{ResourceKey, UserId};

const KEY_PREFIX: &str = "cache_";

/// Storage key for one `(owner, resource)` pair.
///
/// # Format
///
/// `cache_<ownerId>_<resourceKey>`, e.g. `cache_staff-17_users`. Keys sort by
/// owner first, so an owner's entries are found with a prefix scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerScopedKey {
    inner: OwnerKeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct OwnerKeyInner {
    owner: UserId,
    resource: ResourceKey,
}

impl OwnerScopedKey {
    pub fn new(owner: &UserId, resource: &ResourceKey) -> Self {
        Self {
            inner: OwnerKeyInner {
                owner: owner.clone(),
                resource: resource.clone(),
            },
        }
    }

    pub fn owner(&self) -> &UserId {
        &self.inner.owner
    }

    pub fn resource(&self) -> &ResourceKey {
        &self.inner.resource
    }

    pub fn encode(&self) -> String {
        format!(
            "{}{}_{}",
            KEY_PREFIX,
            self.inner.owner.as_str(),
            self.inner.resource.as_str()
        )
    }

    /// Prefix shared by every key belonging to `owner`.
    pub fn owner_prefix(owner: &UserId) -> String {
        format!("{}{}_", KEY_PREFIX, owner.as_str())
    }

    /// Decode `key` as belonging to `owner`.
    ///
    /// Owner ids may themselves contain `_`, so a key is only decodable
    /// relative to a known owner.
    pub fn decode_for_owner(key: &str, owner: &UserId) -> Option<Self> {
        let prefix = Self::owner_prefix(owner);
        let resource = key.strip_prefix(prefix.as_str())?;
        if resource.is_empty() {
            return None;
        }
        Some(Self::new(owner, &ResourceKey::new(resource)))
    }
}
