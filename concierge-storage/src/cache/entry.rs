//! The stored cache record.

use chrono::{DateTime, Utc};
use concierge_core::{CacheError, StorageError, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Schema version written into every entry. Entries carrying any other
/// version are discarded on read.
pub const CACHE_SCHEMA_VERSION: &str = "1.0";

/// One cached payload as stored on the host.
///
/// Serialized as `{ "data", "timestamp": <epoch ms>, "userId", "version" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: Value,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "userId")]
    pub owner_id: UserId,
    #[serde(rename = "version")]
    pub schema_version: String,
}

impl CacheEntry {
    pub fn new(data: Value, owner_id: UserId, timestamp: DateTime<Utc>) -> Self {
        Self {
            data,
            timestamp,
            owner_id,
            schema_version: CACHE_SCHEMA_VERSION.to_string(),
        }
    }

    pub fn encode(&self, key: &str) -> Result<String, StorageError> {
        serde_json::to_string(self).map_err(|e| StorageError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn decode(key: &str, raw: &str) -> Result<Self, StorageError> {
        serde_json::from_str(raw).map_err(|e| StorageError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Refuse entries written by another user or by another schema.
    pub fn validate(&self, key: &str, current_owner: &UserId) -> Result<(), CacheError> {
        if &self.owner_id != current_owner {
            return Err(CacheError::StaleOwnerMismatch {
                key: key.to_string(),
                expected: current_owner.to_string(),
                found: self.owner_id.to_string(),
            });
        }
        if self.schema_version != CACHE_SCHEMA_VERSION {
            return Err(CacheError::SchemaMismatch {
                key: key.to_string(),
                expected: CACHE_SCHEMA_VERSION.to_string(),
                found: self.schema_version.clone(),
            });
        }
        Ok(())
    }
}
