//! LMDB-backed profile storage.
//!
//! Uses the heed crate (Rust bindings for LMDB) so a native or terminal host
//! gets a durable profile store with the same string-keyed surface as a
//! browser's `localStorage`. Several processes may open the same directory;
//! LMDB serializes their write transactions but nothing above it coordinates
//! them, so the last committed write wins.

use std::path::Path;

use concierge_core::StorageError;
use heed::types::Str;
use heed::{Database, Env, EnvOpenOptions, MdbError};

use crate::host::HostStorage;

/// Error type for LMDB storage operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStorageError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// The memory map is full.
    #[error("LMDB map is full")]
    MapFull,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<heed::Error> for LmdbStorageError {
    fn from(e: heed::Error) -> Self {
        match e {
            heed::Error::Mdb(MdbError::MapFull) => LmdbStorageError::MapFull,
            other => LmdbStorageError::Transaction(other.to_string()),
        }
    }
}

/// Convert LmdbStorageError to StorageError.
impl From<LmdbStorageError> for StorageError {
    fn from(e: LmdbStorageError) -> Self {
        StorageError::Backend {
            reason: e.to_string(),
        }
    }
}

/// LMDB-backed [`HostStorage`].
///
/// # Example
///
/// ```ignore
/// use concierge_storage::{HostStorage, LmdbStorage};
///
/// let storage = LmdbStorage::open("/var/lib/concierge/profile", 64)?;
/// storage.set_item("realtime_updates_enabled", "true")?;
/// ```
pub struct LmdbStorage {
    env: Env,
    db: Database<Str, Str>,
}

impl LmdbStorage {
    /// Open (or create) a profile store in `path` with a map of `max_size_mb`.
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStorageError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per directory by this process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStorageError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn()?;
        let db: Database<Str, Str> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStorageError::DbOpen(e.to_string()))?;
        wtxn.commit()?;

        Ok(Self { env, db })
    }

    fn write(&self, key: &str, value: &str) -> Result<(), LmdbStorageError> {
        let mut wtxn = self.env.write_txn()?;
        self.db.put(&mut wtxn, key, value)?;
        wtxn.commit()?;
        Ok(())
    }
}

impl HostStorage for LmdbStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let rtxn = self.env.read_txn().map_err(LmdbStorageError::from)?;
        let value = self
            .db
            .get(&rtxn, key)
            .map_err(LmdbStorageError::from)?
            .map(str::to_string);
        Ok(value)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        match self.write(key, value) {
            Ok(()) => Ok(()),
            Err(LmdbStorageError::MapFull) => Err(StorageError::QuotaExceeded {
                key: key.to_string(),
                needed: key.len() + value.len(),
                available: 0,
            }),
            Err(other) => Err(other.into()),
        }
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbStorageError::from)?;
        self.db
            .delete(&mut wtxn, key)
            .map_err(LmdbStorageError::from)?;
        wtxn.commit().map_err(LmdbStorageError::from)?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let rtxn = self.env.read_txn().map_err(LmdbStorageError::from)?;
        let iter = self.db.iter(&rtxn).map_err(LmdbStorageError::from)?;

        let mut keys = Vec::new();
        for result in iter {
            match result {
                Ok((key, _)) => keys.push(key.to_string()),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable LMDB entry");
                    continue;
                }
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (LmdbStorage, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let storage = LmdbStorage::open(temp_dir.path(), 10).expect("storage open should succeed");
        (storage, temp_dir)
    }

    #[test]
    fn test_set_get_remove() {
        let (storage, _dir) = create_test_storage();

        assert_eq!(storage.get_item("cache_u1_users").unwrap(), None);
        storage.set_item("cache_u1_users", "{\"data\":1}").unwrap();
        assert_eq!(
            storage.get_item("cache_u1_users").unwrap(),
            Some("{\"data\":1}".to_string())
        );

        storage.remove_item("cache_u1_users").unwrap();
        storage.remove_item("cache_u1_users").unwrap();
        assert_eq!(storage.get_item("cache_u1_users").unwrap(), None);
    }

    #[test]
    fn test_keys_lists_everything() {
        let (storage, _dir) = create_test_storage();
        storage.set_item("b", "2").unwrap();
        storage.set_item("a", "1").unwrap();

        let keys = storage.keys().unwrap();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let temp_dir = TempDir::new().unwrap();
        {
            let storage = LmdbStorage::open(temp_dir.path(), 10).unwrap();
            storage.set_item("realtime_updates_enabled", "true").unwrap();
        }
        let storage = LmdbStorage::open(temp_dir.path(), 10).unwrap();
        assert_eq!(
            storage.get_item("realtime_updates_enabled").unwrap(),
            Some("true".to_string())
        );
    }
}
