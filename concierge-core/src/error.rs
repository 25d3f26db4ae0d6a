//! Error types for Concierge operations

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// How an upstream fetch failed.
///
/// Derived from the status code carried in the fetch envelope: `0` means the
/// transport never produced a response, `>= 500` is a server failure and
/// everything else is treated as the client's fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    Server,
    Client,
}

impl FailureKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            0 => FailureKind::Transport,
            s if s >= 500 => FailureKind::Server,
            _ => FailureKind::Client,
        }
    }

    /// Transport and server failures may succeed on a later attempt.
    pub fn is_retryable(self) -> bool {
        matches!(self, FailureKind::Transport | FailureKind::Server)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Transport => "transport",
            FailureKind::Server => "server",
            FailureKind::Client => "client",
        };
        f.write_str(name)
    }
}

/// A failed upstream fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind} failure (status {status}): {message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub status: u16,
    pub message: String,
}

impl FetchError {
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::from_status(status),
            status,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::from_status(0, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Durable host storage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage quota exceeded writing {key}: {needed} bytes needed, {available} available")]
    QuotaExceeded {
        key: String,
        needed: usize,
        available: usize,
    },

    #[error("Corrupt entry {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Storage backend failure: {reason}")]
    Backend { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Reasons a stored cache entry is refused.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Cache entry {key} belongs to {found}, current user is {expected}")]
    StaleOwnerMismatch {
        key: String,
        expected: String,
        found: String,
    },

    #[error("Cache entry {key} has schema version {found}, expected {expected}")]
    SchemaMismatch {
        key: String,
        expected: String,
        found: String,
    },
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or CONCIERGE_CONFIG)")]
    MissingConfigPath,

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_from_status() {
        assert_eq!(FailureKind::from_status(0), FailureKind::Transport);
        assert_eq!(FailureKind::from_status(500), FailureKind::Server);
        assert_eq!(FailureKind::from_status(503), FailureKind::Server);
        assert_eq!(FailureKind::from_status(404), FailureKind::Client);
        assert_eq!(FailureKind::from_status(401), FailureKind::Client);
        assert_eq!(FailureKind::from_status(499), FailureKind::Client);
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(FailureKind::Transport.is_retryable());
        assert!(FailureKind::Server.is_retryable());
        assert!(!FailureKind::Client.is_retryable());
    }

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::from_status(502, "bad gateway");
        let msg = format!("{}", err);
        assert!(msg.contains("server failure"));
        assert!(msg.contains("502"));
        assert!(msg.contains("bad gateway"));

        let err = FetchError::transport("connection refused");
        assert_eq!(err.status, 0);
        assert_eq!(err.kind, FailureKind::Transport);
    }

    #[test]
    fn test_storage_error_display_quota() {
        let err = StorageError::QuotaExceeded {
            key: "cache_u1_users".to_string(),
            needed: 2048,
            available: 10,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("quota exceeded"));
        assert!(msg.contains("cache_u1_users"));
        assert!(msg.contains("2048"));
    }

    #[test]
    fn test_cache_error_display_owner_mismatch() {
        let err = CacheError::StaleOwnerMismatch {
            key: "cache_u2_users".to_string(),
            expected: "u2".to_string(),
            found: "u1".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("belongs to u1"));
        assert!(msg.contains("u2"));
    }

    proptest::proptest! {
        #[test]
        fn prop_only_transport_and_server_failures_retry(status in 0u16..600) {
            let err = FetchError::from_status(status, "failure");
            let expected = status == 0 || status >= 500;
            proptest::prop_assert_eq!(err.is_retryable(), expected);
        }
    }
}
