//! Concierge Core - shared types
//!
//! Identities, resource keys, the error taxonomy, the clock capability and
//! configuration. Every other crate in the workspace depends on this one and
//! nothing here performs I/O except configuration loading.

pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod resource;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    ApiConfig, CacheSettings, ConciergeConfig, LogFormat, LoggingSettings, MemorySettings,
    RealtimeSettings, ResourceSettings, RetrySettings, SessionConfig, StorageSettings,
};
pub use error::{CacheError, ConfigError, FailureKind, FetchError, StorageError};
pub use identity::{Role, Session, UserId, UserIdentity};
pub use resource::ResourceKey;

/// Timestamp type using UTC timezone.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
