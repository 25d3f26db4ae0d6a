//! Configuration loading for Concierge.
//!
//! All sections are required unless explicitly marked optional. The file is
//! TOML, located through `--config <path>` or `CONCIERGE_CONFIG`.

use crate::error::ConfigError;
use crate::identity::{Role, UserIdentity};
use crate::resource::ResourceKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConciergeConfig {
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub cache: CacheSettings,
    pub realtime: RealtimeSettings,
    pub retry: RetrySettings,
    pub memory: MemorySettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
    #[serde(default)]
    pub resources: Vec<ResourceSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    pub base_url: String,
    pub bearer_token: Option<String>,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    pub user_id: String,
    pub role: Role,
}

impl SessionConfig {
    pub fn identity(&self) -> UserIdentity {
        UserIdentity::new(self.user_id.clone(), self.role)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    pub default_stale_time_ms: u64,
    /// Per-resource overrides of `default_stale_time_ms`.
    #[serde(default)]
    pub stale_time_overrides_ms: BTreeMap<String, u64>,
    pub background_refresh_interval_ms: u64,
    /// How long an unobserved query stays in the query store.
    pub gc_time_ms: u64,
    pub refetch_on_window_focus: bool,
    pub refetch_on_reconnect: bool,
}

impl CacheSettings {
    pub fn stale_time_for(&self, key: &ResourceKey) -> Duration {
        let ms = self
            .stale_time_overrides_ms
            .get(key.as_str())
            .copied()
            .unwrap_or(self.default_stale_time_ms);
        Duration::from_millis(ms)
    }

    pub fn background_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.background_refresh_interval_ms)
    }

    pub fn gc_time(&self) -> Duration {
        Duration::from_millis(self.gc_time_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RealtimeSettings {
    pub privileged_interval_ms: u64,
    pub regular_interval_ms: u64,
    /// Lets every role opt into polling, not only the privileged tier.
    pub enable_for_users: bool,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            privileged_interval_ms: 60_000,
            regular_interval_ms: 300_000,
            enable_for_users: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    pub max_fetch_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_fetch_retries: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetrySettings {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let ms = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = ms.min(self.max_backoff_ms as f64);
        Duration::from_millis(capped as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemorySettings {
    pub sample_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSettings {
    /// Directory of the LMDB profile store.
    pub path: PathBuf,
    pub max_size_mb: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceSettings {
    pub key: String,
    /// Path appended to `api.base_url`.
    pub path: String,
}

impl ConciergeConfig {
    /// A complete configuration with the stock timings for the given API.
    pub fn default_for(base_url: impl Into<String>, session: SessionConfig) -> Self {
        Self {
            api: ApiConfig {
                base_url: base_url.into(),
                bearer_token: None,
                request_timeout_ms: 15_000,
            },
            session,
            cache: CacheSettings {
                default_stale_time_ms: 5 * 60 * 1000,
                stale_time_overrides_ms: BTreeMap::new(),
                background_refresh_interval_ms: 2 * 60 * 1000,
                gc_time_ms: 30 * 60 * 1000,
                refetch_on_window_focus: false,
                refetch_on_reconnect: true,
            },
            realtime: RealtimeSettings::default(),
            retry: RetrySettings::default(),
            memory: MemorySettings {
                sample_interval_ms: 10_000,
            },
            storage: StorageSettings {
                path: PathBuf::from("concierge-profile"),
                max_size_mb: 64,
            },
            logging: LoggingSettings {
                filter: "info".to_string(),
                format: LogFormat::Pretty,
            },
            resources: Vec::new(),
        }
    }

    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: ConciergeConfig = toml::from_str(contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.base_url.trim().is_empty() {
            return Err(invalid("api.base_url", "must not be empty"));
        }
        if self.api.request_timeout_ms == 0 {
            return Err(invalid("api.request_timeout_ms", "must be > 0"));
        }
        if self.session.user_id.trim().is_empty() {
            return Err(invalid("session.user_id", "must not be empty"));
        }
        if self.cache.default_stale_time_ms == 0 {
            return Err(invalid("cache.default_stale_time_ms", "must be > 0"));
        }
        if self.cache.background_refresh_interval_ms == 0 {
            return Err(invalid("cache.background_refresh_interval_ms", "must be > 0"));
        }
        if self.cache.gc_time_ms < self.cache.default_stale_time_ms {
            return Err(invalid(
                "cache.gc_time_ms",
                "must be >= cache.default_stale_time_ms",
            ));
        }
        if self.realtime.privileged_interval_ms == 0 {
            return Err(invalid("realtime.privileged_interval_ms", "must be > 0"));
        }
        if self.realtime.regular_interval_ms < self.realtime.privileged_interval_ms {
            return Err(invalid(
                "realtime.regular_interval_ms",
                "must be >= realtime.privileged_interval_ms",
            ));
        }
        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(invalid(
                "retry.max_backoff_ms",
                "must be >= retry.initial_backoff_ms",
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(invalid("retry.backoff_multiplier", "must be >= 1.0"));
        }
        if self.memory.sample_interval_ms == 0 {
            return Err(invalid("memory.sample_interval_ms", "must be > 0"));
        }
        if self.storage.path.as_os_str().is_empty() {
            return Err(invalid("storage.path", "must not be empty"));
        }
        if self.storage.max_size_mb == 0 {
            return Err(invalid("storage.max_size_mb", "must be > 0"));
        }
        if self.logging.filter.trim().is_empty() {
            return Err(invalid("logging.filter", "must not be empty"));
        }
        for resource in &self.resources {
            if resource.key.trim().is_empty() {
                return Err(invalid("resources.key", "must not be empty"));
            }
            if !resource.path.starts_with('/') {
                return Err(invalid(
                    "resources.path",
                    format!("'{}' must start with '/'", resource.path),
                ));
            }
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("CONCIERGE_CONFIG").ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> ConciergeConfig {
        ConciergeConfig::default_for(
            "http://localhost:8080",
            SessionConfig {
                user_id: "u-1".to_string(),
                role: Role::Admin,
            },
        )
    }

    const SAMPLE: &str = r#"
[api]
base_url = "https://hotel.example.com"
bearer_token = "secret"
request_timeout_ms = 5000

[session]
user_id = "staff-17"
role = "super_user"

[cache]
default_stale_time_ms = 300000
background_refresh_interval_ms = 120000
gc_time_ms = 1800000
refetch_on_window_focus = false
refetch_on_reconnect = true

[cache.stale_time_overrides_ms]
dashboard-charts = 600000

[realtime]
privileged_interval_ms = 60000
regular_interval_ms = 300000
enable_for_users = false

[retry]
max_fetch_retries = 3
initial_backoff_ms = 1000
max_backoff_ms = 30000
backoff_multiplier = 2.0

[memory]
sample_interval_ms = 10000

[storage]
path = "/tmp/concierge"
max_size_mb = 32

[logging]
filter = "concierge=debug"
format = "json"

[[resources]]
key = "users"
path = "/api/users"
"#;

    #[test]
    fn test_default_config_is_valid() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_parse_sample_config() {
        let config = ConciergeConfig::from_toml_str(SAMPLE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.session.role, Role::SuperUser);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.resources.len(), 1);
        assert_eq!(
            config.cache.stale_time_for(&ResourceKey::new("dashboard-charts")),
            Duration::from_secs(600)
        );
        assert_eq!(
            config.cache.stale_time_for(&ResourceKey::new("users")),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let contents = SAMPLE.replace("[memory]", "[memory]\nheap_mb = 5");
        assert!(matches!(
            ConciergeConfig::from_toml_str(&contents),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("concierge.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = ConciergeConfig::from_path(&path).unwrap();
        assert_eq!(config.api.base_url, "https://hotel.example.com");
    }

    #[test]
    fn test_config_requires_base_url() {
        let mut config = base_config();
        config.api.base_url = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "api.base_url",
                ..
            })
        ));
    }

    #[test]
    fn test_config_rejects_inverted_intervals() {
        let mut config = base_config();
        config.realtime.regular_interval_ms = 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_relative_resource_path() {
        let mut config = base_config();
        config.resources.push(ResourceSettings {
            key: "users".to_string(),
            path: "api/users".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let retry = RetrySettings::default();
        assert_eq!(retry.backoff_for(1), Duration::from_secs(1));
        assert_eq!(retry.backoff_for(2), Duration::from_secs(2));
        assert_eq!(retry.backoff_for(3), Duration::from_secs(4));
        assert_eq!(retry.backoff_for(10), Duration::from_secs(30));
    }
}
