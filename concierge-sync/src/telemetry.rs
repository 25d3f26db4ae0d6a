//! Logging initialization.

use concierge_core::{LogFormat, LoggingSettings};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{AgentError, AgentResult};

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured filter. Fails if a
/// subscriber is already installed or the filter does not parse.
pub fn init_logging(settings: &LoggingSettings) -> AgentResult<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.filter)
            .map_err(|e| AgentError::Logging(format!("invalid log filter '{}': {}", settings.filter, e)))?,
    };

    let (json, pretty) = match settings.format {
        LogFormat::Json => (Some(fmt::layer().json()), None),
        LogFormat::Pretty => (None, Some(fmt::layer().with_target(true))),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json)
        .with(pretty)
        .try_init()
        .map_err(|e| AgentError::Logging(format!("failed to init subscriber: {}", e)))?;

    tracing::info!(format = ?settings.format, "logging initialized");
    Ok(())
}
