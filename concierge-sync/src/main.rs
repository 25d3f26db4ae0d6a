//! Concierge sync agent entry point.
//!
//! Keeps the configured user's resources cached and fresh in an LMDB profile
//! store until interrupted.

use std::sync::Arc;

use concierge_core::{ConciergeConfig, SystemClock};
use concierge_storage::LmdbStorage;
use concierge_sync::error::AgentResult;
use concierge_sync::telemetry::init_logging;
use concierge_sync::{RestFetcher, SyncAgent, SystemMemory};

#[tokio::main]
async fn main() -> AgentResult<()> {
    let config = ConciergeConfig::load()?;
    init_logging(&config.logging)?;

    let storage = Arc::new(LmdbStorage::open(&config.storage.path, config.storage.max_size_mb)?);
    let fetcher = Arc::new(RestFetcher::new(&config.api, &config.resources)?);

    let agent = SyncAgent::build(
        config,
        storage,
        fetcher,
        Arc::new(SystemMemory::new()),
        Arc::new(SystemClock),
    );

    let tasks = agent.start();
    let failures = agent.refresh_all().await;
    if failures > 0 {
        tracing::warn!(failures, "some resources could not be loaded");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    tasks.stop_all();
    Ok(())
}
