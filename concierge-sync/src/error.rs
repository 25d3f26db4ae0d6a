//! Error types for the sync agent.

use concierge_core::ConfigError;
use concierge_storage::LmdbStorageError;

use crate::fetcher::FetcherError;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Lmdb(#[from] LmdbStorageError),
    #[error(transparent)]
    Fetcher(#[from] FetcherError),
    #[error("Logging setup failed: {0}")]
    Logging(String),
}

pub type AgentResult<T> = Result<T, AgentError>;
