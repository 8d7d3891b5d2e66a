//! Loader error types.

use crate::http::HttpError;
use thiserror::Error;
use zipline_cache::CacheError;
use zipline_core::ModuleId;

/// Errors surfaced by the loader, downloader, and fetch pipeline.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("network error: {0}")]
    Network(#[from] HttpError),

    #[error(transparent)]
    Core(#[from] zipline_core::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("engine rejected module '{module_id}': {reason}")]
    Engine { module_id: ModuleId, reason: String },

    #[error("invalid url '{url}': {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("load cancelled")]
    Cancelled,
}

/// Result type alias for loader operations.
pub type LoaderResult<T> = std::result::Result<T, LoaderError>;
