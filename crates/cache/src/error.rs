//! Content cache error types.

use thiserror::Error;
use zipline_core::Digest;

/// Content cache operation errors.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("integrity mismatch for {expected}: fetched bytes hashed to {actual}")]
    IntegrityMismatch { expected: Digest, actual: Digest },

    #[error("corrupt cache entry {digest}: {detail}")]
    CorruptEntry { digest: Digest, detail: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;
