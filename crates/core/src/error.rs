//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    #[error("malformed zipline file: {0}")]
    MalformedZiplineFile(String),

    #[error("unsupported zipline file version: {0}")]
    UnsupportedFileVersion(u32),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
