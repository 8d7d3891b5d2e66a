//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default bound on concurrent network downloads.
pub const DEFAULT_CONCURRENT_DOWNLOADS: usize = 3;

/// Default cache budget: 100 MiB.
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 100 * 1024 * 1024;

/// Loader configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Application name reported in events and logs.
    pub application_name: String,
    /// Directory of trusted precompiled modules shipped with the host,
    /// consulted before the cache and the network.
    #[serde(default)]
    pub embedded_dir: Option<PathBuf>,
    /// Maximum simultaneous network downloads.
    #[serde(default = "default_concurrent_downloads")]
    pub concurrent_downloads: usize,
}

impl LoaderConfig {
    /// Create a config with defaults for the given application.
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            embedded_dir: None,
            concurrent_downloads: DEFAULT_CONCURRENT_DOWNLOADS,
        }
    }

    /// Validate field constraints.
    pub fn validate(&self) -> crate::Result<()> {
        if self.application_name.is_empty() {
            return Err(crate::Error::InvalidConfig(
                "application_name must not be empty".to_string(),
            ));
        }
        if self.concurrent_downloads == 0 {
            return Err(crate::Error::InvalidConfig(
                "concurrent_downloads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Content cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding blob files and the metadata database.
    pub dir: PathBuf,
    /// Cache budget in bytes; READY entries are evicted down to this bound.
    #[serde(default = "default_max_cache_size")]
    pub max_size_bytes: u64,
}

impl CacheConfig {
    /// Create a config with the default size budget.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_size_bytes: DEFAULT_MAX_CACHE_SIZE,
        }
    }
}

fn default_concurrent_downloads() -> usize {
    DEFAULT_CONCURRENT_DOWNLOADS
}

fn default_max_cache_size() -> u64 {
    DEFAULT_MAX_CACHE_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_populated() {
        let config = LoaderConfig::new("app");
        assert_eq!(config.concurrent_downloads, DEFAULT_CONCURRENT_DOWNLOADS);
        assert!(config.embedded_dir.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn serde_fills_missing_fields() {
        let config: LoaderConfig =
            serde_json::from_str(r#"{ "application_name": "app" }"#).unwrap();
        assert_eq!(config.concurrent_downloads, DEFAULT_CONCURRENT_DOWNLOADS);

        let cache: CacheConfig = serde_json::from_str(r#"{ "dir": "/tmp/cache" }"#).unwrap();
        assert_eq!(cache.max_size_bytes, DEFAULT_MAX_CACHE_SIZE);
    }

    #[test]
    fn validate_rejects_zero_downloads() {
        let mut config = LoaderConfig::new("app");
        config.concurrent_downloads = 0;
        assert!(config.validate().is_err());
    }
}
