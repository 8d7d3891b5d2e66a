//! Shared helpers for content cache tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use zipline_cache::{Clock, ContentCache, SystemClock};
use zipline_core::CacheConfig;

/// A clock the test advances by hand, for deterministic LRU ordering.
#[derive(Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn at(now_ms: i64) -> Arc<Self> {
        let clock = Self::default();
        clock.now_ms.store(now_ms, Ordering::SeqCst);
        Arc::new(clock)
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Open a cache in a fresh temp directory with the given budget.
pub async fn cache_with_budget(max_size_bytes: u64) -> (tempfile::TempDir, ContentCache) {
    let dir = tempfile::tempdir().unwrap();
    let config = CacheConfig {
        dir: dir.path().to_path_buf(),
        max_size_bytes,
    };
    let cache = ContentCache::open(&config, Arc::new(SystemClock))
        .await
        .unwrap();
    (dir, cache)
}

/// Same, against a manual clock.
pub async fn cache_with_clock(
    max_size_bytes: u64,
    clock: Arc<ManualClock>,
) -> (tempfile::TempDir, ContentCache) {
    let dir = tempfile::tempdir().unwrap();
    let config = CacheConfig {
        dir: dir.path().to_path_buf(),
        max_size_bytes,
    };
    let cache = ContentCache::open(&config, clock).await.unwrap();
    (dir, cache)
}
