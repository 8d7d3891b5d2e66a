//! Injectable time source.

use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the epoch-millisecond timestamps recorded in `last_access_ms`.
///
/// The cache never reads the wall clock directly so that LRU behaviour is
/// deterministic under test.
pub trait Clock: Send + Sync {
    /// Current time as milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;
}

/// Wall-clock implementation used in production.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}
