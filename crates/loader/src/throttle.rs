//! Bounded-concurrency throttle for network downloads.

use crate::error::{LoaderError, LoaderResult};
use std::sync::{Arc, RwLock};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting semaphore bounding simultaneous HTTP downloads.
///
/// Reconfiguration swaps in a fresh semaphore of the new capacity; permits
/// already handed out drain against the old one, so in-flight downloads are
/// never interrupted.
pub struct DownloadThrottle {
    semaphore: RwLock<Arc<Semaphore>>,
}

impl DownloadThrottle {
    /// Create a throttle with `permits` download slots (must be positive).
    pub fn new(permits: usize) -> zipline_core::Result<Self> {
        Ok(Self {
            semaphore: RwLock::new(Self::semaphore_of(permits)?),
        })
    }

    /// Wait for a download slot.
    pub async fn acquire(&self) -> LoaderResult<OwnedSemaphorePermit> {
        let semaphore = self
            .semaphore
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        semaphore
            .acquire_owned()
            .await
            .map_err(|_| LoaderError::Cancelled)
    }

    /// Replace the throttle capacity.
    pub fn set_permits(&self, permits: usize) -> zipline_core::Result<()> {
        let fresh = Self::semaphore_of(permits)?;
        *self.semaphore.write().unwrap_or_else(|e| e.into_inner()) = fresh;
        Ok(())
    }

    fn semaphore_of(permits: usize) -> zipline_core::Result<Arc<Semaphore>> {
        if permits == 0 {
            return Err(zipline_core::Error::InvalidConfig(
                "concurrent_downloads must be at least 1".to_string(),
            ));
        }
        Ok(Arc::new(Semaphore::new(permits)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn rejects_zero_permits() {
        assert!(DownloadThrottle::new(0).is_err());
        let throttle = DownloadThrottle::new(1).unwrap();
        assert!(throttle.set_permits(0).is_err());
    }

    #[tokio::test]
    async fn single_permit_serializes_holders() {
        let throttle = Arc::new(DownloadThrottle::new(1).unwrap());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..4 {
            let throttle = Arc::clone(&throttle);
            let in_flight = Arc::clone(&in_flight);
            let max_in_flight = Arc::clone(&max_in_flight);
            tasks.spawn(async move {
                let _permit = throttle.acquire().await.unwrap();
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            });
        }
        while tasks.join_next().await.is_some() {}

        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reconfigure_replaces_capacity_while_old_permits_drain() {
        let throttle = DownloadThrottle::new(1).unwrap();
        let held = throttle.acquire().await.unwrap();

        throttle.set_permits(2).unwrap();

        // Two new slots are available immediately, independent of the
        // still-held permit from the old semaphore.
        let a = throttle.acquire().await.unwrap();
        let b = throttle.acquire().await.unwrap();
        drop((held, a, b));
    }
}
