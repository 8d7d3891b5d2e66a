//! The content-addressed blob store.

use crate::clock::Clock;
use crate::db::MetadataDb;
use crate::error::{CacheError, CacheResult};
use bytes::Bytes;
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;
use zipline_core::{CacheConfig, Digest};

/// How long a caller waits before re-checking a digest another writer is
/// currently downloading.
const CLAIM_BACKOFF: Duration = Duration::from_millis(25);

/// A bounded content-addressed store mapping digest → verified bytes.
///
/// Blobs live at `<dir>/<hex(digest)>`; a SQLite index at
/// `<dir>/metadata.db` tracks entry state, size, and last access. Entries
/// are evicted least-recently-used once the total of `ready` sizes exceeds
/// the configured budget.
pub struct ContentCache {
    dir: PathBuf,
    db: MetadataDb,
    max_size_bytes: u64,
    clock: Arc<dyn Clock>,
}

impl ContentCache {
    /// Open a cache rooted at `config.dir`, creating the directory and
    /// database as needed.
    ///
    /// Recovers from a previous crash: stale `downloading` rows are
    /// released, leftover temp files deleted, and blob files with no
    /// `ready` row swept away.
    pub async fn open(config: &CacheConfig, clock: Arc<dyn Clock>) -> CacheResult<Self> {
        fs::create_dir_all(&config.dir).await?;
        let db = MetadataDb::open(config.dir.join("metadata.db")).await?;

        let cleared = db.clear_downloading().await?;
        if cleared > 0 {
            tracing::warn!(rows = cleared, "released stale download claims");
        }

        let cache = Self {
            dir: config.dir.clone(),
            db,
            max_size_bytes: config.max_size_bytes,
            clock,
        };
        cache.sweep_orphans().await?;
        Ok(cache)
    }

    /// Get the verified bytes for `digest`, producing and persisting them
    /// on a miss.
    ///
    /// On a hit the blob is re-hashed before serving; a mismatch evicts the
    /// entry and retries once as a miss. On a miss this caller claims the
    /// digest (at most one producer runs per digest across concurrent
    /// callers), verifies the produced bytes against `digest`, writes the
    /// blob atomically, then prunes the cache back under budget. Callers
    /// that observe another writer's claim wait and re-check.
    #[instrument(skip(self, producer), fields(digest = %digest))]
    pub async fn get_or_put<E, F, Fut>(&self, digest: Digest, producer: F) -> Result<Bytes, E>
    where
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, E>>,
    {
        let key = digest.to_hex();
        let mut corrupt_retried = false;

        // Resolve to either a served hit or an exclusive download claim.
        loop {
            match self.db.entry(&key).await.map_err(E::from)? {
                Some(row) if row.is_ready() => match self.read_verified(&digest, &key).await {
                    Ok(bytes) => {
                        self.db
                            .touch(&key, self.clock.now_ms())
                            .await
                            .map_err(E::from)?;
                        return Ok(bytes);
                    }
                    Err(err @ CacheError::CorruptEntry { .. }) => {
                        self.evict(&key).await.map_err(E::from)?;
                        if corrupt_retried {
                            return Err(E::from(err));
                        }
                        tracing::warn!(digest = %digest, "evicted corrupt cache entry, refetching");
                        corrupt_retried = true;
                    }
                    Err(err) => return Err(E::from(err)),
                },
                Some(_) => tokio::time::sleep(CLAIM_BACKOFF).await,
                None => {
                    if self
                        .db
                        .try_claim(&key, self.clock.now_ms())
                        .await
                        .map_err(E::from)?
                    {
                        break;
                    }
                }
            }
        }

        self.produce_into_claim(digest, key, producer).await
    }

    /// Evict `ready` entries least-recently-used first until the total size
    /// is within budget. Called after every successful write.
    pub async fn prune(&self) -> CacheResult<()> {
        let mut total = self.db.ready_total_size().await?;
        while total > self.max_size_bytes as i64 {
            let Some(victim) = self.db.lru_ready_entry().await? else {
                break;
            };
            self.remove_blob(&victim.digest).await?;
            self.db.remove(&victim.digest).await?;
            total -= victim.size_bytes;
            tracing::debug!(
                digest = %victim.digest,
                size = victim.size_bytes,
                "evicted cache entry"
            );
        }
        Ok(())
    }

    /// Run the producer under an exclusive claim and persist the result.
    async fn produce_into_claim<E, F, Fut>(
        &self,
        digest: Digest,
        key: String,
        producer: F,
    ) -> Result<Bytes, E>
    where
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, E>>,
    {
        let temp_path = self.dir.join(format!("{key}.tmp.{}", Uuid::new_v4()));
        let guard = ClaimGuard::new(self.db.clone(), key.clone(), temp_path.clone());

        let bytes = match producer().await {
            Ok(bytes) => bytes,
            Err(err) => {
                guard.cleanup().await;
                return Err(err);
            }
        };

        let actual = Digest::compute(&bytes);
        if actual != digest {
            guard.cleanup().await;
            return Err(E::from(CacheError::IntegrityMismatch {
                expected: digest,
                actual,
            }));
        }

        if let Err(err) = self.write_blob(&temp_path, &key, &bytes).await {
            guard.cleanup().await;
            return Err(E::from(err));
        }

        if let Err(err) = self
            .db
            .mark_ready(&key, bytes.len() as i64, self.clock.now_ms())
            .await
        {
            // The blob is already in place; take it back out so no file
            // exists without a ready row.
            let _ = fs::remove_file(self.blob_path(&key)).await;
            guard.cleanup().await;
            return Err(E::from(err));
        }

        guard.disarm();
        self.prune().await.map_err(E::from)?;
        Ok(bytes)
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Read a `ready` blob and check it still hashes to its key.
    async fn read_verified(&self, digest: &Digest, key: &str) -> CacheResult<Bytes> {
        let data = match fs::read(self.blob_path(key)).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CacheError::CorruptEntry {
                    digest: *digest,
                    detail: "blob file missing".to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let actual = Digest::compute(&data);
        if actual != *digest {
            return Err(CacheError::CorruptEntry {
                digest: *digest,
                detail: format!("blob hashed to {actual}"),
            });
        }
        Ok(Bytes::from(data))
    }

    /// Write to a temp file, fsync, then rename into place.
    async fn write_blob(&self, temp_path: &Path, key: &str, data: &[u8]) -> CacheResult<()> {
        {
            let mut file = fs::File::create(temp_path).await?;
            file.write_all(data).await?;
            // Ensure data is flushed to disk before rename.
            file.sync_all().await?;
        }
        fs::rename(temp_path, self.blob_path(key)).await?;
        Ok(())
    }

    async fn remove_blob(&self, key: &str) -> CacheResult<()> {
        match fs::remove_file(self.blob_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn evict(&self, key: &str) -> CacheResult<()> {
        self.remove_blob(key).await?;
        self.db.remove(key).await
    }

    /// Delete temp files and blob files with no backing `ready` row.
    async fn sweep_orphans(&self) -> CacheResult<()> {
        let ready: HashSet<String> = self.db.ready_digests().await?.into_iter().collect();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with("metadata.db") {
                continue;
            }
            if name.contains(".tmp.") || (is_hex_digest(&name) && !ready.contains(&name)) {
                tracing::debug!(file = %name, "removing orphaned cache file");
                let _ = fs::remove_file(entry.path()).await;
            }
        }
        Ok(())
    }
}

fn is_hex_digest(name: &str) -> bool {
    name.len() == 64 && name.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Releases a download claim if the producing call never completes.
///
/// Normal completion and handled errors disarm or clean up explicitly; the
/// `Drop` path only fires when the future is cancelled mid-produce, where it
/// deletes the temp file and claim row so waiters are not stuck behind a
/// dead `downloading` entry.
struct ClaimGuard {
    db: MetadataDb,
    key: String,
    temp_path: PathBuf,
    armed: bool,
}

impl ClaimGuard {
    fn new(db: MetadataDb, key: String, temp_path: PathBuf) -> Self {
        Self {
            db,
            key,
            temp_path,
            armed: true,
        }
    }

    /// Remove the temp file and claim row now, on a failure path.
    async fn cleanup(mut self) {
        self.armed = false;
        let _ = fs::remove_file(&self.temp_path).await;
        if let Err(err) = self.db.remove(&self.key).await {
            tracing::warn!(digest = %self.key, error = %err, "failed to release download claim");
        }
    }

    /// The entry was committed; nothing to release.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let db = self.db.clone();
        let key = std::mem::take(&mut self.key);
        let temp_path = std::mem::take(&mut self.temp_path);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = fs::remove_file(&temp_path).await;
                let _ = db.remove(&key).await;
            });
        }
    }
}
