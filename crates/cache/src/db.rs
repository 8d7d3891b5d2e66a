//! SQLite metadata index for the content cache.
//!
//! One row per content digest tracks the entry lifecycle (`downloading` →
//! `ready`), the blob size, and the last access time the LRU pruner keys on.

use crate::error::CacheResult;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const SCHEMA_SQL: &str = "\
CREATE TABLE IF NOT EXISTS cache_entry (
    digest TEXT PRIMARY KEY,
    size_bytes INTEGER NOT NULL,
    last_access_ms INTEGER NOT NULL,
    state TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cache_entry_lru
    ON cache_entry (state, last_access_ms, digest);
";

/// Lifecycle state of a cache entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryState {
    /// A writer holds the claim and is fetching the blob.
    Downloading,
    /// The blob is on disk and verified; only these entries are served.
    Ready,
}

impl EntryState {
    /// The string stored in the `state` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Downloading => "downloading",
            Self::Ready => "ready",
        }
    }
}

/// A persisted metadata row, one per content digest.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct CacheEntryRow {
    /// Lowercase hex digest; also the blob file name.
    pub digest: String,
    /// Blob size in bytes (0 while downloading).
    pub size_bytes: i64,
    /// Epoch-millis of the most recent read or write.
    pub last_access_ms: i64,
    /// Current [`EntryState`] as stored.
    pub state: String,
}

impl CacheEntryRow {
    /// Whether this entry is servable.
    pub fn is_ready(&self) -> bool {
        self.state == EntryState::Ready.as_str()
    }
}

/// Handle to the cache metadata database.
#[derive(Clone)]
pub struct MetadataDb {
    pool: Pool<Sqlite>,
}

impl MetadataDb {
    /// Open (creating if missing) the database at `path` and apply the
    /// schema.
    pub async fn open(path: impl AsRef<Path>) -> CacheResult<Self> {
        let path = path.as_ref();
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        // SQLite permits limited write concurrency; a single connection avoids
        // persistent "database is locked" failures under task concurrency.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> CacheResult<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Fetch the row for a digest, if any.
    pub async fn entry(&self, digest: &str) -> CacheResult<Option<CacheEntryRow>> {
        let row = sqlx::query_as(
            "SELECT digest, size_bytes, last_access_ms, state FROM cache_entry WHERE digest = ?",
        )
        .bind(digest)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Atomically claim a digest for download.
    ///
    /// Returns `true` if this caller inserted the `downloading` row, `false`
    /// if any row (either state) already exists for the digest.
    pub async fn try_claim(&self, digest: &str, now_ms: i64) -> CacheResult<bool> {
        let result = sqlx::query(
            "INSERT INTO cache_entry (digest, size_bytes, last_access_ms, state)
             VALUES (?, 0, ?, ?)
             ON CONFLICT(digest) DO NOTHING",
        )
        .bind(digest)
        .bind(now_ms)
        .bind(EntryState::Downloading.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Transition a claimed row to `ready` with its final size.
    pub async fn mark_ready(&self, digest: &str, size_bytes: i64, now_ms: i64) -> CacheResult<()> {
        sqlx::query(
            "UPDATE cache_entry SET size_bytes = ?, last_access_ms = ?, state = ? WHERE digest = ?",
        )
        .bind(size_bytes)
        .bind(now_ms)
        .bind(EntryState::Ready.as_str())
        .bind(digest)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a read access for LRU purposes.
    pub async fn touch(&self, digest: &str, now_ms: i64) -> CacheResult<()> {
        sqlx::query("UPDATE cache_entry SET last_access_ms = ? WHERE digest = ?")
            .bind(now_ms)
            .bind(digest)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete the row for a digest, if present.
    pub async fn remove(&self, digest: &str) -> CacheResult<()> {
        sqlx::query("DELETE FROM cache_entry WHERE digest = ?")
            .bind(digest)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Sum of blob sizes over `ready` rows.
    pub async fn ready_total_size(&self) -> CacheResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM cache_entry WHERE state = ?",
        )
        .bind(EntryState::Ready.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    /// The `ready` row least recently accessed, ties broken by ascending
    /// digest.
    pub async fn lru_ready_entry(&self) -> CacheResult<Option<CacheEntryRow>> {
        let row = sqlx::query_as(
            "SELECT digest, size_bytes, last_access_ms, state FROM cache_entry
             WHERE state = ? ORDER BY last_access_ms ASC, digest ASC LIMIT 1",
        )
        .bind(EntryState::Ready.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// All digests currently in `ready` state.
    pub async fn ready_digests(&self) -> CacheResult<Vec<String>> {
        let digests = sqlx::query_scalar("SELECT digest FROM cache_entry WHERE state = ?")
            .bind(EntryState::Ready.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(digests)
    }

    /// Delete all `downloading` rows. Called at open: a claim with no live
    /// claimant is a crash leftover.
    pub async fn clear_downloading(&self) -> CacheResult<u64> {
        let result = sqlx::query("DELETE FROM cache_entry WHERE state = ?")
            .bind(EntryState::Downloading.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
