#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Embedded persistent catalog (§4.4): torrents, attempts, scan-progress
//! cursors, permanent failures, the retry queue, and symlink-walk history.
//!
//! Configured for concurrent readers and a single writer: WAL journal mode,
//! `synchronous = NORMAL`, a 256 MiB memory-mapped window, a 10 000-page
//! cache, and a 30 s busy timeout. Numbered migrations are applied in order
//! within a single transaction via `sqlx::migrate!`, which tracks the
//! applied set itself — running migrations twice is a no-op.

mod attempts;
mod error;
mod failures;
mod metrics;
mod scans;
mod symlinks;
mod torrents;

use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteSynchronous};

pub use error::{StoreError, StoreResult};
pub use failures::{NewPermanentFailure, NewRetryQueueEntry};
pub use symlinks::NewSymlinkHistoryEntry;

/// Default memory-mapped window size (§4.4).
pub const MMAP_SIZE_BYTES: i64 = 256 * 1024 * 1024;
/// Default page cache size, in pages (negative in SQLite's own pragma means
/// kibibytes, but the store configures a page count directly).
pub const CACHE_SIZE_PAGES: i64 = 10_000;
/// Default lock-wait before a writer gives up.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// The embedded relational store. Cheap to clone: wraps a pooled connection.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if necessary) the store at `database_url`, apply
    /// pending migrations, and configure the connection pragmas described
    /// above.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Migration`] if a pending migration fails, or
    /// [`StoreError::Query`] if the connection cannot be established. A
    /// migration failure at startup is fatal (§7).
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|source| StoreError::query("parse database url", source))?
            .create_if_missing(true)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            .pragma("mmap_size", MMAP_SIZE_BYTES.to_string())
            .pragma("cache_size", CACHE_SIZE_PAGES.to_string())
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|source| StoreError::query("connect", source))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Build a store around an already-configured pool, applying pending
    /// migrations. Used by tests that need a temp-file database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Migration`] if a pending migration fails.
    pub async fn from_pool(pool: SqlitePool) -> StoreResult<Self> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|source| StoreError::Migration { source })
    }

    /// Produce a full hot backup at `path` via `VACUUM INTO`, without
    /// blocking concurrent readers.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the backup fails.
    pub async fn backup(&self, path: &str) -> StoreResult<()> {
        sqlx::query("VACUUM INTO ?")
            .bind(path)
            .execute(&self.pool)
            .await
            .map_err(|source| StoreError::query("backup", source))?;
        Ok(())
    }

    /// Prune attempt and metric rows older than `retention_days`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if either delete fails.
    pub async fn cleanup_old(&self, retention_days: u32) -> StoreResult<()> {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(i64::from(retention_days));
        sqlx::query("DELETE FROM attempts WHERE attempt_date < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|source| StoreError::query("cleanup_old attempts", source))?;
        sqlx::query("DELETE FROM metrics WHERE recorded_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|source| StoreError::query("cleanup_old metrics", source))?;
        sqlx::query("DELETE FROM symlink_processing_history WHERE recorded_at < ? AND processed = 1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|source| StoreError::query("cleanup_old symlink history", source))?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

pub use attempts::RecordAttemptOutcome;
pub use scans::ScanProgressUpdate;
