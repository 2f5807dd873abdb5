//! Historical record of broken symlinks found by the walker, backing the
//! control plane's `/symlinks/broken` endpoint.

use chrono::{DateTime, Utc};
use dtm_core::{BrokenSymlink, SymlinkStatus};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::{Store, StoreError, StoreResult};

/// A broken symlink observation plus the bookkeeping fields the store owns.
#[derive(Debug, Clone)]
pub struct NewSymlinkHistoryEntry {
    /// The observation itself.
    pub symlink: BrokenSymlink,
    /// When the walker recorded it.
    pub recorded_at: DateTime<Utc>,
}

const fn symlink_status_as_str(status: SymlinkStatus) -> &'static str {
    match status {
        SymlinkStatus::Broken => "BROKEN",
        SymlinkStatus::IoError => "IO_ERROR",
        SymlinkStatus::Small => "SMALL",
        SymlinkStatus::Inaccessible => "INACCESSIBLE",
        SymlinkStatus::Error => "ERROR",
    }
}

fn symlink_status_from_str(value: &str) -> StoreResult<SymlinkStatus> {
    Ok(match value {
        "BROKEN" => SymlinkStatus::Broken,
        "IO_ERROR" => SymlinkStatus::IoError,
        "SMALL" => SymlinkStatus::Small,
        "INACCESSIBLE" => SymlinkStatus::Inaccessible,
        "ERROR" => SymlinkStatus::Error,
        other => {
            return Err(StoreError::UnknownStatus {
                value: other.to_string(),
            });
        }
    })
}

fn row_to_broken_symlink(row: &SqliteRow) -> StoreResult<BrokenSymlink> {
    let status: String = row
        .try_get("status")
        .map_err(|source| StoreError::query("decode symlink_history", source))?;
    let size: i64 = row
        .try_get("size")
        .map_err(|source| StoreError::query("decode symlink_history", source))?;
    Ok(BrokenSymlink {
        source_path: row
            .try_get("source_path")
            .map_err(|source| StoreError::query("decode symlink_history", source))?,
        target_path: row
            .try_get("target_path")
            .map_err(|source| StoreError::query("decode symlink_history", source))?,
        torrent_name: row
            .try_get("torrent_name")
            .map_err(|source| StoreError::query("decode symlink_history", source))?,
        status: symlink_status_from_str(&status)?,
        size: size.max(0) as u64,
        error_message: row
            .try_get("error_message")
            .map_err(|source| StoreError::query("decode symlink_history", source))?,
    })
}

impl Store {
    /// Append a broken-symlink observation to the history table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the statement fails.
    pub async fn insert_symlink_history(&self, entry: &NewSymlinkHistoryEntry) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO symlink_processing_history
                (source_path, target_path, torrent_name, status, size, error_message, recorded_at, processed)
             VALUES (?, ?, ?, ?, ?, ?, ?, 0)",
        )
        .bind(&entry.symlink.source_path)
        .bind(&entry.symlink.target_path)
        .bind(&entry.symlink.torrent_name)
        .bind(symlink_status_as_str(entry.symlink.status))
        .bind(entry.symlink.size as i64)
        .bind(&entry.symlink.error_message)
        .bind(entry.recorded_at)
        .execute(self.pool())
        .await
        .map_err(|source| StoreError::query("insert_symlink_history", source))?;
        Ok(())
    }

    /// List the most recently recorded broken symlinks, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the statement fails.
    pub async fn list_symlink_history(&self, limit: u32) -> StoreResult<Vec<BrokenSymlink>> {
        let rows = sqlx::query("SELECT * FROM symlink_processing_history ORDER BY recorded_at DESC LIMIT ?")
            .bind(i64::from(limit))
            .fetch_all(self.pool())
            .await
            .map_err(|source| StoreError::query("list_symlink_history", source))?;
        rows.iter().map(row_to_broken_symlink).collect()
    }

    /// List recorded broken symlinks, newest first, optionally restricted to
    /// rows matching `processed`. Backs the control plane's `GET
    /// /symlinks/broken?limit=&processed=` endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the statement fails.
    pub async fn list_symlink_history_filtered(&self, limit: u32, processed: Option<bool>) -> StoreResult<Vec<BrokenSymlink>> {
        let rows = match processed {
            None => {
                sqlx::query("SELECT * FROM symlink_processing_history ORDER BY recorded_at DESC LIMIT ?")
                    .bind(i64::from(limit))
                    .fetch_all(self.pool())
                    .await
            }
            Some(flag) => {
                sqlx::query(
                    "SELECT * FROM symlink_processing_history WHERE processed = ? ORDER BY recorded_at DESC LIMIT ?",
                )
                .bind(i64::from(flag))
                .bind(i64::from(limit))
                .fetch_all(self.pool())
                .await
            }
        }
        .map_err(|source| StoreError::query("list_symlink_history_filtered", source))?;
        rows.iter().map(row_to_broken_symlink).collect()
    }

    /// Mark every currently-unprocessed history row as processed, once the
    /// correlator has folded them into the catalog for this pass.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the statement fails.
    pub async fn mark_symlink_history_processed(&self) -> StoreResult<()> {
        sqlx::query("UPDATE symlink_processing_history SET processed = 1 WHERE processed = 0")
            .execute(self.pool())
            .await
            .map_err(|source| StoreError::query("mark_symlink_history_processed", source))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtm_core::SymlinkStatus;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn entry(name: &str) -> NewSymlinkHistoryEntry {
        NewSymlinkHistoryEntry {
            symlink: BrokenSymlink {
                source_path: format!("/media/{name}"),
                target_path: format!("/mnt/torrents/{name}/file.mkv"),
                torrent_name: name.to_string(),
                status: SymlinkStatus::Broken,
                size: 0,
                error_message: None,
            },
            recorded_at: now(),
        }
    }

    #[tokio::test]
    async fn filtered_listing_respects_processed_flag() {
        let store = crate::Store::from_pool(sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap())
            .await
            .unwrap();
        store.insert_symlink_history(&entry("a")).await.unwrap();
        store.insert_symlink_history(&entry("b")).await.unwrap();
        store.mark_symlink_history_processed().await.unwrap();
        store.insert_symlink_history(&entry("c")).await.unwrap();

        let unprocessed = store.list_symlink_history_filtered(10, Some(false)).await.unwrap();
        assert_eq!(unprocessed.len(), 1);
        assert_eq!(unprocessed[0].torrent_name, "c");

        let processed = store.list_symlink_history_filtered(10, Some(true)).await.unwrap();
        assert_eq!(processed.len(), 2);

        let all = store.list_symlink_history_filtered(10, None).await.unwrap();
        assert_eq!(all.len(), 3);
    }
}
