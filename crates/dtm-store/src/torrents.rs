//! Torrent catalog rows: upsert, lookup, and the failed-set query that
//! feeds the reinjection worker.

use chrono::{DateTime, Utc};
use dtm_core::{Priority, Torrent, TorrentStatus};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::{Store, StoreError, StoreResult};

fn row_to_torrent(row: &SqliteRow) -> StoreResult<Torrent> {
    let status_label: String = row.try_get("status").map_err(|source| StoreError::query("decode torrent", source))?;
    let status = TorrentStatus::from_str(&status_label).ok_or_else(|| StoreError::UnknownStatus {
        value: status_label.clone(),
    })?;
    let priority_raw: i64 = row.try_get("priority").map_err(|source| StoreError::query("decode torrent", source))?;
    let size: i64 = row.try_get("size").map_err(|source| StoreError::query("decode torrent", source))?;
    let attempts_count: i64 = row
        .try_get("attempts_count")
        .map_err(|source| StoreError::query("decode torrent", source))?;
    let needs_symlink_cleanup: i64 = row
        .try_get("needs_symlink_cleanup")
        .map_err(|source| StoreError::query("decode torrent", source))?;

    Ok(Torrent {
        id: row.try_get("id").map_err(|source| StoreError::query("decode torrent", source))?,
        hash: row.try_get("hash").map_err(|source| StoreError::query("decode torrent", source))?,
        filename: row
            .try_get("filename")
            .map_err(|source| StoreError::query("decode torrent", source))?,
        status,
        size: size.max(0) as u64,
        added_date: row
            .try_get("added_date")
            .map_err(|source| StoreError::query("decode torrent", source))?,
        first_seen: row
            .try_get("first_seen")
            .map_err(|source| StoreError::query("decode torrent", source))?,
        last_seen: row
            .try_get("last_seen")
            .map_err(|source| StoreError::query("decode torrent", source))?,
        attempts_count: attempts_count.max(0) as u32,
        last_attempt: row
            .try_get("last_attempt")
            .map_err(|source| StoreError::query("decode torrent", source))?,
        last_success: row
            .try_get("last_success")
            .map_err(|source| StoreError::query("decode torrent", source))?,
        priority: Priority::from_i64(priority_raw),
        needs_symlink_cleanup: needs_symlink_cleanup != 0,
    })
}

impl Store {
    /// Insert a newly observed torrent, or refresh its mutable fields when
    /// a row with the same id already exists. `first_seen`, `attempts_count`,
    /// `last_attempt`, and `last_success` are preserved across the update —
    /// a re-observation must never roll back re-submission history.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the statement fails.
    pub async fn upsert_torrent(&self, torrent: &Torrent) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO torrents (
                id, hash, filename, status, size, added_date, first_seen, last_seen,
                attempts_count, last_attempt, last_success, priority, needs_symlink_cleanup
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                hash = excluded.hash,
                filename = excluded.filename,
                status = excluded.status,
                size = excluded.size,
                last_seen = excluded.last_seen,
                priority = excluded.priority,
                needs_symlink_cleanup = excluded.needs_symlink_cleanup",
        )
        .bind(&torrent.id)
        .bind(&torrent.hash)
        .bind(&torrent.filename)
        .bind(torrent.status.as_str())
        .bind(torrent.size as i64)
        .bind(torrent.added_date)
        .bind(torrent.first_seen)
        .bind(torrent.last_seen)
        .bind(i64::from(torrent.attempts_count))
        .bind(torrent.last_attempt)
        .bind(torrent.last_success)
        .bind(torrent.priority.as_i64())
        .bind(i64::from(torrent.needs_symlink_cleanup))
        .execute(self.pool())
        .await
        .map_err(|source| StoreError::query("upsert_torrent", source))?;
        Ok(())
    }

    /// Look up a single torrent by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the statement fails, or
    /// [`StoreError::UnknownStatus`] if the stored status label is not
    /// recognised.
    pub async fn get_torrent(&self, id: &str) -> StoreResult<Option<Torrent>> {
        let row = sqlx::query("SELECT * FROM torrents WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(|source| StoreError::query("get_torrent", source))?;
        row.as_ref().map(row_to_torrent).transpose()
    }

    /// Remove a torrent row outright, used when a permanent failure's
    /// cleanup sequence completes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the statement fails.
    pub async fn delete_torrent(&self, id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM torrents WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|source| StoreError::query("delete_torrent", source))?;
        Ok(())
    }

    /// List every torrent row, ordered by priority then recency, for the
    /// control plane's catalog listing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the statement fails.
    pub async fn list_torrents(&self) -> StoreResult<Vec<Torrent>> {
        let rows = sqlx::query("SELECT * FROM torrents ORDER BY priority DESC, last_seen DESC")
            .fetch_all(self.pool())
            .await
            .map_err(|source| StoreError::query("list_torrents", source))?;
        rows.iter().map(row_to_torrent).collect()
    }

    /// Torrents in [`dtm_core::FAILED_SET`] eligible for re-submission:
    /// excludes rows whose `last_attempt` falls within `exclude_recent` of
    /// `now`, and rows that have already exhausted `max_attempts`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the statement fails.
    pub async fn get_failed_torrents(
        &self,
        exclude_recent: chrono::Duration,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Torrent>> {
        let cutoff = now - exclude_recent;
        let statuses: Vec<&'static str> = dtm_core::FAILED_SET.iter().map(|status| status.as_str()).collect();
        let placeholders = statuses.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!(
            "SELECT * FROM torrents
             WHERE status IN ({placeholders})
               AND attempts_count < ?
               AND (last_attempt IS NULL OR last_attempt < ?)
             ORDER BY priority DESC, last_seen DESC"
        );
        let mut query = sqlx::query(&sql);
        for status in &statuses {
            query = query.bind(*status);
        }
        query = query.bind(i64::from(max_attempts)).bind(cutoff);

        let rows = query
            .fetch_all(self.pool())
            .await
            .map_err(|source| StoreError::query("get_failed_torrents", source))?;
        rows.iter().map(row_to_torrent).collect()
    }

    /// Mark every row whose `needs_symlink_cleanup` flag is set, returning
    /// their ids, and clear the flag. Used by the cleanup worker to pick up
    /// torrents a correlator pass flagged since the last sweep.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if either statement fails.
    pub async fn take_symlink_cleanup_queue(&self) -> StoreResult<Vec<String>> {
        let rows = sqlx::query("SELECT id FROM torrents WHERE needs_symlink_cleanup = 1")
            .fetch_all(self.pool())
            .await
            .map_err(|source| StoreError::query("take_symlink_cleanup_queue", source))?;
        let ids: Vec<String> = rows
            .iter()
            .map(|row| row.try_get::<String, _>("id"))
            .collect::<Result<_, _>>()
            .map_err(|source| StoreError::query("take_symlink_cleanup_queue", source))?;
        sqlx::query("UPDATE torrents SET needs_symlink_cleanup = 0 WHERE needs_symlink_cleanup = 1")
            .execute(self.pool())
            .await
            .map_err(|source| StoreError::query("take_symlink_cleanup_queue", source))?;
        Ok(ids)
    }
}
