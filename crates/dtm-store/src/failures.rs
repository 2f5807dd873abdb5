//! Permanent failures and the deferred retry queue.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use dtm_core::{PermanentFailure, RetryQueueEntry};

use crate::{Store, StoreError, StoreResult};

/// Fields needed to record a new permanent failure. `id` and `processed`
/// are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewPermanentFailure {
    /// Torrent this failure concerns.
    pub torrent_id: String,
    /// Display filename at the time of failure.
    pub filename: String,
    /// Classifier label, e.g. `infringing_file`.
    pub error_type: String,
    /// Raw error message from the provider.
    pub error_message: String,
    /// When the failure was recorded.
    pub failure_date: DateTime<Utc>,
}

/// Fields needed to schedule a new retry. `id` and `retry_count` are
/// assigned/managed by the store.
#[derive(Debug, Clone)]
pub struct NewRetryQueueEntry {
    /// Torrent this retry concerns.
    pub torrent_id: String,
    /// Display filename at the time of failure.
    pub filename: String,
    /// Classifier label, e.g. `too_many_requests`.
    pub error_type: String,
    /// Raw error message from the provider.
    pub error_message: String,
    /// When the original failure was observed.
    pub original_failure: DateTime<Utc>,
    /// When the next attempt is due.
    pub scheduled_retry: DateTime<Utc>,
}

fn row_to_permanent_failure(row: &SqliteRow) -> StoreResult<PermanentFailure> {
    let processed: i64 = row
        .try_get("processed")
        .map_err(|source| StoreError::query("decode permanent_failure", source))?;
    Ok(PermanentFailure {
        id: row
            .try_get("id")
            .map_err(|source| StoreError::query("decode permanent_failure", source))?,
        torrent_id: row
            .try_get("torrent_id")
            .map_err(|source| StoreError::query("decode permanent_failure", source))?,
        filename: row
            .try_get("filename")
            .map_err(|source| StoreError::query("decode permanent_failure", source))?,
        error_type: row
            .try_get("error_type")
            .map_err(|source| StoreError::query("decode permanent_failure", source))?,
        error_message: row
            .try_get("error_message")
            .map_err(|source| StoreError::query("decode permanent_failure", source))?,
        failure_date: row
            .try_get("failure_date")
            .map_err(|source| StoreError::query("decode permanent_failure", source))?,
        processed: processed != 0,
    })
}

fn row_to_retry_entry(row: &SqliteRow) -> StoreResult<RetryQueueEntry> {
    let retry_count: i64 = row
        .try_get("retry_count")
        .map_err(|source| StoreError::query("decode retry_queue", source))?;
    Ok(RetryQueueEntry {
        id: row.try_get("id").map_err(|source| StoreError::query("decode retry_queue", source))?,
        torrent_id: row
            .try_get("torrent_id")
            .map_err(|source| StoreError::query("decode retry_queue", source))?,
        filename: row
            .try_get("filename")
            .map_err(|source| StoreError::query("decode retry_queue", source))?,
        error_type: row
            .try_get("error_type")
            .map_err(|source| StoreError::query("decode retry_queue", source))?,
        error_message: row
            .try_get("error_message")
            .map_err(|source| StoreError::query("decode retry_queue", source))?,
        original_failure: row
            .try_get("original_failure")
            .map_err(|source| StoreError::query("decode retry_queue", source))?,
        scheduled_retry: row
            .try_get("scheduled_retry")
            .map_err(|source| StoreError::query("decode retry_queue", source))?,
        retry_count: retry_count.max(0) as u32,
        last_retry_attempt: row
            .try_get("last_retry_attempt")
            .map_err(|source| StoreError::query("decode retry_queue", source))?,
    })
}

impl Store {
    /// Record a terminal failure. Re-recording the same `(torrent_id,
    /// error_type)` pair refreshes the message and timestamp but leaves
    /// `processed` untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the statement fails.
    pub async fn upsert_permanent_failure(&self, failure: &NewPermanentFailure) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO permanent_failures (torrent_id, filename, error_type, error_message, failure_date, processed)
             VALUES (?, ?, ?, ?, ?, 0)
             ON CONFLICT(torrent_id, error_type) DO UPDATE SET
                filename = excluded.filename,
                error_message = excluded.error_message,
                failure_date = excluded.failure_date",
        )
        .bind(&failure.torrent_id)
        .bind(&failure.filename)
        .bind(&failure.error_type)
        .bind(&failure.error_message)
        .bind(failure.failure_date)
        .execute(self.pool())
        .await
        .map_err(|source| StoreError::query("upsert_permanent_failure", source))?;
        Ok(())
    }

    /// Fetch permanent failures awaiting the cleanup + notify sequence.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the statement fails.
    pub async fn get_unprocessed_permanent_failures(&self) -> StoreResult<Vec<PermanentFailure>> {
        let rows = sqlx::query("SELECT * FROM permanent_failures WHERE processed = 0 ORDER BY failure_date ASC")
            .fetch_all(self.pool())
            .await
            .map_err(|source| StoreError::query("get_unprocessed_permanent_failures", source))?;
        rows.iter().map(row_to_permanent_failure).collect()
    }

    /// Mark a permanent failure's cleanup + notify sequence complete.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the statement fails.
    pub async fn mark_permanent_failure_processed(&self, id: i64) -> StoreResult<()> {
        sqlx::query("UPDATE permanent_failures SET processed = 1 WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|source| StoreError::query("mark_permanent_failure_processed", source))?;
        Ok(())
    }

    /// Schedule a deferred retry, or refresh an existing one for the same
    /// `(torrent_id, error_type)` pair without resetting its retry count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the statement fails.
    pub async fn upsert_retry_queue(&self, entry: &NewRetryQueueEntry) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO retry_queue (
                torrent_id, filename, error_type, error_message, original_failure, scheduled_retry, retry_count
             ) VALUES (?, ?, ?, ?, ?, ?, 0)
             ON CONFLICT(torrent_id, error_type) DO UPDATE SET
                filename = excluded.filename,
                error_message = excluded.error_message,
                scheduled_retry = excluded.scheduled_retry",
        )
        .bind(&entry.torrent_id)
        .bind(&entry.filename)
        .bind(&entry.error_type)
        .bind(&entry.error_message)
        .bind(entry.original_failure)
        .bind(entry.scheduled_retry)
        .execute(self.pool())
        .await
        .map_err(|source| StoreError::query("upsert_retry_queue", source))?;
        Ok(())
    }

    /// Fetch retry rows due by `now`, regardless of `max_retries` — callers
    /// filter with [`RetryQueueEntry::is_due`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the statement fails.
    pub async fn get_pending_retries(&self, now: DateTime<Utc>) -> StoreResult<Vec<RetryQueueEntry>> {
        let rows = sqlx::query("SELECT * FROM retry_queue WHERE scheduled_retry <= ? ORDER BY scheduled_retry ASC")
            .bind(now)
            .fetch_all(self.pool())
            .await
            .map_err(|source| StoreError::query("get_pending_retries", source))?;
        rows.iter().map(row_to_retry_entry).collect()
    }

    /// Bump a retry row's attempt counter and stamp, after a re-submission
    /// attempt that itself failed (the row stays queued for the next
    /// window); deletes the row once `retry_count` reaches `max_retries`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if either statement fails.
    pub async fn bump_retry_attempt(
        &self,
        id: i64,
        now: DateTime<Utc>,
        next_scheduled: DateTime<Utc>,
        max_retries: u32,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE retry_queue SET retry_count = retry_count + 1, last_retry_attempt = ?, scheduled_retry = ?
             WHERE id = ?",
        )
        .bind(now)
        .bind(next_scheduled)
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(|source| StoreError::query("bump_retry_attempt", source))?;
        sqlx::query("DELETE FROM retry_queue WHERE id = ? AND retry_count >= ?")
            .bind(id)
            .bind(i64::from(max_retries))
            .execute(self.pool())
            .await
            .map_err(|source| StoreError::query("bump_retry_attempt prune", source))?;
        Ok(())
    }

    /// Remove a retry row outright, after a successful re-submission.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the statement fails.
    pub async fn delete_retry_queue(&self, id: i64) -> StoreResult<()> {
        sqlx::query("DELETE FROM retry_queue WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|source| StoreError::query("delete_retry_queue", source))?;
        Ok(())
    }
}
