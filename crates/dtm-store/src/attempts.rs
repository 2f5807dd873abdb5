//! Append-only re-submission attempt log.

use chrono::{DateTime, Utc};
use dtm_core::Attempt;
use sqlx::Row;

use crate::{Store, StoreError, StoreResult};

/// What changed on the parent torrent row as a side effect of recording an
/// attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordAttemptOutcome {
    /// Row id assigned to the newly inserted attempt.
    pub attempt_id: i64,
}

impl Store {
    /// Record a re-submission attempt and bump the parent torrent's
    /// `attempts_count`/`last_attempt`/`last_success` counters in the same
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the insert, update, or commit fails.
    pub async fn record_attempt(&self, attempt: &Attempt) -> StoreResult<RecordAttemptOutcome> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|source| StoreError::query("record_attempt begin", source))?;

        let inserted = sqlx::query(
            "INSERT INTO attempts (torrent_id, attempt_date, success, error_message, response_time_ms, api_response)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&attempt.torrent_id)
        .bind(attempt.attempt_date)
        .bind(attempt.success)
        .bind(&attempt.error_message)
        .bind(attempt.response_time_ms as i64)
        .bind(&attempt.api_response)
        .execute(&mut *tx)
        .await
        .map_err(|source| StoreError::query("record_attempt insert", source))?;

        if attempt.success {
            sqlx::query(
                "UPDATE torrents SET attempts_count = attempts_count + 1, last_attempt = ?, last_success = ?
                 WHERE id = ?",
            )
            .bind(attempt.attempt_date)
            .bind(attempt.attempt_date)
            .bind(&attempt.torrent_id)
            .execute(&mut *tx)
            .await
            .map_err(|source| StoreError::query("record_attempt update", source))?;
        } else {
            sqlx::query("UPDATE torrents SET attempts_count = attempts_count + 1, last_attempt = ? WHERE id = ?")
                .bind(attempt.attempt_date)
                .bind(&attempt.torrent_id)
                .execute(&mut *tx)
                .await
                .map_err(|source| StoreError::query("record_attempt update", source))?;
        }

        tx.commit()
            .await
            .map_err(|source| StoreError::query("record_attempt commit", source))?;

        Ok(RecordAttemptOutcome {
            attempt_id: inserted.last_insert_rowid(),
        })
    }

    /// Fetch every attempt recorded at or after `since`, newest first. Backs
    /// `/stats`' rolling attempt count and success rate.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the statement fails.
    pub async fn get_attempts_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<Attempt>> {
        let rows = sqlx::query("SELECT * FROM attempts WHERE attempt_date >= ? ORDER BY attempt_date DESC")
            .bind(since)
            .fetch_all(self.pool())
            .await
            .map_err(|source| StoreError::query("get_attempts_since", source))?;

        rows.iter()
            .map(|row| {
                let response_time_ms: i64 = row
                    .try_get("response_time_ms")
                    .map_err(|source| StoreError::query("decode attempt", source))?;
                Ok(Attempt {
                    id: row.try_get("id").map_err(|source| StoreError::query("decode attempt", source))?,
                    torrent_id: row.try_get("torrent_id").map_err(|source| StoreError::query("decode attempt", source))?,
                    attempt_date: row.try_get("attempt_date").map_err(|source| StoreError::query("decode attempt", source))?,
                    success: row.try_get("success").map_err(|source| StoreError::query("decode attempt", source))?,
                    error_message: row.try_get("error_message").map_err(|source| StoreError::query("decode attempt", source))?,
                    response_time_ms: response_time_ms.max(0) as u64,
                    api_response: row.try_get("api_response").map_err(|source| StoreError::query("decode attempt", source))?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(torrent_id: &str, when: DateTime<Utc>, success: bool) -> Attempt {
        Attempt {
            id: None,
            torrent_id: torrent_id.to_string(),
            attempt_date: when,
            success,
            error_message: if success { None } else { Some("boom".to_string()) },
            response_time_ms: 12,
            api_response: Some("ok".to_string()),
        }
    }

    #[tokio::test]
    async fn get_attempts_since_excludes_older_rows() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let url = format!("sqlite://{}", file.path().display());
        let store = Store::connect(&url).await.unwrap();

        let old = DateTime::parse_from_rfc3339("2020-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let recent = Utc::now();
        store.record_attempt(&attempt("t1", old, true)).await.unwrap();
        store.record_attempt(&attempt("t1", recent, false)).await.unwrap();

        let cutoff = recent - chrono::Duration::hours(1);
        let attempts = store.get_attempts_since(cutoff).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert!(!attempts[0].success);
    }
}
