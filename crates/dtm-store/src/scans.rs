//! Resumable scan-progress cursors, one row per [`dtm_core::ScanKind`].

use chrono::{DateTime, Utc};
use dtm_core::{ScanKind, ScanProgress, ScanStatus};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::{Store, StoreError, StoreResult};

fn scan_kind_from_str(value: &str) -> StoreResult<ScanKind> {
    Ok(match value {
        "quick" => ScanKind::Quick,
        "full" => ScanKind::Full,
        "symlinks" => ScanKind::Symlinks,
        other => {
            return Err(StoreError::UnknownStatus {
                value: other.to_string(),
            });
        }
    })
}

fn scan_status_from_str(value: &str) -> StoreResult<ScanStatus> {
    Ok(match value {
        "idle" => ScanStatus::Idle,
        "running" => ScanStatus::Running,
        "completed" => ScanStatus::Completed,
        other => {
            return Err(StoreError::UnknownStatus {
                value: other.to_string(),
            });
        }
    })
}

const fn scan_status_as_str(status: ScanStatus) -> &'static str {
    match status {
        ScanStatus::Idle => "idle",
        ScanStatus::Running => "running",
        ScanStatus::Completed => "completed",
    }
}

fn row_to_scan_progress(row: &SqliteRow) -> StoreResult<ScanProgress> {
    let scan_type: String = row
        .try_get("scan_type")
        .map_err(|source| StoreError::query("decode scan_progress", source))?;
    let status: String = row
        .try_get("status")
        .map_err(|source| StoreError::query("decode scan_progress", source))?;
    let current_offset: i64 = row
        .try_get("current_offset")
        .map_err(|source| StoreError::query("decode scan_progress", source))?;
    let total_expected: Option<i64> = row
        .try_get("total_expected")
        .map_err(|source| StoreError::query("decode scan_progress", source))?;

    Ok(ScanProgress {
        scan_type: scan_kind_from_str(&scan_type)?,
        current_offset: current_offset.max(0) as u64,
        total_expected: total_expected.map(|value| value.max(0) as u64),
        last_scan_start: row
            .try_get("last_scan_start")
            .map_err(|source| StoreError::query("decode scan_progress", source))?,
        last_scan_complete: row
            .try_get("last_scan_complete")
            .map_err(|source| StoreError::query("decode scan_progress", source))?,
        status: scan_status_from_str(&status)?,
    })
}

/// Fields mutated on a scan-progress cursor by a running scan.
#[derive(Debug, Clone, Copy)]
pub struct ScanProgressUpdate {
    /// New pagination offset / walk position.
    pub current_offset: u64,
    /// Total items expected, when known.
    pub total_expected: Option<u64>,
    /// New lifecycle status.
    pub status: ScanStatus,
    /// Stamp to apply when the scan has just started, if any.
    pub scan_started: Option<DateTime<Utc>>,
    /// Stamp to apply when the scan has just completed, if any.
    pub scan_completed: Option<DateTime<Utc>>,
}

impl Store {
    /// Fetch the cursor for `kind`, or an idle default if the row has not
    /// been seeded yet (the scheduler seeds it on first run).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the statement fails.
    pub async fn get_scan_progress(&self, kind: ScanKind) -> StoreResult<ScanProgress> {
        let row = sqlx::query("SELECT * FROM scan_progress WHERE scan_type = ?")
            .bind(kind.as_str())
            .fetch_optional(self.pool())
            .await
            .map_err(|source| StoreError::query("get_scan_progress", source))?;
        match row {
            Some(row) => row_to_scan_progress(&row),
            None => Ok(ScanProgress::idle(kind)),
        }
    }

    /// Upsert the cursor for `kind` with the fields in `update`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the statement fails.
    pub async fn update_scan_progress(&self, kind: ScanKind, update: ScanProgressUpdate) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO scan_progress (scan_type, current_offset, total_expected, last_scan_start, last_scan_complete, status)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(scan_type) DO UPDATE SET
                current_offset = excluded.current_offset,
                total_expected = COALESCE(excluded.total_expected, scan_progress.total_expected),
                last_scan_start = COALESCE(excluded.last_scan_start, scan_progress.last_scan_start),
                last_scan_complete = COALESCE(excluded.last_scan_complete, scan_progress.last_scan_complete),
                status = excluded.status",
        )
        .bind(kind.as_str())
        .bind(update.current_offset as i64)
        .bind(update.total_expected.map(|value| value as i64))
        .bind(update.scan_started)
        .bind(update.scan_completed)
        .bind(scan_status_as_str(update.status))
        .execute(self.pool())
        .await
        .map_err(|source| StoreError::query("update_scan_progress", source))?;
        Ok(())
    }
}
