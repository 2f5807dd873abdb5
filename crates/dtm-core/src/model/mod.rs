//! Entities for the torrent catalog and the symlink-walk pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of provider-reported and synthetic torrent states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentStatus {
    /// The provider rejected the magnet as malformed.
    MagnetError,
    /// An unspecified provider-side error.
    Error,
    /// The provider's antivirus scan rejected the content.
    Virus,
    /// The provider marked the download dead (no seeders/sources).
    Dead,
    /// Actively downloading on the provider.
    Downloading,
    /// Fully downloaded and available.
    Downloaded,
    /// Queued on the provider, not yet started.
    Queued,
    /// Uploading to the provider's cache.
    Uploading,
    /// Provider-side compression/packaging step.
    Compressing,
    /// Synthetic state set only by the correlator when a catalog entry's
    /// local symlink has gone broken. Never reported by the provider.
    SymlinkBroken,
}

/// States considered failed for the purposes of re-submission. `SymlinkBroken`
/// is synthetic and only ever set by the correlator.
pub const FAILED_SET: [TorrentStatus; 5] = [
    TorrentStatus::MagnetError,
    TorrentStatus::Error,
    TorrentStatus::Virus,
    TorrentStatus::Dead,
    TorrentStatus::SymlinkBroken,
];

impl TorrentStatus {
    /// Whether this status is a member of [`FAILED_SET`].
    #[must_use]
    pub fn is_failed(self) -> bool {
        FAILED_SET.contains(&self)
    }

    /// Stable wire label, used by the store and the control plane.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MagnetError => "magnet_error",
            Self::Error => "error",
            Self::Virus => "virus",
            Self::Dead => "dead",
            Self::Downloading => "downloading",
            Self::Downloaded => "downloaded",
            Self::Queued => "queued",
            Self::Uploading => "uploading",
            Self::Compressing => "compressing",
            Self::SymlinkBroken => "symlink_broken",
        }
    }

    /// Parse the stable wire label back into a status.
    #[must_use]
    pub fn from_str(value: &str) -> Option<Self> {
        Some(match value {
            "magnet_error" => Self::MagnetError,
            "error" => Self::Error,
            "virus" => Self::Virus,
            "dead" => Self::Dead,
            "downloading" => Self::Downloading,
            "downloaded" => Self::Downloaded,
            "queued" => Self::Queued,
            "uploading" => Self::Uploading,
            "compressing" => Self::Compressing,
            "symlink_broken" => Self::SymlinkBroken,
            _ => return None,
        })
    }
}

/// Priority band for re-submission ordering. Symlink-promoted torrents are
/// always [`Priority::High`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Priority {
    /// Default priority for freshly observed torrents.
    Normal = 1,
    /// Elevated priority, currently unused by any producer but reserved.
    Elevated = 2,
    /// Highest priority; set by the correlator on promotion.
    High = 3,
}

impl Priority {
    /// Numeric wire value, as persisted by the store.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self as i64
    }

    /// Parse a persisted numeric value back into a priority band. Any value
    /// other than 1, 2, or 3 is treated as [`Priority::Normal`].
    #[must_use]
    pub const fn from_i64(value: i64) -> Self {
        match value {
            3 => Self::High,
            2 => Self::Elevated,
            _ => Self::Normal,
        }
    }
}

/// A single tracked remote torrent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Torrent {
    /// Opaque provider-assigned identifier.
    pub id: String,
    /// 40-character lower-hex info hash.
    pub hash: String,
    /// Display filename, at most 255 characters.
    pub filename: String,
    /// Current status.
    pub status: TorrentStatus,
    /// Size in bytes.
    pub size: u64,
    /// When the torrent was added on the provider.
    pub added_date: DateTime<Utc>,
    /// When this torrent was first observed by the manager.
    pub first_seen: DateTime<Utc>,
    /// When this torrent was last observed by the manager.
    pub last_seen: DateTime<Utc>,
    /// Count of re-submission attempts recorded so far.
    pub attempts_count: u32,
    /// Timestamp of the most recent attempt, if any.
    pub last_attempt: Option<DateTime<Utc>>,
    /// Timestamp of the most recent successful attempt, if any.
    pub last_success: Option<DateTime<Utc>>,
    /// Re-submission priority.
    pub priority: Priority,
    /// Set when a symlink-cleanup pass still owes this torrent a visit.
    pub needs_symlink_cleanup: bool,
}

impl Torrent {
    /// Build a freshly observed torrent row, as produced by a catalog scan.
    #[must_use]
    pub fn new_observed(
        id: impl Into<String>,
        hash: impl Into<String>,
        filename: impl Into<String>,
        status: TorrentStatus,
        size: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            hash: hash.into(),
            filename: filename.into(),
            status,
            size,
            added_date: now,
            first_seen: now,
            last_seen: now,
            attempts_count: 0,
            last_attempt: None,
            last_success: None,
            priority: Priority::Normal,
            needs_symlink_cleanup: false,
        }
    }

    /// Promote this torrent to the synthetic `symlink_broken` state at
    /// [`Priority::High`], as done by the correlator on a confident match.
    pub fn promote_symlink_broken(&mut self, now: DateTime<Utc>) {
        self.status = TorrentStatus::SymlinkBroken;
        self.priority = Priority::High;
        self.last_seen = now;
    }
}

/// A single re-submission attempt against the provider. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// Auto-assigned row id, absent before the row is persisted.
    pub id: Option<i64>,
    /// Torrent this attempt targets.
    pub torrent_id: String,
    /// When the attempt was made.
    pub attempt_date: DateTime<Utc>,
    /// Whether the attempt succeeded.
    pub success: bool,
    /// Error message, required when `success` is false.
    pub error_message: Option<String>,
    /// Round-trip time of the provider call, in milliseconds.
    pub response_time_ms: u64,
    /// Raw provider response label, or the dry-run sentinel.
    pub api_response: Option<String>,
}

/// Sentinel written to `api_response` for attempts synthesized in dry-run mode.
pub const DRY_RUN_API_RESPONSE: &str = "DRY-RUN simulation";

impl Attempt {
    /// Build a successful attempt record.
    #[must_use]
    pub fn success(
        torrent_id: impl Into<String>,
        now: DateTime<Utc>,
        response_time_ms: u64,
        api_response: Option<String>,
    ) -> Self {
        Self {
            id: None,
            torrent_id: torrent_id.into(),
            attempt_date: now,
            success: true,
            error_message: None,
            response_time_ms,
            api_response,
        }
    }

    /// Build a failed attempt record. `error_message` must be non-empty.
    #[must_use]
    pub fn failure(
        torrent_id: impl Into<String>,
        now: DateTime<Utc>,
        response_time_ms: u64,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            torrent_id: torrent_id.into(),
            attempt_date: now,
            success: false,
            error_message: Some(error_message.into()),
            response_time_ms,
            api_response: None,
        }
    }
}

/// The three distinct scan cadences the scheduler drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanKind {
    /// A shallow poll of recently changed torrents.
    Quick,
    /// A full paginated walk of the provider's catalog.
    Full,
    /// A walk of the local media tree correlated against the catalog.
    Symlinks,
}

impl ScanKind {
    /// Stable wire label used as the store's primary key component.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Full => "full",
            Self::Symlinks => "symlinks",
        }
    }
}

/// Lifecycle state of a scan cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// No scan of this kind is currently running.
    Idle,
    /// A scan of this kind is in progress; the cursor is resumable.
    Running,
    /// The most recent scan of this kind ran to completion.
    Completed,
}

/// Resumable cursor for one scan kind. Exactly one row exists per [`ScanKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanProgress {
    /// Which cadence this cursor tracks.
    pub scan_type: ScanKind,
    /// Current pagination offset into the provider catalog (or walk position).
    pub current_offset: u64,
    /// Total items expected, when known.
    pub total_expected: Option<u64>,
    /// When the current/most-recent scan started.
    pub last_scan_start: Option<DateTime<Utc>>,
    /// When the most recent scan completed.
    pub last_scan_complete: Option<DateTime<Utc>>,
    /// Current lifecycle state.
    pub status: ScanStatus,
}

impl ScanProgress {
    /// A freshly initialised, never-run cursor for `kind`.
    #[must_use]
    pub const fn idle(scan_type: ScanKind) -> Self {
        Self {
            scan_type,
            current_offset: 0,
            total_expected: None,
            last_scan_start: None,
            last_scan_complete: None,
            status: ScanStatus::Idle,
        }
    }

    /// Whether this cursor represents a resumable in-flight scan.
    #[must_use]
    pub fn is_resumable(&self) -> bool {
        matches!(self.status, ScanStatus::Running) && self.current_offset > 0
    }
}

/// A terminal, non-retryable failure recorded for a torrent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermanentFailure {
    /// Auto-assigned row id, absent before the row is persisted.
    pub id: Option<i64>,
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
    /// Whether the destructive cleanup + notify sequence has completed.
    pub processed: bool,
}

/// A deferred re-submission, scheduled for a future attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryQueueEntry {
    /// Auto-assigned row id, absent before the row is persisted.
    pub id: Option<i64>,
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
    /// Number of retry attempts made so far.
    pub retry_count: u32,
    /// When the most recent retry attempt was made, if any.
    pub last_retry_attempt: Option<DateTime<Utc>>,
}

impl RetryQueueEntry {
    /// Whether this row is due for another attempt, given `max_retries` and
    /// the current time.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>, max_retries: u32) -> bool {
        self.scheduled_retry <= now && self.retry_count < max_retries
    }
}

/// Classification of a symlink inspected by the walker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SymlinkStatus {
    /// `readlink` succeeded but the target does not resolve.
    Broken,
    /// Reading the first kibibyte of the target raised a filesystem error.
    IoError,
    /// The target resolves but is smaller than the minimum viable size.
    Small,
    /// The target resolves but is not readable.
    Inaccessible,
    /// Any other unexpected failure during inspection.
    Error,
}

/// An ephemeral record of one broken symlink found by the walker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokenSymlink {
    /// Path of the symlink itself.
    pub source_path: String,
    /// Raw target the symlink points at.
    pub target_path: String,
    /// Name extracted from the target, used for correlation.
    pub torrent_name: String,
    /// Classification.
    pub status: SymlinkStatus,
    /// Size in bytes, when determinable.
    pub size: u64,
    /// Error detail, when the classification stems from a caught error.
    pub error_message: Option<String>,
}

/// Singleton, persisted progress marker for the multi-hour symlink walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymlinkProcessingState {
    /// The subdirectory currently (or most recently) being walked.
    pub current_directory: String,
    /// Index of `current_directory` within the ordered subdirectory list.
    pub current_index: usize,
    /// Total subdirectories discovered under the root.
    pub total_directories: usize,
    /// Total symlinks found across the whole tree so far.
    pub total_symlinks_found: u64,
    /// Total symlinks processed (handed to a consumer) so far.
    pub total_processed: u64,
    /// When the last full walk completed.
    pub last_scan_date: Option<DateTime<Utc>>,
    /// Whether a walk is currently in progress (crash-resume marker).
    pub scan_in_progress: bool,
}

impl Default for SymlinkProcessingState {
    fn default() -> Self {
        Self {
            current_directory: String::new(),
            current_index: 0,
            total_directories: 0,
            total_symlinks_found: 0,
            total_processed: 0,
            last_scan_date: None,
            scan_in_progress: false,
        }
    }
}

impl SymlinkProcessingState {
    /// Whether a fresh full walk should be forced, given the configured
    /// refresh window.
    #[must_use]
    pub fn needs_rescan(&self, now: DateTime<Utc>, refresh: chrono::Duration) -> bool {
        if self.scan_in_progress || self.current_index == 0 {
            return true;
        }
        match self.last_scan_date {
            None => true,
            Some(last) => now - last > refresh,
        }
    }
}

/// An append-only counter/gauge sample recorded by the monitoring task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Auto-assigned row id, absent before the row is persisted.
    pub id: Option<i64>,
    /// When the sample was recorded.
    pub recorded_at: DateTime<Utc>,
    /// Metric name, e.g. `tests_performed`.
    pub name: String,
    /// Sample value.
    pub value: f64,
    /// Small free-form tag set, e.g. `{"operation_type": "test_injection"}`.
    pub tags: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn failed_set_matches_status_helper() {
        for status in FAILED_SET {
            assert!(status.is_failed());
        }
        assert!(!TorrentStatus::Downloaded.is_failed());
        assert!(!TorrentStatus::Queued.is_failed());
    }

    #[test]
    fn status_round_trips_through_wire_label() {
        let statuses = [
            TorrentStatus::MagnetError,
            TorrentStatus::Error,
            TorrentStatus::Virus,
            TorrentStatus::Dead,
            TorrentStatus::Downloading,
            TorrentStatus::Downloaded,
            TorrentStatus::Queued,
            TorrentStatus::Uploading,
            TorrentStatus::Compressing,
            TorrentStatus::SymlinkBroken,
        ];
        for status in statuses {
            let label = status.as_str();
            assert_eq!(TorrentStatus::from_str(label), Some(status));
        }
        assert_eq!(TorrentStatus::from_str("bogus"), None);
    }

    #[test]
    fn promote_sets_high_priority_and_synthetic_state() {
        let mut torrent = Torrent::new_observed(
            "T1",
            "a".repeat(40),
            "Foo Bar 2020 1080p x265",
            TorrentStatus::Downloaded,
            1024,
            now(),
        );
        torrent.promote_symlink_broken(now());
        assert_eq!(torrent.status, TorrentStatus::SymlinkBroken);
        assert_eq!(torrent.priority, Priority::High);
    }

    #[test]
    fn retry_entry_due_respects_max_and_schedule() {
        let entry = RetryQueueEntry {
            id: None,
            torrent_id: "T1".to_string(),
            filename: "f".to_string(),
            error_type: "too_many_requests".to_string(),
            error_message: "rate limited".to_string(),
            original_failure: now(),
            scheduled_retry: now(),
            retry_count: 2,
            last_retry_attempt: None,
        };
        assert!(entry.is_due(now(), 3));
        assert!(!entry.is_due(now(), 2));
        let future = RetryQueueEntry {
            scheduled_retry: now() + chrono::Duration::hours(1),
            ..entry
        };
        assert!(!future.is_due(now(), 3));
    }

    #[test]
    fn scan_progress_resumable_only_with_offset() {
        let fresh = ScanProgress::idle(ScanKind::Full);
        assert!(!fresh.is_resumable());
        let running = ScanProgress {
            current_offset: 2000,
            status: ScanStatus::Running,
            ..fresh
        };
        assert!(running.is_resumable());
    }

    #[test]
    fn symlink_state_forces_rescan_when_stale_or_interrupted() {
        let mut state = SymlinkProcessingState {
            current_index: 3,
            last_scan_date: Some(now()),
            scan_in_progress: false,
            ..SymlinkProcessingState::default()
        };
        assert!(!state.needs_rescan(now(), chrono::Duration::hours(24)));
        assert!(state.needs_rescan(now() + chrono::Duration::hours(25), chrono::Duration::hours(24)));
        state.scan_in_progress = true;
        assert!(state.needs_rescan(now(), chrono::Duration::hours(24)));
    }
}
