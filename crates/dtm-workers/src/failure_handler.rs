//! Classifies a re-submission failure and drives either the destructive
//! orphan-cleanup path or the deferred-retry path (§4.7).

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dtm_config::{IndexerConfig, INDEXER_NOTIFY_SPACING};
use dtm_core::Torrent;
use dtm_fsops::Correlator;
use dtm_ratelimit::{OperationTag, RateGate};
use dtm_store::{NewPermanentFailure, NewRetryQueueEntry, Store};
use regex::Regex;
use tracing::{info, warn};

use crate::error::{WorkersError, WorkersResult};

/// Classification of a re-submission error message (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The provider rejected the item as copyright-infringing content.
    /// Terminal: the item will never succeed on re-submission.
    InfringingFile,
    /// The provider is rate-limiting this caller.
    TooManyRequests,
    /// Any other failure, not handled destructively or deferred.
    Unknown,
}

/// Classify `message` into a [`FailureClass`] by substring match, mirroring
/// the provider's own error vocabulary.
#[must_use]
pub fn classify(message: &str) -> FailureClass {
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("infringing") {
        FailureClass::InfringingFile
    } else if lowered.contains("too_many_requests") || lowered.contains("too many requests") || lowered.contains("rate limit") {
        FailureClass::TooManyRequests
    } else {
        FailureClass::Unknown
    }
}

/// What happened as a result of [`FailureHandler::handle`].
#[derive(Debug, Clone, PartialEq)]
pub enum FailureOutcome {
    /// The terminal path ran: a [`dtm_store::StoreError`]-free
    /// `PermanentFailure` row was recorded and `deleted_links` orphaned
    /// symlinks were removed (or would have been, in dry-run).
    Permanent {
        /// Count of orphan symlinks deleted (or logged as would-delete).
        deleted_links: usize,
    },
    /// The deferred path ran: a `RetryQueue` row was scheduled.
    Deferred,
    /// The message did not classify as either terminal or rate-limited; no
    /// action was taken beyond what the caller already recorded.
    Unknown,
}

/// Handles classified re-submission failures (§4.7).
pub struct FailureHandler {
    store: Store,
    correlator: Correlator,
    http: reqwest::Client,
    rate_gate: Arc<RateGate>,
    indexers: Vec<IndexerConfig>,
    retry_hold: chrono::Duration,
    dry_run: bool,
}

impl FailureHandler {
    /// Build a handler. `correlator` supplies the orphan-link similarity
    /// threshold (§4.6/§4.7); `rate_gate` paces downstream indexer POSTs
    /// under the `notify_media` tag.
    #[must_use]
    pub fn new(
        store: Store,
        correlator: Correlator,
        rate_gate: Arc<RateGate>,
        indexers: Vec<IndexerConfig>,
        retry_hold: chrono::Duration,
        dry_run: bool,
    ) -> Self {
        Self {
            store,
            correlator,
            http: reqwest::Client::new(),
            rate_gate,
            indexers,
            retry_hold,
            dry_run,
        }
    }

    /// Classify `error_message` and drive the corresponding path.
    ///
    /// # Errors
    ///
    /// Returns [`WorkersError`] if a store write, symlink deletion, or
    /// indexer notification fails.
    pub async fn handle(&self, torrent: &Torrent, error_message: &str, now: DateTime<Utc>) -> WorkersResult<FailureOutcome> {
        match classify(error_message) {
            FailureClass::InfringingFile => self.handle_infringing(torrent, error_message, now).await,
            FailureClass::TooManyRequests => self.handle_deferred(torrent, error_message, now).await,
            FailureClass::Unknown => Ok(FailureOutcome::Unknown),
        }
    }

    async fn handle_infringing(&self, torrent: &Torrent, error_message: &str, now: DateTime<Utc>) -> WorkersResult<FailureOutcome> {
        const ERROR_TYPE: &str = "infringing_file";

        self.store
            .upsert_permanent_failure(&NewPermanentFailure {
                torrent_id: torrent.id.clone(),
                filename: torrent.filename.clone(),
                error_type: ERROR_TYPE.to_string(),
                error_message: error_message.to_string(),
                failure_date: now,
            })
            .await?;

        let deleted_links = self.cleanup_orphans(torrent).await?;
        if deleted_links > 0 {
            self.notify_indexers().await?;
        }

        if let Some(failure_id) = self.find_unprocessed_failure_id(&torrent.id, ERROR_TYPE).await? {
            self.store.mark_permanent_failure_processed(failure_id).await?;
        }

        Ok(FailureOutcome::Permanent { deleted_links })
    }

    async fn find_unprocessed_failure_id(&self, torrent_id: &str, error_type: &str) -> WorkersResult<Option<i64>> {
        let pending = self.store.get_unprocessed_permanent_failures().await?;
        Ok(pending
            .into_iter()
            .find(|failure| failure.torrent_id == torrent_id && failure.error_type == error_type)
            .and_then(|failure| failure.id))
    }

    async fn cleanup_orphans(&self, torrent: &Torrent) -> WorkersResult<usize> {
        let history = self.store.list_symlink_history(10_000).await?;
        let mut deleted = 0usize;
        for entry in history {
            let link_name = Path::new(&entry.source_path)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| entry.source_path.clone());
            if !self.correlator.is_orphan_of(&torrent.filename, &link_name) {
                continue;
            }

            if self.dry_run {
                info!(path = %entry.source_path, torrent_id = %torrent.id, "would delete orphaned symlink (dry-run)");
            } else {
                match std::fs::remove_file(&entry.source_path) {
                    Ok(()) => info!(path = %entry.source_path, torrent_id = %torrent.id, "deleted orphaned symlink"),
                    Err(source) if source.kind() == std::io::ErrorKind::NotFound => {}
                    Err(source) => warn!(path = %entry.source_path, error = %source, "failed to delete orphaned symlink"),
                }
            }
            deleted += 1;
        }
        Ok(deleted)
    }

    async fn handle_deferred(&self, torrent: &Torrent, error_message: &str, now: DateTime<Utc>) -> WorkersResult<FailureOutcome> {
        self.store
            .upsert_retry_queue(&NewRetryQueueEntry {
                torrent_id: torrent.id.clone(),
                filename: torrent.filename.clone(),
                error_type: "too_many_requests".to_string(),
                error_message: error_message.to_string(),
                original_failure: now,
                scheduled_retry: now + self.retry_hold,
            })
            .await?;
        Ok(FailureOutcome::Deferred)
    }

    async fn notify_indexers(&self) -> WorkersResult<()> {
        for indexer in &self.indexers {
            let api_key = read_api_key(&indexer.api_key_config_path)?;
            for (index, command) in indexer.commands.iter().enumerate() {
                if index > 0 {
                    tokio::time::sleep(INDEXER_NOTIFY_SPACING).await;
                }
                self.rate_gate.acquire_default(OperationTag::NotifyMedia).await?;

                if self.dry_run {
                    info!(service = %indexer.name, command = %command, "would notify downstream indexer (dry-run)");
                    continue;
                }

                let url = format!("http://{}:{}/api/v3/command", indexer.host, indexer.port);
                let body = serde_json::json!({ "name": command });
                self.http
                    .post(&url)
                    .header("X-Api-Key", &api_key)
                    .json(&body)
                    .send()
                    .await
                    .map_err(|source| WorkersError::IndexerNotify {
                        service: indexer.name.clone(),
                        source,
                    })?;
                info!(service = %indexer.name, command = %command, "notified downstream indexer");
            }
        }
        Ok(())
    }
}

fn read_api_key(path: &std::path::Path) -> WorkersResult<String> {
    let contents = std::fs::read_to_string(path).map_err(|source| WorkersError::IndexerConfig {
        path: path.to_path_buf(),
        source,
    })?;
    let pattern = Regex::new(r"<ApiKey>([^<]+)</ApiKey>").expect("static regex is valid");
    pattern
        .captures(&contents)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().trim().to_string())
        .ok_or_else(|| WorkersError::IndexerApiKeyMissing { path: path.to_path_buf() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtm_core::{Priority, TorrentStatus};

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn torrent() -> Torrent {
        Torrent {
            id: "T1".to_string(),
            hash: "a".repeat(40),
            filename: "My Show S01E01 1080p".to_string(),
            status: TorrentStatus::SymlinkBroken,
            size: 10,
            added_date: now(),
            first_seen: now(),
            last_seen: now(),
            attempts_count: 1,
            last_attempt: Some(now()),
            last_success: None,
            priority: Priority::High,
            needs_symlink_cleanup: false,
        }
    }

    #[test]
    fn classify_matches_known_vocabulary() {
        assert_eq!(classify("content flagged as infringing_file"), FailureClass::InfringingFile);
        assert_eq!(classify("error too_many_requests, slow down"), FailureClass::TooManyRequests);
        assert_eq!(classify("unexpected server fault"), FailureClass::Unknown);
    }

    #[test]
    fn read_api_key_extracts_element() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.xml");
        std::fs::write(&path, "<Config><ApiKey>deadbeef1234</ApiKey></Config>").unwrap();
        assert_eq!(read_api_key(&path).unwrap(), "deadbeef1234");
    }

    #[test]
    fn read_api_key_rejects_missing_element() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.xml");
        std::fs::write(&path, "<Config></Config>").unwrap();
        assert!(matches!(read_api_key(&path), Err(WorkersError::IndexerApiKeyMissing { .. })));
    }

    #[tokio::test]
    async fn deferred_path_does_not_touch_permanent_failures() {
        let store = dtm_test_support::temp_store().await;
        let handler = FailureHandler::new(
            store.clone(),
            Correlator::new(0.7, 0.6),
            Arc::new(RateGate::new(250)),
            Vec::new(),
            chrono::Duration::hours(3),
            true,
        );
        let outcome = handler.handle(&torrent(), "too_many_requests", now()).await.unwrap();
        assert_eq!(outcome, FailureOutcome::Deferred);
        assert!(store.get_unprocessed_permanent_failures().await.unwrap().is_empty());
        let pending = store.get_pending_retries(now() + chrono::Duration::hours(4)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].torrent_id, "T1");
    }

    #[tokio::test]
    async fn infringing_path_marks_failure_processed_without_symlinks() {
        let store = dtm_test_support::temp_store().await;
        let handler = FailureHandler::new(
            store.clone(),
            Correlator::new(0.7, 0.6),
            Arc::new(RateGate::new(250)),
            Vec::new(),
            chrono::Duration::hours(3),
            true,
        );
        let outcome = handler.handle(&torrent(), "content is infringing_file", now()).await.unwrap();
        assert_eq!(outcome, FailureOutcome::Permanent { deleted_links: 0 });
        let pending = store.get_unprocessed_permanent_failures().await.unwrap();
        assert!(pending.is_empty(), "failure row must be marked processed");
    }

    #[tokio::test]
    async fn unknown_class_takes_no_action() {
        let store = dtm_test_support::temp_store().await;
        let handler = FailureHandler::new(
            store.clone(),
            Correlator::new(0.7, 0.6),
            Arc::new(RateGate::new(250)),
            Vec::new(),
            chrono::Duration::hours(3),
            true,
        );
        let outcome = handler.handle(&torrent(), "disk on fire", now()).await.unwrap();
        assert_eq!(outcome, FailureOutcome::Unknown);
    }
}
