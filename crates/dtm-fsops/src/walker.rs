//! Resumable, bounded-concurrency walk of the local media tree (§4.5).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dtm_core::{BrokenSymlink, SymlinkProcessingState};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::classify::{extract_torrent_name, inspect_symlink};
use crate::error::{FsOpsError, FsOpsResult};

/// Default bound on concurrently in-flight link inspections.
pub const DEFAULT_WALKER_CONCURRENCY: usize = 6;

/// Result of one walk pass: every classified (non-healthy) symlink found,
/// plus the processing-state checkpoint to persist.
pub struct WalkOutcome {
    /// Broken/degraded links discovered this pass.
    pub broken: Vec<BrokenSymlink>,
    /// Updated checkpoint, to persist via the store regardless of whether the
    /// walk ran to completion.
    pub state: SymlinkProcessingState,
    /// Whether the walk was cancelled before visiting every subdirectory.
    pub cancelled: bool,
}

/// Walks `root`'s immediate subdirectories in lexicographic order, resuming
/// from `resume_from` (an index into that sorted list) when given.
pub struct SymlinkWalker {
    root: PathBuf,
    concurrency: usize,
    cancel: CancellationToken,
}

impl SymlinkWalker {
    /// Build a walker rooted at `root`, bounding concurrent inspections to
    /// `concurrency` and honoring `cancel` for cooperative shutdown.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, concurrency: usize, cancel: CancellationToken) -> Self {
        Self {
            root: root.into(),
            concurrency: concurrency.max(1),
            cancel,
        }
    }

    /// Run one walk pass, starting at `state.current_index` when the
    /// persisted state represents a resumable in-flight walk, or from
    /// scratch otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::InvalidRoot`] if `root` is not a directory, or
    /// [`FsOpsError::Io`] if enumerating its immediate subdirectories fails.
    pub async fn walk(&self, mut state: SymlinkProcessingState, now: DateTime<Utc>) -> FsOpsResult<WalkOutcome> {
        if !self.root.is_dir() {
            return Err(FsOpsError::InvalidRoot { path: self.root.clone() });
        }

        let mut subdirs = list_subdirectories(&self.root)?;
        subdirs.sort();

        let resume = if is_resumable_walk(&state) { state.current_index } else { 0 };
        state.total_directories = subdirs.len();
        state.scan_in_progress = true;
        if resume == 0 {
            state.total_symlinks_found = 0;
            state.total_processed = 0;
        }

        let mut broken = Vec::new();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut cancelled = false;

        for (index, subdir) in subdirs.iter().enumerate().skip(resume) {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            state.current_directory = subdir.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();

            let links = collect_symlinks(subdir);
            let mut found_this_dir = inspect_links(links, Arc::clone(&semaphore), self.cancel.clone()).await;
            state.total_symlinks_found += found_this_dir.len() as u64;
            state.total_processed += found_this_dir.len() as u64;
            broken.append(&mut found_this_dir);

            state.current_index = index + 1;
        }

        if !cancelled {
            state.scan_in_progress = false;
            state.last_scan_date = Some(now);
            state.current_index = 0;
        }

        Ok(WalkOutcome { broken, state, cancelled })
    }
}

async fn inspect_links(links: Vec<PathBuf>, semaphore: Arc<Semaphore>, cancel: CancellationToken) -> Vec<BrokenSymlink> {
    let mut set = JoinSet::new();
    for link in links {
        let permit = Arc::clone(&semaphore);
        let cancel = cancel.clone();
        set.spawn(async move {
            if cancel.is_cancelled() {
                return None;
            }
            let _permit = permit.acquire_owned().await.ok()?;
            let inspection = inspect_symlink(&link);
            let status = inspection.status?;
            let torrent_name = extract_torrent_name(&inspection.target);
            Some(BrokenSymlink {
                source_path: link.to_string_lossy().into_owned(),
                target_path: inspection.target.to_string_lossy().into_owned(),
                torrent_name,
                status,
                size: inspection.size,
                error_message: inspection.error_message,
            })
        });
    }

    let mut found = Vec::new();
    while let Some(result) = set.join_next().await {
        match result {
            Ok(Some(entry)) => found.push(entry),
            Ok(None) => {}
            Err(source) => warn!(error = %source, "symlink inspection task panicked"),
        }
    }
    found
}

fn list_subdirectories(root: &Path) -> FsOpsResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(root).map_err(|source| FsOpsError::io("list_subdirectories", root, source))?;
    let mut subdirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| FsOpsError::io("list_subdirectories.entry", root, source))?;
        if entry.path().is_dir() {
            subdirs.push(entry.path());
        }
    }
    Ok(subdirs)
}

fn collect_symlinks(dir: &Path) -> Vec<PathBuf> {
    let mut links = Vec::new();
    for entry in walkdir::WalkDir::new(dir).into_iter().filter_map(Result::ok) {
        if entry.path_is_symlink() {
            links.push(entry.path().to_path_buf());
        }
    }
    debug!(dir = %dir.display(), count = links.len(), "collected symlinks");
    links
}

fn is_resumable_walk(state: &SymlinkProcessingState) -> bool {
    state.scan_in_progress && state.current_index > 0
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn walk_finds_broken_link_and_checkpoints_progress() {
        let dir = tempfile::tempdir().unwrap();
        let show_dir = dir.path().join("Show.S01E01");
        std::fs::create_dir_all(&show_dir).unwrap();
        std::os::unix::fs::symlink(dir.path().join("torrents/Show.S01E01/video.mkv"), show_dir.join("video.mkv")).unwrap();

        let walker = SymlinkWalker::new(dir.path(), 2, CancellationToken::new());
        let outcome = walker.walk(SymlinkProcessingState::default(), Utc::now()).await.unwrap();

        assert!(!outcome.cancelled);
        assert_eq!(outcome.broken.len(), 1);
        assert_eq!(outcome.broken[0].torrent_name, "Show.S01E01");
        assert_eq!(outcome.state.total_directories, 1);
        assert_eq!(outcome.state.current_index, 0);
        assert!(!outcome.state.scan_in_progress);
    }

    #[tokio::test]
    async fn cancellation_stops_the_walk_with_partial_results() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a", "b", "c"] {
            std::fs::create_dir_all(dir.path().join(name)).unwrap();
        }
        let cancel = CancellationToken::new();
        cancel.cancel();

        let walker = SymlinkWalker::new(dir.path(), 2, cancel);
        let outcome = walker.walk(SymlinkProcessingState::default(), Utc::now()).await.unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.state.current_index, 0);
    }
}
