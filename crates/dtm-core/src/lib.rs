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

//! Domain model for the torrent catalog: torrents, attempts, scan cursors,
//! permanent failures, the retry queue, and the symlink-walk entities.

mod error;
mod model;

pub use error::{CoreError, CoreResult};
pub use model::{
    Attempt, BrokenSymlink, DRY_RUN_API_RESPONSE, FAILED_SET, Metric, PermanentFailure, Priority,
    RetryQueueEntry, ScanKind, ScanProgress, ScanStatus, SymlinkProcessingState, SymlinkStatus,
    Torrent, TorrentStatus,
};
