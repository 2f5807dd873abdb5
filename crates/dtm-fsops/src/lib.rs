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

//! Local media-tree symlink walk and name correlation against the torrent
//! catalog (§4.5, §4.6).

mod classify;
mod correlator;
mod error;
mod state;
mod walker;

pub use classify::{Inspection, extract_torrent_name, inspect_symlink};
pub use correlator::{Correlator, CorrelationMatch, normalize, similarity, word_intersection_ratio};
pub use error::{FsOpsError, FsOpsResult};
pub use state::{load_state, save_state};
pub use walker::{DEFAULT_WALKER_CONCURRENCY, SymlinkWalker, WalkOutcome};
