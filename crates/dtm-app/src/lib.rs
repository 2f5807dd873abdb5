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

//! Composition root for the torrent catalog manager binary: wires every
//! crate in the workspace into one running process (§9).

mod bootstrap;

pub use bootstrap::run_app;
