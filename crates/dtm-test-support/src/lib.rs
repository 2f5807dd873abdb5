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

//! Shared test helpers used across the workspace's `#[cfg(test)]` modules.

use dtm_store::Store;

/// Build a fresh, fully migrated [`Store`] backed by a temp-file SQLite
/// database. The file is intentionally leaked to the OS temp directory
/// rather than unlinked, since the pool may open additional connections
/// against the same path for the life of the test process.
///
/// # Panics
///
/// Panics if the temp file cannot be created or migrations fail, both of
/// which indicate a broken test environment rather than a test failure.
pub async fn temp_store() -> Store {
    let file = tempfile::NamedTempFile::new().expect("create temp sqlite file");
    let path = file.into_temp_path().keep().expect("persist temp sqlite file");
    let url = format!("sqlite://{}", path.display());
    Store::connect(&url).await.expect("migrate temp store")
}
