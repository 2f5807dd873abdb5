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

//! Debrid-provider client (§4.2): a rate-gated HTTP surface with adaptive
//! backoff, plus an in-memory stub for tests.

mod backoff;
mod client;
mod error;
mod model;

pub use backoff::{AdaptiveBackoff, ResponseClass};
pub use client::{HttpProviderClient, ProviderClient, StubProviderClient};
pub use error::{ProviderError, ProviderResult};
pub use model::{Account, AddMagnetResult, ProviderTorrent, StatusFilter};
