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
#![allow(clippy::module_name_repetitions, clippy::too_many_arguments)]

//! Long-running loops that turn the provider, store, and filesystem into a
//! self-healing catalog: reinjection, failure classification, symlink
//! correlation, retry-queue cleanup, and the scheduler that drives all of
//! them on their configured cadences (§4).

mod cleanup;
mod error;
mod failure_handler;
mod reinject;
mod scheduler;
mod tester;

pub use cleanup::{CleanupWorker, DEFAULT_CLEANUP_INTERVAL};
pub use error::{WorkersError, WorkersResult};
pub use failure_handler::{classify, FailureClass, FailureHandler, FailureOutcome};
pub use reinject::{ReinjectOutcome, ReinjectionWorker};
pub use scheduler::{Scheduler, SchedulerHandles};
pub use tester::{ContinuousTester, TestCycleSummary};
