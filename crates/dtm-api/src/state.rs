//! Shared application state handed to every handler via axum's `State`
//! extractor.

use std::sync::Arc;

use dtm_events::EventBus;
use dtm_provider::ProviderClient;
use dtm_ratelimit::RateGate;
use dtm_store::Store;
use dtm_telemetry::Metrics;
use dtm_validator::Validator;
use dtm_workers::{ContinuousTester, ReinjectionWorker, Scheduler};

/// Everything a control-plane handler needs, composed once at startup and
/// shared read-only across every request (§4.12, §9).
pub struct ApiState<P: ProviderClient> {
    pub(crate) store: Store,
    pub(crate) events: EventBus,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) rate_gate: Arc<RateGate>,
    pub(crate) validator: Arc<Validator>,
    pub(crate) scheduler: Arc<Scheduler<P>>,
    pub(crate) tester: Arc<ContinuousTester<P>>,
    pub(crate) reinjector: Arc<ReinjectionWorker<P>>,
    pub(crate) full_scan_page_size: u32,
    pub(crate) full_scan_max_pages: u32,
}

impl<P: ProviderClient> ApiState<P> {
    /// Build state from the components the composition root already owns.
    /// No component is constructed here; this is pure wiring (§9).
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        events: EventBus,
        metrics: Arc<Metrics>,
        rate_gate: Arc<RateGate>,
        validator: Arc<Validator>,
        scheduler: Arc<Scheduler<P>>,
        tester: Arc<ContinuousTester<P>>,
        reinjector: Arc<ReinjectionWorker<P>>,
        full_scan_page_size: u32,
        full_scan_max_pages: u32,
    ) -> Self {
        Self {
            store,
            events,
            metrics,
            rate_gate,
            validator,
            scheduler,
            tester,
            reinjector,
            full_scan_page_size,
            full_scan_max_pages,
        }
    }
}
