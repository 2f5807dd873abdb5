//! Prometheus-backed metrics registry (§10.1).
//!
//! Exposes the fixed collector set the ambient stack calls for: rate-gate
//! admissions and wait times, reinjection outcomes, store write latency, and
//! the symlink/correlator pipeline's walk duration and match rate.

use prometheus::{Encoder, Gauge, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared across the long-running tasks.
#[derive(Clone)]
pub struct Metrics {
    inner: std::sync::Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    rategate_admissions_total: IntCounterVec,
    rategate_wait_seconds: Histogram,
    reinject_attempts_total: IntCounterVec,
    store_write_duration_seconds: Histogram,
    symlink_walk_duration_seconds: Histogram,
    correlator_match_rate: Gauge,
}

impl Metrics {
    /// Construct a new registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::MetricsCollector`] if a collector cannot be
    /// built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let rategate_admissions_total = IntCounterVec::new(
            Opts::new("rategate_admissions_total", "RateGate slots admitted, by operation tag"),
            &["tag"],
        )
        .map_err(|source| collector_error("rategate_admissions_total", source))?;

        let rategate_wait_seconds = Histogram::with_opts(HistogramOpts::new(
            "rategate_wait_seconds",
            "Time spent waiting for a RateGate slot to open",
        ))
        .map_err(|source| collector_error("rategate_wait_seconds", source))?;

        let reinject_attempts_total = IntCounterVec::new(
            Opts::new("reinject_attempts_total", "Re-submission attempts, by outcome"),
            &["outcome"],
        )
        .map_err(|source| collector_error("reinject_attempts_total", source))?;

        let store_write_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "store_write_duration_seconds",
            "Latency of store write operations",
        ))
        .map_err(|source| collector_error("store_write_duration_seconds", source))?;

        let symlink_walk_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "symlink_walk_duration_seconds",
            "Wall-clock duration of a full symlink walk",
        ))
        .map_err(|source| collector_error("symlink_walk_duration_seconds", source))?;

        let correlator_match_rate = Gauge::with_opts(Opts::new(
            "correlator_match_rate",
            "Fraction of extracted symlink names matched to a catalog torrent in the most recent run",
        ))
        .map_err(|source| collector_error("correlator_match_rate", source))?;

        registry
            .register(Box::new(rategate_admissions_total.clone()))
            .map_err(|source| collector_error("rategate_admissions_total", source))?;
        registry
            .register(Box::new(rategate_wait_seconds.clone()))
            .map_err(|source| collector_error("rategate_wait_seconds", source))?;
        registry
            .register(Box::new(reinject_attempts_total.clone()))
            .map_err(|source| collector_error("reinject_attempts_total", source))?;
        registry
            .register(Box::new(store_write_duration_seconds.clone()))
            .map_err(|source| collector_error("store_write_duration_seconds", source))?;
        registry
            .register(Box::new(symlink_walk_duration_seconds.clone()))
            .map_err(|source| collector_error("symlink_walk_duration_seconds", source))?;
        registry
            .register(Box::new(correlator_match_rate.clone()))
            .map_err(|source| collector_error("correlator_match_rate", source))?;

        Ok(Self {
            inner: std::sync::Arc::new(MetricsInner {
                registry,
                rategate_admissions_total,
                rategate_wait_seconds,
                reinject_attempts_total,
                store_write_duration_seconds,
                symlink_walk_duration_seconds,
                correlator_match_rate,
            }),
        })
    }

    /// Record one RateGate admission for `tag`.
    pub fn record_rategate_admission(&self, tag: &str) {
        self.inner.rategate_admissions_total.with_label_values(&[tag]).inc();
    }

    /// Record how long a RateGate caller waited before admission.
    pub fn observe_rategate_wait(&self, seconds: f64) {
        self.inner.rategate_wait_seconds.observe(seconds);
    }

    /// Record a completed reinjection attempt, keyed by a short outcome
    /// label (`success`, `failure`, `invalid_hash`, `dry_run`).
    pub fn record_reinject_attempt(&self, outcome: &str) {
        self.inner.reinject_attempts_total.with_label_values(&[outcome]).inc();
    }

    /// Record the latency of a store write.
    pub fn observe_store_write(&self, seconds: f64) {
        self.inner.store_write_duration_seconds.observe(seconds);
    }

    /// Record the wall-clock duration of a completed symlink walk.
    pub fn observe_symlink_walk(&self, seconds: f64) {
        self.inner.symlink_walk_duration_seconds.observe(seconds);
    }

    /// Set the most recent correlator match rate (0.0..=1.0).
    pub fn set_correlator_match_rate(&self, rate: f64) {
        self.inner.correlator_match_rate.set(rate);
    }

    /// Render the registry in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::MetricsEncode`] or
    /// [`TelemetryError::MetricsUtf8`] if encoding fails.
    pub fn render(&self) -> Result<String> {
        let families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }
}

fn collector_error(name: &'static str, source: prometheus::Error) -> TelemetryError {
    TelemetryError::MetricsCollector { name, source }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_renders_without_error() {
        let metrics = Metrics::new().expect("metrics registry");
        metrics.record_rategate_admission("test_injection");
        metrics.observe_rategate_wait(0.25);
        metrics.record_reinject_attempt("success");
        metrics.observe_store_write(0.01);
        metrics.observe_symlink_walk(12.5);
        metrics.set_correlator_match_rate(0.82);

        let rendered = metrics.render().expect("render");
        assert!(rendered.contains("rategate_admissions_total"));
        assert!(rendered.contains("correlator_match_rate"));
    }
}
