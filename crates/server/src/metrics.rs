//! Prometheus metrics for the gateway.
//!
//! The registry belongs to the server state; nothing is registered globally.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use sluice_error::{ErrorCategory, SluiceError};

#[derive(Clone)]
pub struct GatewayMetrics {
    registry: Registry,
    submitted: IntCounter,
    rejected: IntCounter,
    errors: IntCounterVec,
    pages: IntCounter,
    live: IntGauge,
}

impl GatewayMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let submitted = IntCounter::with_opts(Opts::new(
            "sluice_queries_submitted_total",
            "Queries received on the submit endpoint",
        ))?;
        let rejected = IntCounter::with_opts(Opts::new(
            "sluice_queries_rejected_total",
            "Queries refused because the gateway was at capacity",
        ))?;
        let errors = IntCounterVec::new(
            Opts::new("sluice_query_errors_total", "Failed requests by error category"),
            &["category"],
        )?;
        let pages = IntCounter::with_opts(Opts::new(
            "sluice_pages_served_total",
            "Result pages returned to clients",
        ))?;
        let live = IntGauge::with_opts(Opts::new(
            "sluice_live_queries",
            "Queries holding a live-query slot",
        ))?;

        registry.register(Box::new(submitted.clone()))?;
        registry.register(Box::new(rejected.clone()))?;
        registry.register(Box::new(errors.clone()))?;
        registry.register(Box::new(pages.clone()))?;
        registry.register(Box::new(live.clone()))?;

        Ok(Self {
            registry,
            submitted,
            rejected,
            errors,
            pages,
            live,
        })
    }

    pub fn record_submitted(&self) {
        self.submitted.inc();
    }

    pub fn record_page(&self) {
        self.pages.inc();
    }

    pub fn record_error(&self, error: &SluiceError) {
        let category = error.category();
        if category == ErrorCategory::Admission {
            self.rejected.inc();
        }
        self.errors.with_label_values(&[category.as_str()]).inc();
    }

    pub fn set_live_queries(&self, live: usize) {
        self.live.set(live as i64);
    }

    /// Text exposition of every metric, with its content type.
    pub fn render(&self) -> anyhow::Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}
