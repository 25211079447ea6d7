//! Metrics collection with Prometheus
//!
//! This module provides Prometheus metrics for the PartsDesk client core:
//! - Page decode outcomes by resolved shape
//! - Token renewal attempts by outcome
//! - Session clears by reason
//! - Outbound HTTP requests by status class and latency

use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics collector for PartsDesk
#[derive(Clone)]
pub struct Metrics {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Page decodes by shape (bare_array, envelope, recovered, ...)
    pub page_decodes_total: CounterVec,

    /// Renewal coordinator decisions by outcome
    pub renewal_attempts_total: CounterVec,

    /// Session clears by reason (logout, unauthorized, renewal_rejected)
    pub session_clears_total: CounterVec,

    /// Outbound requests by status class (2xx, 4xx, 5xx, transport)
    pub http_requests_total: CounterVec,

    /// Outbound request duration
    pub http_request_duration_seconds: HistogramVec,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let page_decodes_total = CounterVec::new(
            Opts::new(
                "partsdesk_page_decodes_total",
                "List responses decoded, by resolved shape",
            ),
            &["shape"],
        )?;

        let renewal_attempts_total = CounterVec::new(
            Opts::new(
                "partsdesk_renewal_attempts_total",
                "Token renewal checks, by outcome",
            ),
            &["outcome"],
        )?;

        let session_clears_total = CounterVec::new(
            Opts::new(
                "partsdesk_session_clears_total",
                "Sessions cleared, by reason",
            ),
            &["reason"],
        )?;

        let http_requests_total = CounterVec::new(
            Opts::new(
                "partsdesk_http_requests_total",
                "Outbound HTTP requests, by status class",
            ),
            &["status_class"],
        )?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "partsdesk_http_request_duration_seconds",
                "Outbound HTTP request duration in seconds",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["method"],
        )?;

        registry.register(Box::new(page_decodes_total.clone()))?;
        registry.register(Box::new(renewal_attempts_total.clone()))?;
        registry.register(Box::new(session_clears_total.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            page_decodes_total,
            renewal_attempts_total,
            session_clears_total,
            http_requests_total,
            http_request_duration_seconds,
        })
    }

    /// Get the Prometheus registry for exporting metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_page_decode(&self, shape: &str) {
        self.page_decodes_total.with_label_values(&[shape]).inc();
    }

    pub fn record_renewal(&self, outcome: &str) {
        self.renewal_attempts_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn record_session_clear(&self, reason: &str) {
        self.session_clears_total.with_label_values(&[reason]).inc();
    }

    /// Record a completed request; `status` is `None` for transport failures
    pub fn record_http_request(&self, method: &str, status: Option<u16>, duration_secs: f64) {
        self.http_requests_total
            .with_label_values(&[status_class(status)])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method])
            .observe(duration_secs);
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn gather_text(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

fn status_class(status: Option<u16>) -> &'static str {
    match status {
        None => "transport",
        Some(100..=199) => "1xx",
        Some(200..=299) => "2xx",
        Some(300..=399) => "3xx",
        Some(400..=499) => "4xx",
        Some(_) => "5xx",
    }
}
