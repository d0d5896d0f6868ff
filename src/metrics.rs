//! Observability metrics for the extractor
//!
//! Counters and gauges for source requests, local rate window health, sunk
//! items and emitted signals. Recording goes through the `metrics` facade and
//! is a no-op until [`init_metrics`] installs the Prometheus exporter.
//!
//! ## Metrics
//!
//! - `source_requests_total{endpoint,outcome}`
//! - `rate_window_rejections_total`
//! - `rate_window_remaining`
//! - `items_sunk_total{record_type}`
//! - `child_fetch_skipped_total{record_type}`
//! - `signals_emitted_total{kind}`
//! - `extraction_passes_total{entry,outcome}` and `extraction_pass_duration_seconds`

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::extractor::PassOutcome;

static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Install the Prometheus exporter and describe every metric
///
/// Idempotent; later calls are ignored.
///
/// # Arguments
/// * `addr` - Socket address for the scrape endpoint (e.g., "0.0.0.0:9090")
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!(addr = %addr, "Initializing metrics exporter");

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "source_requests_total",
        Unit::Count,
        "Requests made to the project management API"
    );
    describe_counter!(
        "rate_window_rejections_total",
        Unit::Count,
        "Requests refused locally by the rate window"
    );
    describe_gauge!(
        "rate_window_remaining",
        Unit::Count,
        "Requests left in the current rate window"
    );
    describe_counter!(
        "items_sunk_total",
        Unit::Count,
        "Items pushed to repositories"
    );
    describe_counter!(
        "child_fetch_skipped_total",
        Unit::Count,
        "Parent identifiers skipped after a fetch error"
    );
    describe_counter!(
        "signals_emitted_total",
        Unit::Count,
        "Signals emitted to the host"
    );
    describe_counter!(
        "extraction_passes_total",
        Unit::Count,
        "Extraction pass invocations by outcome"
    );
    describe_histogram!(
        "extraction_pass_duration_seconds",
        Unit::Seconds,
        "Wall time of one extraction pass invocation"
    );

    *initialized = true;
    info!(addr = %addr, "Metrics exporter installed");
    Ok(())
}

/// Check if the exporter is installed
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

/// Record one source request
pub fn record_source_request(endpoint: &str, outcome: &'static str) {
    counter!(
        "source_requests_total",
        "endpoint" => endpoint.to_string(),
        "outcome" => outcome,
    )
    .increment(1);
}

/// Record a request refused by the local rate window
pub fn record_rate_rejection() {
    counter!("rate_window_rejections_total").increment(1);
}

/// Update the remaining quota gauge
pub fn record_rate_remaining(remaining: u32) {
    gauge!("rate_window_remaining").set(f64::from(remaining));
}

/// Record items accepted by a repository
pub fn record_items_sunk(record_type: &'static str, count: usize) {
    counter!("items_sunk_total", "record_type" => record_type).increment(count as u64);
}

/// Record a skipped parent identifier
pub fn record_child_skipped(record_type: &'static str) {
    counter!("child_fetch_skipped_total", "record_type" => record_type).increment(1);
}

/// Record an emitted signal
pub fn record_signal(kind: &'static str) {
    counter!("signals_emitted_total", "kind" => kind).increment(1);
}

/// Timing and outcome of one pass invocation
pub struct PassMetrics {
    entry: &'static str,
    start_time: Instant,
}

impl PassMetrics {
    /// Start timing an invocation
    pub fn start(entry: &'static str) -> Self {
        Self {
            entry,
            start_time: Instant::now(),
        }
    }

    /// Record how the invocation ended
    pub fn record_outcome(&self, outcome: &PassOutcome) {
        let duration = self.start_time.elapsed();

        counter!(
            "extraction_passes_total",
            "entry" => self.entry,
            "outcome" => outcome.label(),
        )
        .increment(1);

        histogram!(
            "extraction_pass_duration_seconds",
            "entry" => self.entry,
        )
        .record(duration.as_secs_f64());

        debug!(
            entry = self.entry,
            outcome = %outcome,
            duration_ms = duration.as_millis() as u64,
            "Pass metrics recorded"
        );
    }
}
