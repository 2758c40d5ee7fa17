//! Prometheus metrics for the outbox relay and unit of work.
//!
//! Counters are emitted through the `metrics` facade, so they cost nothing
//! until a recorder is installed. The service binary installs one with
//! [`PrometheusExporter::install`].
//!
//! ```rust,no_run
//! use ledger_outbox_runtime::metrics::PrometheusExporter;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let exporter = PrometheusExporter::install("0.0.0.0:9090".parse()?)?;
//! println!("scrape http://{}/metrics", exporter.addr());
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, gauge, histogram};

/// Histogram buckets for cycle durations, in seconds.
const CYCLE_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// The Prometheus exporter could not be set up.
#[derive(Error, Debug)]
#[error("Prometheus exporter rejected its configuration: {0}")]
pub struct MetricsError(String);

/// Process-wide Prometheus recorder with an HTTP listener.
pub struct PrometheusExporter {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl PrometheusExporter {
    /// Describe the relay metrics, install the global recorder and serve
    /// `/metrics` on `addr` from a background task.
    ///
    /// Must be called from within a tokio runtime. If another recorder is
    /// already installed it is kept and the returned exporter cannot render.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if the exporter cannot be built.
    pub fn install(addr: SocketAddr) -> Result<Self, MetricsError> {
        describe_metrics();

        let (recorder, serve) = PrometheusBuilder::new()
            .with_http_listener(addr)
            .set_buckets_for_metric(Matcher::Suffix("duration_seconds".to_string()), CYCLE_BUCKETS)
            .and_then(PrometheusBuilder::build)
            .map_err(|e| MetricsError(e.to_string()))?;

        let handle = recorder.handle();
        if let Err(e) = metrics::set_global_recorder(recorder) {
            tracing::warn!(error = %e, "Metrics recorder already installed, keeping it");
            return Ok(Self { addr, handle: None });
        }

        tokio::spawn(async move {
            if let Err(_) = serve.await {
                tracing::error!("Prometheus listener stopped");
            }
        });
        tracing::info!(%addr, "Serving Prometheus metrics on /metrics");

        Ok(Self { addr, handle: Some(handle) })
    }

    /// Address the listener was asked to bind.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Current metrics in the Prometheus text format, if this exporter owns
    /// the global recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Attach help text to every metric the workspace emits.
fn describe_metrics() {
    // Relay Metrics
    describe_counter!("outbox_relay_claimed_total", "Outbox records claimed by relay workers");
    describe_counter!(
        "outbox_relay_dispatched_total",
        "Outbox records published and marked dispatched"
    );
    describe_counter!(
        "outbox_relay_retried_total",
        "Transient delivery failures rescheduled with backoff"
    );
    describe_counter!(
        "outbox_relay_failed_total",
        "Outbox records parked as failed (fatal error or retries exhausted)"
    );
    describe_counter!(
        "outbox_relay_claim_lost_total",
        "Dispositions rejected because the claim had been taken over"
    );
    describe_counter!("outbox_relay_errors_total", "Relay cycles aborted by store errors");
    describe_histogram!("outbox_relay_cycle_duration_seconds", "Time taken by one relay cycle");
    describe_gauge!("outbox_pending_records", "Outbox records waiting for delivery");

    // Unit of Work Metrics
    describe_counter!("uow_commits_total", "Transactions committed");
    describe_counter!("uow_rollbacks_total", "Transactions rolled back");
}

/// Relay metrics recorder.
pub struct RelayMetrics;

impl RelayMetrics {
    /// Record a claimed batch.
    pub fn record_claimed(count: usize) {
        counter!("outbox_relay_claimed_total").increment(count as u64);
    }

    /// Record a successful delivery.
    pub fn record_dispatched() {
        counter!("outbox_relay_dispatched_total").increment(1);
    }

    /// Record a rescheduled delivery.
    pub fn record_retried() {
        counter!("outbox_relay_retried_total").increment(1);
    }

    /// Record a record parked as failed.
    ///
    /// `reason` is `"fatal"` or `"exhausted"`.
    pub fn record_failed(reason: &'static str) {
        counter!("outbox_relay_failed_total", "reason" => reason).increment(1);
    }

    /// Record a lost claim.
    pub fn record_claim_lost() {
        counter!("outbox_relay_claim_lost_total").increment(1);
    }

    /// Record an aborted cycle.
    pub fn record_error() {
        counter!("outbox_relay_errors_total").increment(1);
    }

    /// Record one cycle's duration.
    pub fn record_cycle(duration: Duration) {
        histogram!("outbox_relay_cycle_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record the current backlog.
    #[allow(clippy::cast_precision_loss)] // Backlog sizes stay far below 2^52
    pub fn record_pending(pending: u64) {
        gauge!("outbox_pending_records").set(pending as f64);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[tokio::test]
    async fn exporter_renders_relay_counters() {
        let exporter = PrometheusExporter::install("127.0.0.1:0".parse().unwrap()).unwrap();

        RelayMetrics::record_claimed(3);
        RelayMetrics::record_dispatched();
        RelayMetrics::record_failed("fatal");
        RelayMetrics::record_cycle(Duration::from_millis(20));
        RelayMetrics::record_pending(7);

        // Only the first exporter in the process owns the recorder.
        if let Some(rendered) = exporter.render() {
            assert!(rendered.contains("outbox_relay_claimed_total"));
            assert!(rendered.contains("outbox_relay_dispatched_total"));
            assert!(rendered.contains("reason=\"fatal\""));
            assert!(rendered.contains("outbox_pending_records"));
        }
    }
}
