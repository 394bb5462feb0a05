//! Prometheus metrics for the oracle relay.
//!
//! The store records request, history and reducer metrics through the `metrics`
//! facade. Nothing is exported until a recorder is installed, so hosts that do not
//! care about metrics pay only for the no-op calls.
//!
//! # Example
//!
//! ```rust,no_run
//! use oracle_relay_runtime::metrics::install_prometheus_recorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let handle = install_prometheus_recorder()?;
//!
//! // Later, e.g. from an HTTP handler
//! println!("{}", handle.render());
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

/// Requests handed to the transport
pub const REQUESTS_SUBMITTED: &str = "oracle.requests.submitted";
/// Callbacks that fulfilled a request
pub const REQUESTS_FULFILLED: &str = "oracle.requests.fulfilled";
/// Commands the reducer rejected, labelled by `reason`
pub const REQUESTS_REJECTED: &str = "oracle.requests.rejected";
/// Requests that moved to the stale state
pub const REQUESTS_STALE: &str = "oracle.requests.stale";
/// History entries handed to the archive sink
pub const HISTORY_ARCHIVED: &str = "oracle.history.archived";
/// History entries currently retained
pub const HISTORY_RETAINED: &str = "oracle.history.retained";
/// Time spent inside the reducer
pub const REDUCER_DURATION: &str = "oracle.reducer.duration_seconds";

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Describe every metric the relay records.
///
/// Safe to call more than once.
pub fn register_metrics() {
    describe_counter!(REQUESTS_SUBMITTED, "Requests handed to the transport");
    describe_counter!(REQUESTS_FULFILLED, "Callbacks that fulfilled a request");
    describe_counter!(
        REQUESTS_REJECTED,
        "Commands rejected by the reducer, by reason"
    );
    describe_counter!(REQUESTS_STALE, "Requests that went stale before a callback");
    describe_counter!(HISTORY_ARCHIVED, "History entries moved to the archive sink");
    describe_gauge!(HISTORY_RETAINED, "History entries currently retained");
    describe_histogram!(
        REDUCER_DURATION,
        metrics::Unit::Seconds,
        "Reducer execution time"
    );
}

/// Install a Prometheus recorder as the global `metrics` recorder.
///
/// # Errors
///
/// Returns [`MetricsError::Build`] if the histogram buckets are rejected and
/// [`MetricsError::Install`] if a global recorder is already installed.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, MetricsError> {
    register_metrics();

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1],
        )
        .map_err(|e| MetricsError::Build(e.to_string()))?
        .install_recorder()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    tracing::info!("Prometheus metrics recorder installed");
    Ok(handle)
}

/// Store-level metric recorders.
pub(crate) struct StoreMetrics;

impl StoreMetrics {
    pub(crate) fn record_reduce(action: &'static str, duration: Duration) {
        histogram!(REDUCER_DURATION, "action" => action).record(duration.as_secs_f64());
    }

    pub(crate) fn record_rejection(reason: &'static str) {
        counter!(REQUESTS_REJECTED, "reason" => reason).increment(1);
    }

    pub(crate) fn record_submitted() {
        counter!(REQUESTS_SUBMITTED).increment(1);
    }

    pub(crate) fn record_fulfilled() {
        counter!(REQUESTS_FULFILLED).increment(1);
    }

    pub(crate) fn record_stale(count: usize) {
        if count > 0 {
            counter!(REQUESTS_STALE).increment(count as u64);
        }
    }

    pub(crate) fn record_archived(count: usize) {
        if count > 0 {
            counter!(HISTORY_ARCHIVED).increment(count as u64);
        }
    }

    #[allow(clippy::cast_precision_loss)] // Gauge values are f64
    pub(crate) fn record_retained(retained: usize) {
        gauge!(HISTORY_RETAINED).set(retained as f64);
    }
}
