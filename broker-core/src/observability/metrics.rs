//! Counters shared by the broker processes.
//!
//! The Prometheus recorder is installed once per process; the helpers below are
//! no-ops until then, so library code and tests can call them freely.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

use crate::error::AppError;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder.
pub fn init_metrics() -> Result<(), AppError> {
    let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        AppError::System(anyhow::anyhow!("failed to install Prometheus recorder: {}", e))
    })?;

    METRICS_HANDLE
        .set(handle)
        .map_err(|_| AppError::System(anyhow::anyhow!("metrics handle already initialized")))
}

/// Render the current metrics snapshot in Prometheus text format.
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(|handle| handle.render())
}

pub fn record_pam_request(command: &'static str, status: i32) {
    metrics::counter!(
        "pam_requests_total",
        "command" => command,
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_backend_call(method: &'static str, outcome: &'static str) {
    metrics::counter!(
        "pam_backend_calls_total",
        "method" => method,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_provider_job(method: &'static str, outcome: &'static str) {
    metrics::counter!(
        "provider_jobs_total",
        "method" => method,
        "outcome" => outcome
    )
    .increment(1);
}
