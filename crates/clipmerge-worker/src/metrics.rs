//! Prometheus metrics for the merge loop.

use std::net::{Ipv4Addr, SocketAddr};

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};
use crate::orchestrator::IterationOutcome;

pub use clipmerge_models::metric_names as names;

/// Serve metrics on `0.0.0.0:<port>/metrics`.
pub fn install_exporter(port: u16) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))
}

/// Count one finished iteration by outcome.
pub fn record_iteration(outcome: &IterationOutcome) {
    counter!(names::ITERATIONS_TOTAL, "outcome" => outcome.label()).increment(1);
}

/// Record how long a render took.
pub fn record_merge_duration(duration_secs: f64) {
    histogram!(names::MERGE_DURATION_SECONDS).record(duration_secs);
}
