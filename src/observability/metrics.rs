//! Metrics collection and exposition.
//!
//! # Metrics
//! - `health_transitions_total` (counter): transitions by warnable, `to`
//! - `health_startup_suppressed_total` (counter): reports dropped by the
//!   startup grace window, by warnable
//! - `health_unhealthy_warnables` (gauge): unhealthy count after the last
//!   mutation, by tracker
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder it is a no-op
//! - The Prometheus recorder is installed by the binary, never the library

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::health::WarnableCode;

/// Install the Prometheus recorder for this process.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

pub fn record_transition(code: &WarnableCode, unhealthy: bool) {
    let to = if unhealthy { "unhealthy" } else { "healthy" };
    counter!(
        "health_transitions_total",
        "warnable" => code.to_string(),
        "to" => to
    )
    .increment(1);
}

pub fn record_startup_suppressed(code: &WarnableCode) {
    counter!("health_startup_suppressed_total", "warnable" => code.to_string()).increment(1);
}

/// `tracker` is the process-unique id of the reporting tracker, so several
/// trackers do not overwrite each other's count.
pub fn record_unhealthy_count(tracker: u64, count: usize) {
    gauge!("health_unhealthy_warnables", "tracker" => tracker.to_string()).set(count as f64);
}
