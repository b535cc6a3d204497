//! Prometheus rendering of the session counters
//!
//! - `todo_session_requests_total` (counter): label `status`
//! - `todo_session_refresh_total` (counter): label `outcome`
//! - `todo_session_forced_logout_total` (counter)

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe();
    Ok(handle)
}

fn describe() {
    metrics::describe_counter!(
        "todo_session_requests_total",
        "HTTP responses seen by the session manager, by status"
    );
    metrics::describe_counter!(
        "todo_session_refresh_total",
        "Access token refreshes, by outcome"
    );
    metrics::describe_counter!(
        "todo_session_forced_logout_total",
        "Sessions cleared after a failed refresh"
    );
}
