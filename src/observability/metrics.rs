//! Metrics collection and exposition.
//!
//! # Metrics
//! - `resilience_breaker_calls_total` (counter): calls by key, outcome (success/failure/rejected)
//! - `resilience_breaker_transitions_total` (counter): state changes by key, target state
//! - `resilience_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `resilience_retry_attempts_total` (counter): invocations by retry label
//! - `resilience_retry_exhausted_total` (counter): give-ups by retry label
//! - `resilience_errors_total` (counter): recorded errors by component, operation
//! - `resilience_degradations_total` (counter): degradations by feature

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::resilience::CircuitState;

/// Install the Prometheus recorder with its own HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_breaker_call(key: &str, outcome: &'static str) {
    ::metrics::counter!(
        "resilience_breaker_calls_total",
        "key" => key.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_breaker_transition(key: &str, to: CircuitState) {
    ::metrics::counter!(
        "resilience_breaker_transitions_total",
        "key" => key.to_string(),
        "to" => to.as_str()
    )
    .increment(1);
    record_breaker_state(key, to);
}

pub fn record_breaker_state(key: &str, state: CircuitState) {
    ::metrics::gauge!("resilience_breaker_state", "key" => key.to_string())
        .set(state.gauge_value());
}

pub fn record_retry_attempt(label: &str) {
    ::metrics::counter!("resilience_retry_attempts_total", "label" => label.to_string())
        .increment(1);
}

pub fn record_retry_exhausted(label: &str) {
    ::metrics::counter!("resilience_retry_exhausted_total", "label" => label.to_string())
        .increment(1);
}

pub fn record_error(component: &str, operation: &str) {
    ::metrics::counter!(
        "resilience_errors_total",
        "component" => component.to_string(),
        "operation" => operation.to_string()
    )
    .increment(1);
}

pub fn record_degradation(feature: &str) {
    ::metrics::counter!("resilience_degradations_total", "feature" => feature.to_string())
        .increment(1);
}
