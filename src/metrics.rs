/// Metrics and telemetry for the Reprompt backend
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - Rewrite request and denial counts
/// - Credits spent by source
/// - Anonymous pool size
/// - Background job execution

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter_vec, register_int_gauge, Encoder, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    /// Rewrite requests by mode
    pub static ref REWRITE_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "rewrite_requests_total",
        "Total number of prompt rewrite requests",
        &["mode"]
    )
    .unwrap();

    /// Denied rewrite requests by mode and reason
    pub static ref REWRITE_DENIALS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "rewrite_denials_total",
        "Total number of denied rewrite requests",
        &["mode", "reason"]
    )
    .unwrap();

    /// Credits spent by source (anonymous, daily, mixed)
    pub static ref CREDITS_SPENT_TOTAL: IntCounterVec = register_int_counter_vec!(
        "credits_spent_total",
        "Total credits reserved, by source",
        &["source"]
    )
    .unwrap();

    /// Tracked anonymous client keys
    pub static ref ANONYMOUS_POOL_SIZE: IntGauge = register_int_gauge!(
        "anonymous_pool_size",
        "Number of client keys tracked by the anonymous credit pool"
    )
    .unwrap();

    /// Background job executions by job type and status
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "background_jobs_total",
        "Total number of background job executions",
        &["job_type", "status"]
    )
    .unwrap();
}

/// Render all registered metrics in Prometheus text exposition format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_registered_metrics() {
        REWRITE_REQUESTS_TOTAL.with_label_values(&["improve"]).inc();
        let text = render();
        assert!(text.contains("rewrite_requests_total"));
    }
}
