use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder, HistogramVec,
    IntCounter, IntCounterVec, TextEncoder,
};

// Prometheus metrics (default registry)
pub static PROVIDER_CALLS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "start_auth_provider_calls_total",
        "Identity provider calls by operation and outcome",
        &["op", "outcome"]
    )
    .expect("register provider_calls_total")
});

pub static PROVIDER_CALL_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "start_auth_provider_call_duration_seconds",
        "Identity provider call duration in seconds",
        &["op"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("register provider_call_duration")
});

pub static REFRESH_RECOVERIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "start_auth_refresh_recoveries_total",
        "Expired access tokens recovered through the session refresh token",
        &["outcome"]
    )
    .expect("register refresh_recoveries_total")
});

pub static SESSIONS_CREATED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "start_auth_sessions_created_total",
        "Server-side sessions created"
    )
    .expect("register sessions_created_total")
});

/// Record one provider call.
pub fn observe_provider_call(op: &str, outcome: &str, seconds: f64) {
    PROVIDER_CALLS_TOTAL.with_label_values(&[op, outcome]).inc();
    PROVIDER_CALL_DURATION.with_label_values(&[op]).observe(seconds);
}

pub fn encode_metrics() -> (axum::http::StatusCode, String) {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encode error: {e}"),
        );
    }
    (
        axum::http::StatusCode::OK,
        String::from_utf8(buffer).unwrap_or_default(),
    )
}
