//! Prometheus metrics for blog-service.
//!
//! Label counting failures are not visible to API callers once a post is
//! saved, so they are exported here alongside the `/metrics` handler.

use actix_web::HttpResponse;
use label_counter::{LabelError, LabelKind};
use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

/// Labels not recorded after a post save
static LABEL_COUNT_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "blog_label_count_failures_total",
        "Labels whose usage count was not recorded after a post save",
        &["kind", "reason"]
    )
    .expect("failed to register blog_label_count_failures_total")
});

/// Labels skipped by reconciliation
static LABEL_RECONCILE_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "blog_label_reconcile_failures_total",
        "Labels whose count could not be set during reconciliation",
        &["kind"]
    )
    .expect("failed to register blog_label_reconcile_failures_total")
});

/// Metric label value for a counting failure
pub fn failure_reason(err: &LabelError) -> &'static str {
    match err {
        LabelError::Contention { .. } => "contention",
        LabelError::Timeout { .. } => "timeout",
        LabelError::Unavailable(_) => "unavailable",
        LabelError::DuplicateKey(_) => "duplicate_key",
        LabelError::Database(_) => "database",
        LabelError::Unsupported(_) | LabelError::Other(_) => "other",
    }
}

pub fn record_label_count_failure(kind: LabelKind, err: &LabelError) {
    LABEL_COUNT_FAILURES_TOTAL
        .with_label_values(&[kind.as_str(), failure_reason(err)])
        .inc();
}

pub fn record_reconcile_failures(kind: LabelKind, count: usize) {
    LABEL_RECONCILE_FAILURES_TOTAL
        .with_label_values(&[kind.as_str()])
        .inc_by(count as u64);
}

pub fn label_count_failures(kind: LabelKind, reason: &str) -> u64 {
    LABEL_COUNT_FAILURES_TOTAL
        .with_label_values(&[kind.as_str(), reason])
        .get()
}

/// Actix handler that renders Prometheus metrics in text format.
pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
