//! Prometheus metrics endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use metrics::{Unit, describe_counter, describe_histogram};
use metrics_exporter_prometheus::PrometheusHandle;

/// GET /metrics: returns Prometheus-formatted metrics.
pub async fn get(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}

/// Registers HELP text for every metric the service records.
pub fn describe() {
    describe_counter!("stock_mutations_total", "Committed stock mutations by action");
    describe_counter!(
        "stock_mutation_failures_total",
        "Rejected stock mutations by action"
    );
    describe_counter!(
        "stock_low_alerts_total",
        "Mutations that left a record below its alert threshold"
    );
    describe_counter!("checkout_attempts_total", "Checkout attempts started");
    describe_counter!("checkout_completed_total", "Checkouts that created an order");
    describe_counter!("checkout_failed_total", "Failed checkouts by phase");
    describe_histogram!(
        "checkout_duration_seconds",
        Unit::Seconds,
        "Wall time of one checkout attempt"
    );
    describe_counter!(
        "checkout_rollbacks_total",
        "Reservations released while rolling back a checkout"
    );
    describe_counter!(
        "checkout_rollback_failures_total",
        "Reservations that could not be released during rollback"
    );
    describe_counter!(
        "auto_release_enqueue_failures_total",
        "Orders placed without a scheduled auto-release"
    );
    describe_counter!(
        "auto_release_line_failures_total",
        "Order lines the auto-release could not hand back"
    );
    describe_counter!("tasks_processed_total", "Background tasks completed by kind");
    describe_counter!("tasks_failed_total", "Background task failures by kind");
    describe_counter!(
        "task_outcome_write_failures_total",
        "Task results that could not be written back to the queue"
    );
    describe_histogram!(
        "checkout_basket_items",
        Unit::Count,
        "Units per completed checkout"
    );
    describe_counter!("promo_sweep_removed_total", "Promo codes stripped from carts");
}
