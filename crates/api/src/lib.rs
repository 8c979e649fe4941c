//! HTTP API server for stock reservation and checkout.
//!
//! Exposes the reservation engine, availability checks, warehouse selection
//! and the checkout saga as REST endpoints, with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use checkout::CheckoutConfig;
use metrics_exporter_prometheus::PrometheusHandle;
use stock_ledger::{InMemoryStockLedger, StockLedger};
use task_queue::{InMemoryTaskQueue, TaskQueue};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::{AppState, InMemoryCollaborators};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<L: StockLedger + 'static>(
    state: Arc<AppState<L>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<L>))
        // Reservation engine
        .route("/stock/reserve", post(routes::stock::reserve::<L>))
        .route("/stock/release", post(routes::stock::release::<L>))
        .route("/stock/sale", post(routes::stock::complete_sale::<L>))
        .route("/stock/adjust", post(routes::stock::adjust::<L>))
        .route("/stock/restock", post(routes::stock::restock::<L>))
        .route("/stock/low", get(routes::stock::low::<L>))
        .route("/stock/{warehouse_id}/{item_id}", get(routes::stock::get::<L>))
        .route("/items/{item_id}/stock", get(routes::stock::for_item::<L>))
        // Selection
        .route("/availability", post(routes::availability::check::<L>))
        .route(
            "/availability/optimal-warehouse",
            post(routes::availability::optimal_warehouse::<L>),
        )
        // Checkout and promotions
        .route("/checkout", post(routes::checkout::create::<L>))
        .route(
            "/promotions/validate",
            post(routes::promotions::validate::<L>),
        )
        .route(
            "/carts/{cart_id}/promo",
            post(routes::promotions::apply::<L>).delete(routes::promotions::remove::<L>),
        )
        // Administration
        .route(
            "/warehouses",
            get(routes::warehouses::list::<L>).post(routes::warehouses::create::<L>),
        )
        .route("/warehouses/{id}", patch(routes::warehouses::update::<L>))
        .route(
            "/warehouses/{id}/deactivate",
            post(routes::warehouses::deactivate::<L>),
        )
        .route("/audit", get(routes::audit::list::<L>))
        .route(
            "/analytics/reservations",
            get(routes::audit::reservation_stats::<L>),
        )
        .route(
            "/analytics/reservations/{item_id}",
            get(routes::audit::item_reservation_stats::<L>),
        )
        .route("/tasks", get(routes::tasks::list::<L>))
        .route("/tasks/{id}", get(routes::tasks::get::<L>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Everything in memory: ledger, task queue and collaborators.
///
/// Returns the concrete handles so callers (tests, local runs) can seed carts,
/// catalog entries and addresses and drain the queue.
pub fn create_in_memory_state(
    config: CheckoutConfig,
) -> (
    Arc<AppState<InMemoryStockLedger>>,
    InMemoryCollaborators,
    InMemoryTaskQueue,
) {
    let ledger = Arc::new(InMemoryStockLedger::new());
    let queue = InMemoryTaskQueue::new();
    let collaborators = InMemoryCollaborators::new();
    let state = Arc::new(AppState::new(
        ledger,
        collaborators.collaborators(),
        Arc::new(queue.clone()) as Arc<dyn TaskQueue>,
        config,
    ));
    (state, collaborators, queue)
}
