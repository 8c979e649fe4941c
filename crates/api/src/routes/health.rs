//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;
use stock_ledger::StockLedger;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_warehouses: Option<usize>,
}

/// GET /health: 200 while the stock ledger answers, 503 otherwise.
pub async fn check<L: StockLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
) -> (StatusCode, Json<HealthResponse>) {
    match state.engine.list_warehouses().await {
        Ok(warehouses) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                active_warehouses: Some(warehouses.len()),
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable",
                    active_warehouses: None,
                }),
            )
        }
    }
}
