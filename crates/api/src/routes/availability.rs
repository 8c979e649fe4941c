//! Basket availability and warehouse selection.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use common::{Coordinates, ItemId};
use inventory::{AvailabilityReport, ItemRequest, WarehouseMatch};
use serde::Deserialize;
use stock_ledger::StockLedger;

use crate::error::ApiError;
use crate::routes::checked_coordinates;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AvailabilityRequest {
    pub items: Vec<ItemRequest>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

#[derive(Deserialize)]
pub struct OptimalWarehouseRequest {
    pub item_id: ItemId,
    pub quantity: u32,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

/// POST /availability: check a basket across every active warehouse.
#[tracing::instrument(skip(state, req), fields(lines = req.items.len()))]
pub async fn check<L: StockLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Json(req): Json<AvailabilityRequest>,
) -> Result<Json<AvailabilityReport>, ApiError> {
    let coordinates = checked_coordinates(req.coordinates)?;
    let report = state
        .aggregator
        .check_availability(&req.items, coordinates)
        .await?;
    Ok(Json(report))
}

/// POST /availability/optimal-warehouse: nearest warehouse able to ship one line.
#[tracing::instrument(skip(state, req), fields(item_id = %req.item_id, quantity = req.quantity))]
pub async fn optimal_warehouse<L: StockLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Json(req): Json<OptimalWarehouseRequest>,
) -> Result<Json<WarehouseMatch>, ApiError> {
    let coordinates = checked_coordinates(req.coordinates)?;
    let found = state
        .selector
        .find_nearest(&req.item_id, req.quantity, coordinates)
        .await?;
    Ok(Json(found))
}
