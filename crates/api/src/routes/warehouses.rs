//! Warehouse administration.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{Coordinates, WarehouseId};
use serde::Deserialize;
use stock_ledger::{NewWarehouse, StockLedger, Warehouse, WarehouseUpdate};

use crate::error::ApiError;
use crate::routes::{checked_coordinates, parse_id};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateWarehouseRequest {
    pub name: String,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

#[derive(Deserialize)]
pub struct UpdateWarehouseRequest {
    pub expected_version: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

#[derive(Deserialize)]
pub struct DeactivateWarehouseRequest {
    pub expected_version: i64,
}

/// GET /warehouses: active warehouses in creation order.
#[tracing::instrument(skip(state))]
pub async fn list<L: StockLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
) -> Result<Json<Vec<Warehouse>>, ApiError> {
    Ok(Json(state.engine.list_warehouses().await?))
}

/// POST /warehouses
#[tracing::instrument(skip(state, req), fields(name = %req.name))]
pub async fn create<L: StockLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Json(req): Json<CreateWarehouseRequest>,
) -> Result<(StatusCode, Json<Warehouse>), ApiError> {
    let coordinates = checked_coordinates(req.coordinates)?;
    let warehouse = state
        .engine
        .create_warehouse(NewWarehouse::new(req.name, coordinates))
        .await?;
    Ok((StatusCode::CREATED, Json(warehouse)))
}

/// PATCH /warehouses/{id}
#[tracing::instrument(skip(state, req))]
pub async fn update<L: StockLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateWarehouseRequest>,
) -> Result<Json<Warehouse>, ApiError> {
    let id: WarehouseId = parse_id(&id, "warehouse id")?;
    let mut update = WarehouseUpdate::new(id, req.expected_version);
    if let Some(name) = req.name {
        update = update.name(name);
    }
    if let Some(coordinates) = checked_coordinates(req.coordinates)? {
        update = update.coordinates(coordinates);
    }
    Ok(Json(state.engine.update_warehouse(update).await?))
}

/// POST /warehouses/{id}/deactivate: soft-delete an empty warehouse.
#[tracing::instrument(skip(state, req))]
pub async fn deactivate<L: StockLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(id): Path<String>,
    Json(req): Json<DeactivateWarehouseRequest>,
) -> Result<Json<Warehouse>, ApiError> {
    let id: WarehouseId = parse_id(&id, "warehouse id")?;
    let warehouse = state
        .engine
        .deactivate_warehouse(id, req.expected_version)
        .await?;
    Ok(Json(warehouse))
}
