//! Stock mutation and lookup endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{ItemId, WarehouseId};
use inventory::{
    AdjustStock, Adjusted, CompleteSale, ReleaseStock, Released, Reservation, ReserveStock,
    Restock, Restocked, SaleCompleted,
};
use stock_ledger::{StockLedger, StockRecord};

use crate::error::ApiError;
use crate::routes::parse_id;
use crate::state::AppState;

/// POST /stock/reserve: hold units for an order or cart.
#[tracing::instrument(skip(state, cmd), fields(warehouse_id = %cmd.warehouse_id, item_id = %cmd.item_id))]
pub async fn reserve<L: StockLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Json(cmd): Json<ReserveStock>,
) -> Result<(StatusCode, Json<Reservation>), ApiError> {
    let reservation = state.engine.reserve(cmd).await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

/// POST /stock/release: hand held units back.
#[tracing::instrument(skip(state, cmd), fields(warehouse_id = %cmd.warehouse_id, item_id = %cmd.item_id))]
pub async fn release<L: StockLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Json(cmd): Json<ReleaseStock>,
) -> Result<Json<Released>, ApiError> {
    Ok(Json(state.engine.release(cmd).await?))
}

/// POST /stock/sale: convert held units into a sale.
#[tracing::instrument(skip(state, cmd), fields(warehouse_id = %cmd.warehouse_id, item_id = %cmd.item_id))]
pub async fn complete_sale<L: StockLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Json(cmd): Json<CompleteSale>,
) -> Result<Json<SaleCompleted>, ApiError> {
    Ok(Json(state.engine.complete_sale(cmd).await?))
}

/// POST /stock/adjust: set the on-hand quantity, guarded by version.
#[tracing::instrument(skip(state, cmd), fields(warehouse_id = %cmd.warehouse_id, item_id = %cmd.item_id))]
pub async fn adjust<L: StockLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Json(cmd): Json<AdjustStock>,
) -> Result<Json<Adjusted>, ApiError> {
    Ok(Json(state.engine.adjust(cmd).await?))
}

/// POST /stock/restock: add received units.
#[tracing::instrument(skip(state, cmd), fields(warehouse_id = %cmd.warehouse_id, item_id = %cmd.item_id))]
pub async fn restock<L: StockLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Json(cmd): Json<Restock>,
) -> Result<Json<Restocked>, ApiError> {
    Ok(Json(state.engine.restock(cmd).await?))
}

/// GET /stock/{warehouse_id}/{item_id}
#[tracing::instrument(skip(state))]
pub async fn get<L: StockLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path((warehouse_id, item_id)): Path<(String, String)>,
) -> Result<Json<StockRecord>, ApiError> {
    let warehouse_id: WarehouseId = parse_id(&warehouse_id, "warehouse_id")?;
    let record = state
        .engine
        .get_stock(warehouse_id, &ItemId::new(item_id))
        .await?;
    Ok(Json(record))
}

/// GET /items/{item_id}/stock: the item's records in every active warehouse.
#[tracing::instrument(skip(state))]
pub async fn for_item<L: StockLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(item_id): Path<String>,
) -> Result<Json<Vec<StockRecord>>, ApiError> {
    let records = state.engine.stock_for_item(&ItemId::new(item_id)).await?;
    Ok(Json(records))
}

/// GET /stock/low: records below their alert threshold.
#[tracing::instrument(skip(state))]
pub async fn low<L: StockLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
) -> Result<Json<Vec<StockRecord>>, ApiError> {
    Ok(Json(state.engine.low_stock().await?))
}
