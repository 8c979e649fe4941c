//! Checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use checkout::{CheckoutRequest, CheckoutResult};
use stock_ledger::StockLedger;

use crate::error::ApiError;
use crate::state::AppState;

/// POST /checkout: turn a cart into an order.
///
/// A 422 response carries the failing phase, every issue found, the stock
/// breakdown for stock problems and the phase log in `details`. Nothing is
/// left reserved after a failure, so the client may retry as is.
#[tracing::instrument(skip(state, req), fields(cart_id = %req.cart_id))]
pub async fn create<L: StockLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResult>), ApiError> {
    let result = state.checkout.checkout(req).await?;
    Ok((StatusCode::CREATED, Json(result)))
}
