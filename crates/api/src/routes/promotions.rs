//! Promo code validation and cart promo management.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::PromoValidation;
use common::{CartId, UserId};
use rust_decimal::Decimal;
use serde::Deserialize;
use stock_ledger::StockLedger;

use crate::error::ApiError;
use crate::routes::parse_id;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ValidatePromoRequest {
    pub code: String,
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub subtotal: Decimal,
}

#[derive(Deserialize)]
pub struct ApplyPromoRequest {
    pub code: String,
    #[serde(default)]
    pub user_id: Option<UserId>,
}

/// POST /promotions/validate: check a code without touching any cart.
///
/// A rejected code is a 200 with `valid: false` and the reason.
#[tracing::instrument(skip(state, req), fields(code = %req.code))]
pub async fn validate<L: StockLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Json(req): Json<ValidatePromoRequest>,
) -> Result<Json<PromoValidation>, ApiError> {
    if req.subtotal.is_sign_negative() {
        return Err(ApiError::BadRequest("subtotal must not be negative".to_string()));
    }
    let validation = state
        .promotions()
        .validate_promo(&req.code, req.user_id, req.subtotal)
        .await?;
    Ok(Json(validation))
}

/// POST /carts/{cart_id}/promo: store a code on the cart if it is valid.
#[tracing::instrument(skip(state, req), fields(code = %req.code))]
pub async fn apply<L: StockLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(cart_id): Path<String>,
    Json(req): Json<ApplyPromoRequest>,
) -> Result<Json<PromoValidation>, ApiError> {
    let cart_id: CartId = parse_id(&cart_id, "cart id")?;
    let validation = state
        .promotions()
        .apply_promo_code(cart_id, req.user_id, &req.code)
        .await?;
    Ok(Json(validation))
}

/// DELETE /carts/{cart_id}/promo
#[tracing::instrument(skip(state))]
pub async fn remove<L: StockLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(cart_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let cart_id: CartId = parse_id(&cart_id, "cart id")?;
    state.promotions().remove_promo_code(cart_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
