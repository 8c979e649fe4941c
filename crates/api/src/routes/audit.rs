//! Audit log queries and reservation analytics.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use common::{ItemId, WarehouseId};
use inventory::ItemReservationStats;
use serde::Deserialize;
use stock_ledger::{AuditAction, AuditEntry, AuditQuery, StockLedger};

use crate::error::ApiError;
use crate::routes::parse_id;
use crate::state::AppState;

const DEFAULT_AUDIT_LIMIT: usize = 100;
const MAX_AUDIT_LIMIT: usize = 1000;

#[derive(Debug, Default, Deserialize)]
pub struct AuditParams {
    pub warehouse_id: Option<String>,
    pub item_id: Option<String>,
    pub reference: Option<String>,

    /// Comma-separated, e.g. `RESERVE,RELEASE`.
    pub actions: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditParams {
    fn into_query(self) -> Result<AuditQuery, ApiError> {
        let mut query = AuditQuery::new()
            .limit(self.limit.unwrap_or(DEFAULT_AUDIT_LIMIT).min(MAX_AUDIT_LIMIT));
        if let Some(raw) = self.warehouse_id {
            query = query.warehouse_id(parse_id::<WarehouseId>(&raw, "warehouse_id")?);
        }
        if let Some(item_id) = self.item_id {
            query = query.item_id(item_id);
        }
        if let Some(reference) = self.reference {
            query.reference = Some(reference);
        }
        if let Some(raw) = self.actions {
            let actions = raw
                .split(',')
                .map(|a| parse_id::<AuditAction>(&a.trim().to_ascii_uppercase(), "action"))
                .collect::<Result<Vec<_>, _>>()?;
            query = query.actions(actions);
        }
        if let Some(from) = self.from {
            query = query.from_timestamp(from);
        }
        if let Some(to) = self.to {
            query = query.to_timestamp(to);
        }
        Ok(query)
    }
}

/// GET /audit: filtered audit entries in insertion order.
#[tracing::instrument(skip(state))]
pub async fn list<L: StockLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Query(params): Query<AuditParams>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    let query = params.into_query()?;
    Ok(Json(state.engine.audit(query).await?))
}

/// GET /analytics/reservations: per-item conversion and hold time.
#[tracing::instrument(skip(state))]
pub async fn reservation_stats<L: StockLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
) -> Result<Json<Vec<ItemReservationStats>>, ApiError> {
    Ok(Json(state.analytics.item_stats().await?))
}

/// GET /analytics/reservations/{item_id}
#[tracing::instrument(skip(state))]
pub async fn item_reservation_stats<L: StockLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(item_id): Path<String>,
) -> Result<Json<ItemReservationStats>, ApiError> {
    let item_id = ItemId::new(item_id);
    state
        .analytics
        .for_item(&item_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No reservations recorded for {item_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_defaults_and_caps() {
        let query = AuditParams::default().into_query().unwrap();
        assert_eq!(query.limit, Some(DEFAULT_AUDIT_LIMIT));

        let query = AuditParams {
            limit: Some(50_000),
            ..AuditParams::default()
        }
        .into_query()
        .unwrap();
        assert_eq!(query.limit, Some(MAX_AUDIT_LIMIT));
    }

    #[test]
    fn actions_are_case_insensitive() {
        let query = AuditParams {
            actions: Some("reserve, Release".to_string()),
            ..AuditParams::default()
        }
        .into_query()
        .unwrap();
        assert_eq!(
            query.actions,
            Some(vec![AuditAction::Reserve, AuditAction::Release])
        );
    }

    #[test]
    fn unknown_action_is_rejected() {
        let err = AuditParams {
            actions: Some("RESERVE,STEAL".to_string()),
            ..AuditParams::default()
        }
        .into_query()
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
