//! Reservation engine: the only write path into the stock ledger.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{ItemId, ReservationRef, WarehouseId};
use serde::{Deserialize, Serialize};
use stock_ledger::{
    AuditEntry, AuditQuery, MutationContext, MutationOutcome, NewWarehouse, StockKey, StockLedger,
    StockMutation, StockRecord, Warehouse, WarehouseUpdate,
};

use crate::error::{InventoryError, Result};

/// How long a reservation is advertised as held before the sweeper may release it.
pub const RESERVATION_TTL: Duration = Duration::from_secs(15 * 60);

/// Hold stock for an order or cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveStock {
    pub warehouse_id: WarehouseId,
    pub item_id: ItemId,
    pub quantity: u32,
    pub reference: ReservationRef,
    pub actor: Option<String>,
}

/// Cancel (part of) a hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseStock {
    pub warehouse_id: WarehouseId,
    pub item_id: ItemId,
    pub quantity: u32,
    pub reference: ReservationRef,
    pub reason: Option<String>,
}

/// Consume a hold as the stock ships.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteSale {
    pub warehouse_id: WarehouseId,
    pub item_id: ItemId,
    pub quantity: u32,
    pub reference: ReservationRef,
}

/// Replace the on-hand count, guarded by the record version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustStock {
    pub warehouse_id: WarehouseId,
    pub item_id: ItemId,
    pub new_quantity: u32,
    pub expected_version: i64,
    pub reason: String,
    pub actor: Option<String>,
}

/// Add received units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Restock {
    pub warehouse_id: WarehouseId,
    pub item_id: ItemId,
    pub quantity: u32,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub warehouse_id: WarehouseId,
    pub item_id: ItemId,
    pub reserved_quantity: u32,
    pub reference: ReservationRef,

    /// Advisory only; nothing expires the hold except an explicit release.
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Released {
    pub released_quantity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleCompleted {
    /// Units left on hand after the sale.
    pub remaining: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjusted {
    pub old_quantity: i64,
    pub new_quantity: i64,
    pub version: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restocked {
    pub new_quantity: i64,
}

/// Atomic reserve/release/sale/adjust/restock against the stock ledger.
///
/// Every call is a single ledger mutation. Failures are returned to the
/// caller as-is; the engine never retries.
pub struct ReservationEngine<L: StockLedger> {
    ledger: Arc<L>,
}

impl<L: StockLedger> Clone for ReservationEngine<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
        }
    }
}

impl<L: StockLedger> ReservationEngine<L> {
    /// Creates a new reservation engine over the given ledger.
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    /// Returns a reference to the underlying ledger.
    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    /// Holds `quantity` units for `reference`.
    #[tracing::instrument(skip(self, cmd), fields(warehouse_id = %cmd.warehouse_id, item_id = %cmd.item_id, reference = %cmd.reference))]
    pub async fn reserve(&self, cmd: ReserveStock) -> Result<Reservation> {
        let key = key_for(cmd.warehouse_id, &cmd.item_id)?;
        let mut context = MutationContext::new().reference(&cmd.reference);
        context.actor = cmd.actor;

        self.mutate(
            &key,
            StockMutation::Reserve {
                quantity: cmd.quantity,
            },
            context,
        )
        .await?;

        Ok(Reservation {
            warehouse_id: cmd.warehouse_id,
            item_id: cmd.item_id,
            reserved_quantity: cmd.quantity,
            reference: cmd.reference,
            expires_at: Utc::now() + hold_duration(),
        })
    }

    /// Cancels `quantity` units of a hold. Never drives `reserved` negative.
    #[tracing::instrument(skip(self, cmd), fields(warehouse_id = %cmd.warehouse_id, item_id = %cmd.item_id, reference = %cmd.reference))]
    pub async fn release(&self, cmd: ReleaseStock) -> Result<Released> {
        let key = key_for(cmd.warehouse_id, &cmd.item_id)?;
        let mut context = MutationContext::new().reference(&cmd.reference);
        context.reason = cmd.reason;

        self.mutate(
            &key,
            StockMutation::Release {
                quantity: cmd.quantity,
            },
            context,
        )
        .await?;

        Ok(Released {
            released_quantity: cmd.quantity,
        })
    }

    /// Ships held units: quantity and reserved drop together.
    #[tracing::instrument(skip(self, cmd), fields(warehouse_id = %cmd.warehouse_id, item_id = %cmd.item_id, reference = %cmd.reference))]
    pub async fn complete_sale(&self, cmd: CompleteSale) -> Result<SaleCompleted> {
        let key = key_for(cmd.warehouse_id, &cmd.item_id)?;
        let outcome = self
            .mutate(
                &key,
                StockMutation::CompleteSale {
                    quantity: cmd.quantity,
                },
                MutationContext::new().reference(&cmd.reference),
            )
            .await?;

        Ok(SaleCompleted {
            remaining: outcome.after.quantity,
        })
    }

    /// Manual stock-take correction.
    #[tracing::instrument(skip(self, cmd), fields(warehouse_id = %cmd.warehouse_id, item_id = %cmd.item_id))]
    pub async fn adjust(&self, cmd: AdjustStock) -> Result<Adjusted> {
        if cmd.reason.trim().is_empty() {
            return Err(InventoryError::Validation(
                "adjustment reason must not be empty".to_string(),
            ));
        }
        let key = key_for(cmd.warehouse_id, &cmd.item_id)?;
        let mut context = MutationContext::new().reason(cmd.reason);
        context.actor = cmd.actor;

        let outcome = self
            .mutate(
                &key,
                StockMutation::Adjust {
                    new_quantity: cmd.new_quantity,
                    expected_version: cmd.expected_version,
                },
                context,
            )
            .await?;

        Ok(Adjusted {
            old_quantity: outcome.before.quantity,
            new_quantity: outcome.after.quantity,
            version: outcome.after.version,
        })
    }

    /// Adds received units, creating the record on first stock.
    #[tracing::instrument(skip(self, cmd), fields(warehouse_id = %cmd.warehouse_id, item_id = %cmd.item_id))]
    pub async fn restock(&self, cmd: Restock) -> Result<Restocked> {
        let key = key_for(cmd.warehouse_id, &cmd.item_id)?;
        let mut context = MutationContext::new();
        context.reason = cmd.reason;

        let outcome = self
            .mutate(
                &key,
                StockMutation::Restock {
                    quantity: cmd.quantity,
                },
                context,
            )
            .await?;

        Ok(Restocked {
            new_quantity: outcome.after.quantity,
        })
    }

    pub async fn get_stock(&self, warehouse_id: WarehouseId, item_id: &ItemId) -> Result<StockRecord> {
        let key = key_for(warehouse_id, item_id)?;
        self.ledger
            .get_record(&key)
            .await?
            .ok_or_else(|| InventoryError::NotFound(format!("stock record {key}")))
    }

    /// Stock for one item across all active warehouses.
    pub async fn stock_for_item(&self, item_id: &ItemId) -> Result<Vec<StockRecord>> {
        Ok(self.ledger.records_for_item(item_id).await?)
    }

    /// Records currently below their alert threshold.
    pub async fn low_stock(&self) -> Result<Vec<StockRecord>> {
        Ok(self.ledger.low_stock_records().await?)
    }

    pub async fn audit(&self, query: AuditQuery) -> Result<Vec<AuditEntry>> {
        Ok(self.ledger.query_audit(query).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_warehouse(&self, warehouse: NewWarehouse) -> Result<Warehouse> {
        if warehouse.name.trim().is_empty() {
            return Err(InventoryError::Validation(
                "warehouse name must not be empty".to_string(),
            ));
        }
        let warehouse = self.ledger.create_warehouse(warehouse).await?;
        tracing::info!(warehouse_id = %warehouse.id, "warehouse created");
        Ok(warehouse)
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_warehouse(&self, update: WarehouseUpdate) -> Result<Warehouse> {
        if let Some(ref name) = update.name
            && name.trim().is_empty()
        {
            return Err(InventoryError::Validation(
                "warehouse name must not be empty".to_string(),
            ));
        }
        Ok(self.ledger.update_warehouse(update).await?)
    }

    /// Soft-deletes an empty warehouse.
    #[tracing::instrument(skip(self))]
    pub async fn deactivate_warehouse(
        &self,
        warehouse_id: WarehouseId,
        expected_version: i64,
    ) -> Result<Warehouse> {
        let warehouse = self
            .ledger
            .deactivate_warehouse(warehouse_id, expected_version)
            .await?;
        tracing::info!(%warehouse_id, "warehouse deactivated");
        Ok(warehouse)
    }

    pub async fn list_warehouses(&self) -> Result<Vec<Warehouse>> {
        Ok(self.ledger.list_warehouses(true).await?)
    }

    async fn mutate(
        &self,
        key: &StockKey,
        mutation: StockMutation,
        context: MutationContext,
    ) -> Result<MutationOutcome> {
        let action = mutation.action().as_str();

        match self.ledger.apply(key, mutation, context).await {
            Ok(outcome) => {
                metrics::counter!("stock_mutations_total", "action" => action).increment(1);
                tracing::debug!(
                    action,
                    quantity = outcome.after.quantity,
                    reserved = outcome.after.reserved,
                    version = outcome.after.version,
                    "stock mutation committed"
                );

                if outcome.after.is_low_stock() && !outcome.before.is_low_stock() {
                    metrics::counter!("stock_low_alerts_total").increment(1);
                    tracing::warn!(
                        warehouse_id = %key.warehouse_id,
                        item_id = %key.item_id,
                        quantity = outcome.after.quantity,
                        threshold = outcome.after.alert_threshold,
                        "stock fell below alert threshold"
                    );
                }
                Ok(outcome)
            }
            Err(e) => {
                metrics::counter!("stock_mutation_failures_total", "action" => action)
                    .increment(1);
                let e = InventoryError::from(e);
                tracing::debug!(action, error = %e, "stock mutation rejected");
                Err(e)
            }
        }
    }
}

fn key_for(warehouse_id: WarehouseId, item_id: &ItemId) -> Result<StockKey> {
    if item_id.as_str().trim().is_empty() {
        return Err(InventoryError::Validation(
            "item id must not be empty".to_string(),
        ));
    }
    Ok(StockKey::new(warehouse_id, item_id.clone()))
}

fn hold_duration() -> chrono::Duration {
    chrono::Duration::seconds(RESERVATION_TTL.as_secs() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderId;
    use stock_ledger::{AuditAction, InMemoryStockLedger};

    async fn engine_with_stock(quantity: u32) -> (ReservationEngine<InMemoryStockLedger>, WarehouseId) {
        let engine = ReservationEngine::new(Arc::new(InMemoryStockLedger::new()));
        let warehouse = engine
            .create_warehouse(NewWarehouse::new("Main", None))
            .await
            .unwrap();
        engine
            .restock(Restock {
                warehouse_id: warehouse.id,
                item_id: "SKU-001".into(),
                quantity,
                reason: Some("initial".to_string()),
            })
            .await
            .unwrap();
        (engine, warehouse.id)
    }

    fn reserve(warehouse_id: WarehouseId, quantity: u32, reference: ReservationRef) -> ReserveStock {
        ReserveStock {
            warehouse_id,
            item_id: "SKU-001".into(),
            quantity,
            reference,
            actor: None,
        }
    }

    fn release(warehouse_id: WarehouseId, quantity: u32, reference: ReservationRef) -> ReleaseStock {
        ReleaseStock {
            warehouse_id,
            item_id: "SKU-001".into(),
            quantity,
            reference,
            reason: Some("cancelled".to_string()),
        }
    }

    #[tokio::test]
    async fn reserve_then_release_round_trip() {
        let (engine, wid) = engine_with_stock(10).await;
        let reference = ReservationRef::Order(OrderId::new());
        let before = engine.get_stock(wid, &"SKU-001".into()).await.unwrap();

        let reservation = engine
            .reserve(reserve(wid, 4, reference))
            .await
            .unwrap();
        assert_eq!(reservation.reserved_quantity, 4);
        assert!(reservation.expires_at > Utc::now() + chrono::Duration::minutes(14));

        let released = engine
            .release(release(wid, 4, reference))
            .await
            .unwrap();
        assert_eq!(released.released_quantity, 4);

        let after = engine.get_stock(wid, &"SKU-001".into()).await.unwrap();
        assert_eq!(after.reserved, before.reserved);
        assert_eq!(after.version, before.version + 2);

        let audit = engine
            .audit(AuditQuery::for_reference(&reference))
            .await
            .unwrap();
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[0].action, AuditAction::Reserve);
        assert_eq!(audit[1].action, AuditAction::Release);
    }

    #[tokio::test]
    async fn over_release_is_rejected_and_leaves_record_unchanged() {
        let (engine, wid) = engine_with_stock(10).await;
        let reference = ReservationRef::Order(OrderId::new());
        engine
            .reserve(reserve(wid, 2, reference))
            .await
            .unwrap();
        let before = engine.get_stock(wid, &"SKU-001".into()).await.unwrap();

        let err = engine
            .release(release(wid, 3, reference))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InventoryError::InvalidReleaseQuantity {
                requested: 3,
                reserved: 2
            }
        ));
        assert_eq!(engine.get_stock(wid, &"SKU-001".into()).await.unwrap(), before);
    }

    #[tokio::test]
    async fn insufficient_stock_reports_available() {
        let (engine, wid) = engine_with_stock(5).await;
        let err = engine
            .reserve(reserve(wid, 6, ReservationRef::Order(OrderId::new())))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InventoryError::InsufficientStock {
                requested: 6,
                available: 5
            }
        ));
    }

    #[tokio::test]
    async fn complete_sale_returns_remaining() {
        let (engine, wid) = engine_with_stock(10).await;
        let reference = ReservationRef::Order(OrderId::new());
        engine
            .reserve(reserve(wid, 3, reference))
            .await
            .unwrap();

        let sale = engine
            .complete_sale(CompleteSale {
                warehouse_id: wid,
                item_id: "SKU-001".into(),
                quantity: 3,
                reference,
            })
            .await
            .unwrap();
        assert_eq!(sale.remaining, 7);

        let record = engine.get_stock(wid, &"SKU-001".into()).await.unwrap();
        assert_eq!(record.reserved, 0);
    }

    #[tokio::test]
    async fn adjust_requires_reason_and_current_version() {
        let (engine, wid) = engine_with_stock(10).await;
        let mut cmd = AdjustStock {
            warehouse_id: wid,
            item_id: "SKU-001".into(),
            new_quantity: 12,
            expected_version: 1,
            reason: " ".to_string(),
            actor: Some("auditor".to_string()),
        };
        assert!(matches!(
            engine.adjust(cmd.clone()).await,
            Err(InventoryError::Validation(_))
        ));

        cmd.reason = "cycle count".to_string();
        let adjusted = engine.adjust(cmd.clone()).await.unwrap();
        assert_eq!(
            adjusted,
            Adjusted {
                old_quantity: 10,
                new_quantity: 12,
                version: 2
            }
        );

        assert!(matches!(
            engine.adjust(cmd).await,
            Err(InventoryError::OptimisticLockConflict {
                expected: 1,
                actual: 2
            })
        ));
    }

    #[tokio::test]
    async fn unknown_record_is_not_found() {
        let (engine, wid) = engine_with_stock(1).await;
        let err = engine
            .reserve(ReserveStock {
                item_id: "SKU-404".into(),
                ..reserve(wid, 1, ReservationRef::Order(OrderId::new()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn empty_item_id_is_validation() {
        let (engine, wid) = engine_with_stock(1).await;
        let err = engine.get_stock(wid, &"".into()).await.unwrap_err();
        assert!(matches!(err, InventoryError::Validation(_)));
    }

    #[tokio::test]
    async fn low_stock_lists_records_below_threshold() {
        let (engine, wid) = engine_with_stock(12).await;
        assert!(engine.low_stock().await.unwrap().is_empty());

        let reference = ReservationRef::Order(OrderId::new());
        engine
            .reserve(reserve(wid, 5, reference))
            .await
            .unwrap();
        engine
            .complete_sale(CompleteSale {
                warehouse_id: wid,
                item_id: "SKU-001".into(),
                quantity: 5,
                reference,
            })
            .await
            .unwrap();

        let low = engine.low_stock().await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].quantity, 7);
    }

    #[tokio::test]
    async fn deactivating_stocked_warehouse_is_rejected() {
        let (engine, wid) = engine_with_stock(1).await;
        let err = engine.deactivate_warehouse(wid, 1).await.unwrap_err();
        assert!(matches!(err, InventoryError::Validation(_)));
        assert_eq!(engine.list_warehouses().await.unwrap().len(), 1);
    }
}
