//! Read-only, cross-warehouse availability for a whole basket.

use std::collections::HashMap;
use std::sync::Arc;

use common::{Coordinates, ItemId, WarehouseId};
use serde::{Deserialize, Serialize};
use stock_ledger::StockLedger;

use crate::error::{InventoryError, Result};
use crate::selector::{WarehouseStock, active_warehouses, by_distance, stock_by_distance};

/// One requested line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRequest {
    pub item_id: ItemId,
    pub quantity: u32,
}

impl ItemRequest {
    pub fn new(item_id: impl Into<ItemId>, quantity: u32) -> Self {
        Self {
            item_id: item_id.into(),
            quantity,
        }
    }
}

/// Availability of one item across every active warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAvailability {
    pub item_id: ItemId,
    pub requested: u32,

    /// Sum over all warehouses; informational only, lines are never split.
    pub total_available: i64,

    /// True if a single warehouse can cover `requested`.
    pub fulfillable: bool,

    /// Nearest-first.
    pub warehouses: Vec<WarehouseStock>,
}

impl ItemAvailability {
    /// Warehouses that can ship the whole line, nearest-first.
    pub fn capable_warehouses(&self) -> impl Iterator<Item = &WarehouseStock> {
        let requested = i64::from(self.requested);
        self.warehouses.iter().filter(move |w| w.available >= requested)
    }

    /// Picks the warehouse to reserve this line from: `preferred` if it can
    /// ship the whole line, otherwise the nearest one that can.
    pub fn fulfilling_warehouse(&self, preferred: Option<WarehouseId>) -> Option<&WarehouseStock> {
        if let Some(id) = preferred
            && let Some(w) = self.capable_warehouses().find(|w| w.warehouse_id == id)
        {
            return Some(w);
        }
        self.capable_warehouses().next()
    }
}

/// The warehouse able to ship the most distinct items on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedWarehouse {
    pub warehouse_id: WarehouseId,
    pub warehouse_name: String,
    pub items_fulfillable: usize,
    pub distance_km: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub overall_fulfillable: bool,
    pub items: Vec<ItemAvailability>,
    pub recommended_warehouse: Option<RecommendedWarehouse>,
}

impl AvailabilityReport {
    pub fn unfulfillable(&self) -> impl Iterator<Item = &ItemAvailability> {
        self.items.iter().filter(|i| !i.fulfillable)
    }

    pub fn item(&self, item_id: &ItemId) -> Option<&ItemAvailability> {
        self.items.iter().find(|i| &i.item_id == item_id)
    }
}

/// Merges duplicate lines, keeping first-seen order.
fn merge_lines(items: &[ItemRequest]) -> Result<Vec<ItemRequest>> {
    let mut merged: Vec<ItemRequest> = Vec::with_capacity(items.len());
    for line in items {
        if line.quantity == 0 {
            return Err(InventoryError::Validation(format!(
                "quantity for {} must be greater than 0",
                line.item_id
            )));
        }
        if line.item_id.as_str().trim().is_empty() {
            return Err(InventoryError::Validation(
                "item id must not be empty".to_string(),
            ));
        }
        match merged.iter_mut().find(|m| m.item_id == line.item_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.checked_add(line.quantity).ok_or_else(
                    || InventoryError::Validation(format!("quantity for {} overflows", line.item_id)),
                )?;
            }
            None => merged.push(line.clone()),
        }
    }
    Ok(merged)
}

struct Tally {
    warehouse_id: WarehouseId,
    warehouse_name: String,
    distance_km: Option<f64>,
    first_seen: usize,
    items: usize,
}

/// Highest tally wins; ties go to the nearest warehouse, then to the one seen first.
fn recommend(items: &[ItemAvailability]) -> Option<RecommendedWarehouse> {
    let mut tallies: HashMap<WarehouseId, Tally> = HashMap::new();

    for item in items {
        for w in item.capable_warehouses() {
            let next_index = tallies.len();
            tallies
                .entry(w.warehouse_id)
                .or_insert_with(|| Tally {
                    warehouse_id: w.warehouse_id,
                    warehouse_name: w.warehouse_name.clone(),
                    distance_km: w.distance_km,
                    first_seen: next_index,
                    items: 0,
                })
                .items += 1;
        }
    }

    tallies
        .into_values()
        .min_by(|a, b| {
            b.items
                .cmp(&a.items)
                .then_with(|| by_distance(a.distance_km, b.distance_km))
                .then_with(|| a.first_seen.cmp(&b.first_seen))
        })
        .map(|t| RecommendedWarehouse {
            warehouse_id: t.warehouse_id,
            warehouse_name: t.warehouse_name,
            items_fulfillable: t.items,
            distance_km: t.distance_km,
        })
}

/// Answers "can this basket ship, and from where?" without touching `reserved`.
pub struct AvailabilityAggregator<L: StockLedger> {
    ledger: Arc<L>,
}

impl<L: StockLedger> Clone for AvailabilityAggregator<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
        }
    }
}

impl<L: StockLedger> AvailabilityAggregator<L> {
    /// Creates a new aggregator over the given ledger.
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    #[tracing::instrument(skip(self, items), fields(lines = items.len()))]
    pub async fn check_availability(
        &self,
        items: &[ItemRequest],
        customer: Option<Coordinates>,
    ) -> Result<AvailabilityReport> {
        if items.is_empty() {
            return Err(InventoryError::Validation(
                "at least one item is required".to_string(),
            ));
        }
        let lines = merge_lines(items)?;
        let warehouses = active_warehouses(self.ledger.as_ref()).await?;

        let mut report_items = Vec::with_capacity(lines.len());
        for line in lines {
            let stock =
                stock_by_distance(self.ledger.as_ref(), &warehouses, &line.item_id, customer)
                    .await?;
            let requested = i64::from(line.quantity);
            report_items.push(ItemAvailability {
                total_available: stock.iter().map(|w| w.available).sum(),
                fulfillable: stock.iter().any(|w| w.available >= requested),
                item_id: line.item_id,
                requested: line.quantity,
                warehouses: stock,
            });
        }

        let overall_fulfillable = report_items.iter().all(|i| i.fulfillable);
        let recommended_warehouse = recommend(&report_items);

        tracing::debug!(
            overall_fulfillable,
            recommended = ?recommended_warehouse.as_ref().map(|r| r.warehouse_id),
            "availability checked"
        );

        Ok(AvailabilityReport {
            overall_fulfillable,
            items: report_items,
            recommended_warehouse,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stock_ledger::{InMemoryStockLedger, MutationContext, NewWarehouse, StockKey, StockMutation};

    async fn warehouse(
        ledger: &InMemoryStockLedger,
        name: &str,
        coordinates: Option<Coordinates>,
        stock: &[(&str, u32)],
    ) -> WarehouseId {
        let warehouse = ledger
            .create_warehouse(NewWarehouse::new(name, coordinates))
            .await
            .unwrap();
        for (item, quantity) in stock {
            ledger
                .apply(
                    &StockKey::new(warehouse.id, *item),
                    StockMutation::Restock {
                        quantity: *quantity,
                    },
                    MutationContext::new(),
                )
                .await
                .unwrap();
        }
        warehouse.id
    }

    #[tokio::test]
    async fn boundary_available_equals_requested() {
        let ledger = Arc::new(InMemoryStockLedger::new());
        warehouse(&ledger, "Main", None, &[("SKU-A", 5)]).await;
        let aggregator = AvailabilityAggregator::new(ledger);

        let exact = aggregator
            .check_availability(&[ItemRequest::new("SKU-A", 5)], None)
            .await
            .unwrap();
        assert!(exact.overall_fulfillable);

        let over = aggregator
            .check_availability(&[ItemRequest::new("SKU-A", 6)], None)
            .await
            .unwrap();
        assert!(!over.overall_fulfillable);
        assert_eq!(over.unfulfillable().count(), 1);
    }

    #[tokio::test]
    async fn lines_are_never_split_across_warehouses() {
        let ledger = Arc::new(InMemoryStockLedger::new());
        warehouse(&ledger, "A", None, &[("SKU-A", 3)]).await;
        warehouse(&ledger, "B", None, &[("SKU-A", 3)]).await;
        let aggregator = AvailabilityAggregator::new(ledger);

        let report = aggregator
            .check_availability(&[ItemRequest::new("SKU-A", 4)], None)
            .await
            .unwrap();
        let item = &report.items[0];
        assert_eq!(item.total_available, 6);
        assert!(!item.fulfillable);
        assert!(report.recommended_warehouse.is_none());
    }

    #[tokio::test]
    async fn recommends_warehouse_covering_most_items() {
        let ledger = Arc::new(InMemoryStockLedger::new());
        warehouse(&ledger, "Partial", None, &[("SKU-A", 10)]).await;
        let full = warehouse(&ledger, "Full", None, &[("SKU-A", 10), ("SKU-B", 10)]).await;
        let aggregator = AvailabilityAggregator::new(ledger);

        let report = aggregator
            .check_availability(
                &[ItemRequest::new("SKU-A", 2), ItemRequest::new("SKU-B", 2)],
                None,
            )
            .await
            .unwrap();
        assert!(report.overall_fulfillable);
        let recommended = report.recommended_warehouse.unwrap();
        assert_eq!(recommended.warehouse_id, full);
        assert_eq!(recommended.items_fulfillable, 2);
    }

    #[tokio::test]
    async fn tie_goes_to_nearest_then_first_seen() {
        let ledger = Arc::new(InMemoryStockLedger::new());
        let first = warehouse(&ledger, "Far", Coordinates::new(12.0, 106.0), &[("SKU-A", 5)]).await;
        let near = warehouse(&ledger, "Near", Coordinates::new(10.8, 106.7), &[("SKU-A", 5)]).await;
        let aggregator = AvailabilityAggregator::new(ledger);
        let request = [ItemRequest::new("SKU-A", 1)];

        let located = aggregator
            .check_availability(&request, Coordinates::new(10.76, 106.66))
            .await
            .unwrap();
        assert_eq!(located.recommended_warehouse.unwrap().warehouse_id, near);

        let unlocated = aggregator.check_availability(&request, None).await.unwrap();
        assert_eq!(unlocated.recommended_warehouse.unwrap().warehouse_id, first);
    }

    #[tokio::test]
    async fn duplicate_lines_are_summed() {
        let ledger = Arc::new(InMemoryStockLedger::new());
        warehouse(&ledger, "Main", None, &[("SKU-A", 5)]).await;
        let aggregator = AvailabilityAggregator::new(ledger);

        let report = aggregator
            .check_availability(
                &[ItemRequest::new("SKU-A", 3), ItemRequest::new("SKU-A", 3)],
                None,
            )
            .await
            .unwrap();
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].requested, 6);
        assert!(!report.overall_fulfillable);
    }

    #[tokio::test]
    async fn check_is_read_only() {
        let ledger = Arc::new(InMemoryStockLedger::new());
        let wid = warehouse(&ledger, "Main", None, &[("SKU-A", 5)]).await;
        let aggregator = AvailabilityAggregator::new(Arc::clone(&ledger));
        let audit_before = ledger.audit_count().await;

        aggregator
            .check_availability(&[ItemRequest::new("SKU-A", 5)], None)
            .await
            .unwrap();

        let record = ledger
            .get_record(&StockKey::new(wid, "SKU-A"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.reserved, 0);
        assert_eq!(ledger.audit_count().await, audit_before);
    }

    #[tokio::test]
    async fn unknown_item_is_unfulfillable_not_an_error() {
        let ledger = Arc::new(InMemoryStockLedger::new());
        warehouse(&ledger, "Main", None, &[("SKU-A", 5)]).await;
        let aggregator = AvailabilityAggregator::new(ledger);

        let report = aggregator
            .check_availability(&[ItemRequest::new("SKU-Z", 1)], None)
            .await
            .unwrap();
        assert!(!report.overall_fulfillable);
        assert!(report.items[0].warehouses.is_empty());
    }

    #[tokio::test]
    async fn empty_and_zero_requests_are_rejected() {
        let aggregator = AvailabilityAggregator::new(Arc::new(InMemoryStockLedger::new()));
        assert!(matches!(
            aggregator.check_availability(&[], None).await,
            Err(InventoryError::Validation(_))
        ));
        assert!(matches!(
            aggregator
                .check_availability(&[ItemRequest::new("SKU-A", 0)], None)
                .await,
            Err(InventoryError::Validation(_))
        ));
    }

    #[test]
    fn fulfilling_warehouse_prefers_recommendation_when_capable() {
        let stock = |name: &str, available, distance| WarehouseStock {
            warehouse_id: WarehouseId::new(),
            warehouse_name: name.to_string(),
            available,
            distance_km: Some(distance),
        };
        let near = stock("near", 10, 1.0);
        let far = stock("far", 10, 9.0);
        let tiny = stock("tiny", 1, 0.5);
        let item = ItemAvailability {
            item_id: "SKU-A".into(),
            requested: 2,
            total_available: 21,
            fulfillable: true,
            warehouses: vec![tiny.clone(), near.clone(), far.clone()],
        };

        assert_eq!(item.fulfilling_warehouse(None), Some(&near));
        assert_eq!(item.fulfilling_warehouse(Some(far.warehouse_id)), Some(&far));
        assert_eq!(item.fulfilling_warehouse(Some(tiny.warehouse_id)), Some(&near));
    }
}
