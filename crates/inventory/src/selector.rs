//! Nearest-warehouse selection by great-circle distance.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use common::{Coordinates, ItemId, WarehouseId};
use serde::{Deserialize, Serialize};
use stock_ledger::{StockLedger, Warehouse};

use crate::error::{InventoryError, Result};

/// Selector settings.
#[derive(Debug, Clone, Default)]
pub struct SelectorConfig {
    /// Preferred warehouse when the customer location is unknown.
    pub default_warehouse_id: Option<WarehouseId>,
}

/// Delivery window in days, derived from distance alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryEstimate {
    pub min_days: u32,
    pub max_days: u32,
}

impl DeliveryEstimate {
    /// Step function: up to 200 km is 1-2 days, up to 500 km is 3-5 days,
    /// anything farther or unknown is 5-7 days.
    pub fn for_distance(distance_km: Option<f64>) -> Self {
        match distance_km {
            Some(d) if d <= 200.0 => Self {
                min_days: 1,
                max_days: 2,
            },
            Some(d) if d <= 500.0 => Self {
                min_days: 3,
                max_days: 5,
            },
            _ => Self {
                min_days: 5,
                max_days: 7,
            },
        }
    }
}

/// One active warehouse's stock of one item, as seen by a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseStock {
    pub warehouse_id: WarehouseId,
    pub warehouse_name: String,
    pub available: i64,

    /// `None` when either side has no coordinates.
    pub distance_km: Option<f64>,
}

/// Result of [`WarehouseSelector::find_nearest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseMatch {
    pub warehouse_id: WarehouseId,
    pub warehouse_name: String,
    pub distance_km: Option<f64>,
    pub available_quantity: i64,
    pub estimate: DeliveryEstimate,
}

/// Orders located warehouses nearest-first, unlocated ones after them.
///
/// The sort is stable, so equal distances keep warehouse creation order.
pub(crate) fn by_distance(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Reads every active warehouse's stock of `item_id`, nearest-first.
pub(crate) async fn stock_by_distance<L: StockLedger>(
    ledger: &L,
    warehouses: &HashMap<WarehouseId, Warehouse>,
    item_id: &ItemId,
    customer: Option<Coordinates>,
) -> Result<Vec<WarehouseStock>> {
    let records = ledger.records_for_item(item_id).await?;

    let mut stock: Vec<WarehouseStock> = records
        .into_iter()
        .filter_map(|record| {
            let warehouse = warehouses.get(&record.warehouse_id)?;
            let distance_km = match (customer, warehouse.coordinates) {
                (Some(c), Some(w)) => Some(c.distance_km(&w)),
                _ => None,
            };
            Some(WarehouseStock {
                warehouse_id: warehouse.id,
                warehouse_name: warehouse.name.clone(),
                available: record.available(),
                distance_km,
            })
        })
        .collect();

    stock.sort_by(|a, b| by_distance(a.distance_km, b.distance_km));
    Ok(stock)
}

pub(crate) async fn active_warehouses<L: StockLedger>(
    ledger: &L,
) -> Result<HashMap<WarehouseId, Warehouse>> {
    Ok(ledger
        .list_warehouses(true)
        .await?
        .into_iter()
        .map(|w| (w.id, w))
        .collect())
}

/// Picks the closest warehouse able to ship a whole line from stock.
pub struct WarehouseSelector<L: StockLedger> {
    ledger: Arc<L>,
    config: SelectorConfig,
}

impl<L: StockLedger> Clone for WarehouseSelector<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            config: self.config.clone(),
        }
    }
}

impl<L: StockLedger> WarehouseSelector<L> {
    /// Creates a new selector with default settings.
    pub fn new(ledger: Arc<L>) -> Self {
        Self::with_config(ledger, SelectorConfig::default())
    }

    pub fn with_config(ledger: Arc<L>, config: SelectorConfig) -> Self {
        Self { ledger, config }
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Returns the nearest active warehouse with `available >= required_quantity`.
    ///
    /// Without customer coordinates no distance can be computed: the configured
    /// default warehouse is used if it qualifies, otherwise the first qualifying
    /// warehouse in creation order.
    #[tracing::instrument(skip(self), fields(item_id = %item_id))]
    pub async fn find_nearest(
        &self,
        item_id: &ItemId,
        required_quantity: u32,
        customer: Option<Coordinates>,
    ) -> Result<WarehouseMatch> {
        if required_quantity == 0 {
            return Err(InventoryError::Validation(
                "required quantity must be greater than 0".to_string(),
            ));
        }

        let warehouses = active_warehouses(self.ledger.as_ref()).await?;
        let stock = stock_by_distance(self.ledger.as_ref(), &warehouses, item_id, customer).await?;
        let mut qualifying = stock
            .into_iter()
            .filter(|s| s.available >= i64::from(required_quantity));

        let chosen = if customer.is_none() {
            let qualifying: Vec<_> = qualifying.collect();
            let preferred = self
                .config
                .default_warehouse_id
                .and_then(|id| qualifying.iter().position(|s| s.warehouse_id == id));
            match preferred {
                Some(index) => qualifying.into_iter().nth(index),
                None => qualifying.into_iter().next(),
            }
        } else {
            qualifying.next()
        };

        let chosen = chosen.ok_or_else(|| InventoryError::NoWarehouseFulfillable {
            item_id: item_id.clone(),
            requested: required_quantity,
        })?;

        tracing::debug!(
            warehouse_id = %chosen.warehouse_id,
            distance_km = ?chosen.distance_km,
            "warehouse selected"
        );

        Ok(WarehouseMatch {
            warehouse_id: chosen.warehouse_id,
            warehouse_name: chosen.warehouse_name,
            distance_km: chosen.distance_km,
            available_quantity: chosen.available,
            estimate: DeliveryEstimate::for_distance(chosen.distance_km),
        })
    }
}
