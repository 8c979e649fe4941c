//! Reservation conversion and hold-time figures, computed from the audit log alone.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{ItemId, WarehouseId};
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use stock_ledger::{AuditAction, AuditEntry, StockLedger};

use crate::error::Result;

/// Reservation figures for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemReservationStats {
    pub item_id: ItemId,
    pub reservations: u64,
    pub reserved_units: i64,
    pub released_units: i64,
    pub sold_units: i64,

    /// `sold_units / reserved_units`, 0 when nothing was reserved.
    pub conversion_rate: f64,

    /// Mean time from RESERVE to the RELEASE or SALE that closed it.
    pub mean_hold_seconds: Option<f64>,
}

#[derive(Default)]
struct Accumulator {
    reservations: u64,
    reserved_units: i64,
    released_units: i64,
    sold_units: i64,
    closed_holds: u64,
    total_hold_seconds: f64,
}

type HoldKey = (WarehouseId, ItemId, String);

#[derive(Default)]
struct Pass {
    per_item: BTreeMap<ItemId, Accumulator>,
    open_holds: HashMap<HoldKey, DateTime<Utc>>,
}

impl Pass {
    fn observe(&mut self, entry: &AuditEntry) {
        let acc = self.per_item.entry(entry.item_id.clone()).or_default();
        let hold_key = entry
            .reference
            .as_ref()
            .map(|r| (entry.warehouse_id, entry.item_id.clone(), r.clone()));

        match entry.action {
            AuditAction::Reserve => {
                acc.reservations += 1;
                acc.reserved_units += entry.reserved_delta();
                if let Some(key) = hold_key {
                    self.open_holds.entry(key).or_insert(entry.recorded_at);
                }
            }
            AuditAction::Release | AuditAction::Sale => {
                let units = -entry.reserved_delta();
                if entry.action == AuditAction::Sale {
                    acc.sold_units += units;
                } else {
                    acc.released_units += units;
                }
                // The first release or sale for a reference closes its hold.
                if let Some(key) = hold_key
                    && let Some(opened) = self.open_holds.remove(&key)
                {
                    let held = entry.recorded_at - opened;
                    acc.closed_holds += 1;
                    acc.total_hold_seconds += held.num_milliseconds() as f64 / 1000.0;
                }
            }
            AuditAction::Restock | AuditAction::Adjustment => {}
        }
    }

    fn finish(self) -> Vec<ItemReservationStats> {
        self.per_item
            .into_iter()
            .filter(|(_, acc)| acc.reservations > 0)
            .map(|(item_id, acc)| ItemReservationStats {
                item_id,
                reservations: acc.reservations,
                reserved_units: acc.reserved_units,
                released_units: acc.released_units,
                sold_units: acc.sold_units,
                conversion_rate: if acc.reserved_units > 0 {
                    acc.sold_units as f64 / acc.reserved_units as f64
                } else {
                    0.0
                },
                mean_hold_seconds: (acc.closed_holds > 0)
                    .then(|| acc.total_hold_seconds / acc.closed_holds as f64),
            })
            .collect()
    }
}

/// Reads the audit stream once and aggregates per item.
pub struct ReservationAnalytics<L: StockLedger> {
    ledger: Arc<L>,
}

impl<L: StockLedger> ReservationAnalytics<L> {
    /// Creates a new analytics reader over the given ledger.
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    /// Figures for every item that has ever been reserved, ordered by item id.
    #[tracing::instrument(skip(self))]
    pub async fn item_stats(&self) -> Result<Vec<ItemReservationStats>> {
        let mut stream = self.ledger.stream_audit().await?;
        let mut pass = Pass::default();
        while let Some(entry) = stream.try_next().await? {
            pass.observe(&entry);
        }
        Ok(pass.finish())
    }

    pub async fn for_item(&self, item_id: &ItemId) -> Result<Option<ItemReservationStats>> {
        Ok(self
            .item_stats()
            .await?
            .into_iter()
            .find(|s| &s.item_id == item_id))
    }
}
