use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::{AuditAction, AuditEntry};
use crate::error::StockError;
use crate::{ItemId, WarehouseId};

/// Alert threshold given to records created by their first restock.
pub const DEFAULT_ALERT_THRESHOLD: i64 = 10;

/// Composite key of a stock record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub warehouse_id: WarehouseId,
    pub item_id: ItemId,
}

impl StockKey {
    pub fn new(warehouse_id: WarehouseId, item_id: impl Into<ItemId>) -> Self {
        Self {
            warehouse_id,
            item_id: item_id.into(),
        }
    }
}

impl std::fmt::Display for StockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.warehouse_id, self.item_id)
    }
}

/// Authoritative quantity/reserved tuple for one item in one warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub warehouse_id: WarehouseId,
    pub item_id: ItemId,

    /// Units physically on hand.
    pub quantity: i64,

    /// Units held by open reservations. Always `0 <= reserved <= quantity`.
    pub reserved: i64,

    /// Incremented by exactly one on every successful mutation.
    pub version: i64,

    /// `quantity` below this value counts as low stock.
    pub alert_threshold: i64,

    pub last_restock_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// A requested change to a stock record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StockMutation {
    /// Hold units for a pending order.
    Reserve { quantity: u32 },

    /// Cancel a hold.
    Release { quantity: u32 },

    /// Ship held units: quantity and reserved both drop.
    CompleteSale { quantity: u32 },

    /// Replace the on-hand count after a stock take. Version-checked.
    Adjust { new_quantity: u32, expected_version: i64 },

    /// Add received units.
    Restock { quantity: u32 },
}

impl StockMutation {
    /// The audit action recorded for this mutation.
    pub fn action(&self) -> AuditAction {
        match self {
            StockMutation::Reserve { .. } => AuditAction::Reserve,
            StockMutation::Release { .. } => AuditAction::Release,
            StockMutation::CompleteSale { .. } => AuditAction::Sale,
            StockMutation::Adjust { .. } => AuditAction::Adjustment,
            StockMutation::Restock { .. } => AuditAction::Restock,
        }
    }

    /// Whether this mutation may create the record when it does not exist yet.
    pub fn creates_record(&self) -> bool {
        matches!(self, StockMutation::Restock { .. })
    }

    /// Whether this mutation goes through compare-and-swap instead of a row lock.
    pub fn is_version_checked(&self) -> bool {
        matches!(self, StockMutation::Adjust { .. })
    }
}

/// Who asked for a mutation and why; copied verbatim into the audit entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationContext {
    pub reference: Option<String>,
    pub reason: Option<String>,
    pub actor: Option<String>,
}

impl MutationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reference(mut self, reference: impl ToString) -> Self {
        self.reference = Some(reference.to_string());
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

/// Result of a committed mutation.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub before: StockRecord,
    pub after: StockRecord,
    pub audit: AuditEntry,
}

impl StockRecord {
    /// An empty record, as created by the first restock of an item.
    pub fn empty(key: StockKey, now: DateTime<Utc>) -> Self {
        Self {
            warehouse_id: key.warehouse_id,
            item_id: key.item_id,
            quantity: 0,
            reserved: 0,
            version: 0,
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
            last_restock_at: None,
            updated_at: now,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.warehouse_id, self.item_id.clone())
    }

    /// Units that can still be reserved.
    pub fn available(&self) -> i64 {
        self.quantity - self.reserved
    }

    pub fn is_low_stock(&self) -> bool {
        self.quantity < self.alert_threshold
    }

    /// Checks `0 <= reserved <= quantity`.
    pub fn check_invariant(&self) -> Result<(), StockError> {
        if self.reserved < 0 || self.reserved > self.quantity {
            return Err(StockError::InvariantViolation {
                quantity: self.quantity,
                reserved: self.reserved,
            });
        }
        Ok(())
    }

    /// Computes the record that results from `mutation`.
    ///
    /// Pure: `self` is never modified, so a rejected mutation leaves the
    /// stored record exactly as it was.
    pub fn apply(
        &self,
        mutation: &StockMutation,
        now: DateTime<Utc>,
    ) -> Result<StockRecord, StockError> {
        let mut next = self.clone();

        match *mutation {
            StockMutation::Reserve { quantity } => {
                let requested = positive(quantity)?;
                if self.available() < requested {
                    return Err(StockError::InsufficientStock {
                        requested,
                        available: self.available(),
                    });
                }
                next.reserved += requested;
            }
            StockMutation::Release { quantity } => {
                let requested = positive(quantity)?;
                if requested > self.reserved {
                    return Err(StockError::InvalidReleaseQuantity {
                        requested,
                        reserved: self.reserved,
                    });
                }
                next.reserved -= requested;
            }
            StockMutation::CompleteSale { quantity } => {
                let requested = positive(quantity)?;
                if self.reserved < requested {
                    return Err(StockError::InsufficientReserved {
                        requested,
                        reserved: self.reserved,
                    });
                }
                next.quantity -= requested;
                next.reserved -= requested;
            }
            StockMutation::Adjust {
                new_quantity,
                expected_version,
            } => {
                if expected_version != self.version {
                    return Err(StockError::OptimisticLockConflict {
                        expected: expected_version,
                        actual: self.version,
                    });
                }
                let new_quantity = i64::from(new_quantity);
                if new_quantity < self.reserved {
                    return Err(StockError::BelowReserved {
                        new_quantity,
                        reserved: self.reserved,
                    });
                }
                next.quantity = new_quantity;
            }
            StockMutation::Restock { quantity } => {
                next.quantity += positive(quantity)?;
                next.last_restock_at = Some(now);
            }
        }

        next.version += 1;
        next.updated_at = now;
        next.check_invariant()?;
        Ok(next)
    }
}

fn positive(quantity: u32) -> Result<i64, StockError> {
    if quantity == 0 {
        return Err(StockError::InvalidQuantity { quantity: 0 });
    }
    Ok(i64::from(quantity))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(quantity: i64, reserved: i64) -> StockRecord {
        StockRecord {
            quantity,
            reserved,
            version: 3,
            ..StockRecord::empty(StockKey::new(WarehouseId::new(), "SKU-001"), Utc::now())
        }
    }

    #[test]
    fn available_and_low_stock() {
        let r = record(12, 5);
        assert_eq!(r.available(), 7);
        assert!(!r.is_low_stock());
        assert!(record(9, 0).is_low_stock());
    }

    #[test]
    fn reserve_up_to_available() {
        let r = record(10, 4);
        let next = r
            .apply(&StockMutation::Reserve { quantity: 6 }, Utc::now())
            .unwrap();
        assert_eq!(next.reserved, 10);
        assert_eq!(next.available(), 0);
        assert_eq!(next.version, 4);
    }

    #[test]
    fn reserve_more_than_available_fails() {
        let r = record(10, 4);
        let err = r
            .apply(&StockMutation::Reserve { quantity: 7 }, Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            StockError::InsufficientStock {
                requested: 7,
                available: 6
            }
        );
    }

    #[test]
    fn zero_quantity_rejected() {
        let r = record(10, 4);
        for mutation in [
            StockMutation::Reserve { quantity: 0 },
            StockMutation::Release { quantity: 0 },
            StockMutation::CompleteSale { quantity: 0 },
            StockMutation::Restock { quantity: 0 },
        ] {
            assert_eq!(
                r.apply(&mutation, Utc::now()).unwrap_err(),
                StockError::InvalidQuantity { quantity: 0 }
            );
        }
    }

    #[test]
    fn release_more_than_reserved_fails() {
        let r = record(10, 2);
        let err = r
            .apply(&StockMutation::Release { quantity: 3 }, Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            StockError::InvalidReleaseQuantity {
                requested: 3,
                reserved: 2
            }
        );
    }

    #[test]
    fn complete_sale_consumes_quantity_and_hold() {
        let r = record(10, 4);
        let next = r
            .apply(&StockMutation::CompleteSale { quantity: 3 }, Utc::now())
            .unwrap();
        assert_eq!(next.quantity, 7);
        assert_eq!(next.reserved, 1);
        assert_eq!(next.available(), r.available());
    }

    #[test]
    fn complete_sale_without_hold_fails() {
        let r = record(10, 1);
        assert!(matches!(
            r.apply(&StockMutation::CompleteSale { quantity: 2 }, Utc::now()),
            Err(StockError::InsufficientReserved { .. })
        ));
    }

    #[test]
    fn adjust_checks_version_then_reserved() {
        let r = record(10, 4);

        let stale = StockMutation::Adjust {
            new_quantity: 20,
            expected_version: 2,
        };
        assert_eq!(
            r.apply(&stale, Utc::now()).unwrap_err(),
            StockError::OptimisticLockConflict {
                expected: 2,
                actual: 3
            }
        );

        let too_low = StockMutation::Adjust {
            new_quantity: 3,
            expected_version: 3,
        };
        assert_eq!(
            r.apply(&too_low, Utc::now()).unwrap_err(),
            StockError::BelowReserved {
                new_quantity: 3,
                reserved: 4
            }
        );

        let ok = StockMutation::Adjust {
            new_quantity: 4,
            expected_version: 3,
        };
        let next = r.apply(&ok, Utc::now()).unwrap();
        assert_eq!(next.quantity, 4);
        assert_eq!(next.version, 4);
    }

    #[test]
    fn restock_sets_timestamp() {
        let r = record(0, 0);
        let now = Utc::now();
        let next = r
            .apply(&StockMutation::Restock { quantity: 25 }, now)
            .unwrap();
        assert_eq!(next.quantity, 25);
        assert_eq!(next.last_restock_at, Some(now));
    }

    #[test]
    fn invariant_check_catches_corruption() {
        assert!(record(5, 6).check_invariant().is_err());
        assert!(record(5, -1).check_invariant().is_err());
        assert!(record(5, 5).check_invariant().is_ok());
    }

    #[test]
    fn mutation_serialization() {
        let m = StockMutation::Adjust {
            new_quantity: 5,
            expected_version: 2,
        };
        let json = serde_json::to_value(m).unwrap();
        assert_eq!(json["type"], "adjust");
        let back: StockMutation = serde_json::from_value(json).unwrap();
        assert_eq!(back, m);
    }
}
