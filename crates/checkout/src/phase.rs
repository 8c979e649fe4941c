use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::issue::CheckoutIssue;

/// Checkout phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutPhase {
    CartValidation,
    AddressValidation,
    PromoValidation,
    PricingCalculation,
    WarehouseSelection,
    InventoryReservation,
    OrderCreation,
    Cleanup,
}

impl CheckoutPhase {
    pub const ALL: [CheckoutPhase; 8] = [
        CheckoutPhase::CartValidation,
        CheckoutPhase::AddressValidation,
        CheckoutPhase::PromoValidation,
        CheckoutPhase::PricingCalculation,
        CheckoutPhase::WarehouseSelection,
        CheckoutPhase::InventoryReservation,
        CheckoutPhase::OrderCreation,
        CheckoutPhase::Cleanup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutPhase::CartValidation => "CART_VALIDATION",
            CheckoutPhase::AddressValidation => "ADDRESS_VALIDATION",
            CheckoutPhase::PromoValidation => "PROMO_VALIDATION",
            CheckoutPhase::PricingCalculation => "PRICING_CALCULATION",
            CheckoutPhase::WarehouseSelection => "WAREHOUSE_SELECTION",
            CheckoutPhase::InventoryReservation => "INVENTORY_RESERVATION",
            CheckoutPhase::OrderCreation => "ORDER_CREATION",
            CheckoutPhase::Cleanup => "CLEANUP",
        }
    }
}

impl std::fmt::Display for CheckoutPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Success,
    Skipped,
    Failed,
}

/// Outcome of one phase, kept in the attempt's phase log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase: CheckoutPhase,
    pub status: PhaseStatus,
    pub finished_at: DateTime<Utc>,

    /// Errors that failed the phase and warnings raised while it ran.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<CheckoutIssue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_serialize_as_screaming_snake() {
        for phase in CheckoutPhase::ALL {
            let json = serde_json::to_value(phase).unwrap();
            assert_eq!(json, phase.as_str());
        }
    }
}
