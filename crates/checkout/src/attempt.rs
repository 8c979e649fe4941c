use std::time::Instant;

use chrono::{DateTime, Utc};
use common::{CartId, ItemId, OrderId, UserId, WarehouseId};
use serde::{Deserialize, Serialize};

use crate::issue::CheckoutIssue;
use crate::phase::{CheckoutPhase, PhaseResult, PhaseStatus};

/// Result of reserving one line during a checkout attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReservationOutcome {
    Reserved {
        item_id: ItemId,
        warehouse_id: WarehouseId,
        quantity: u32,
    },
    Failed {
        item_id: ItemId,
        warehouse_id: WarehouseId,
        quantity: u32,
        code: String,
        message: String,
    },
}

impl ReservationOutcome {
    pub fn is_reserved(&self) -> bool {
        matches!(self, ReservationOutcome::Reserved { .. })
    }
}

/// Mutable state of one checkout, threaded through the phases.
#[derive(Debug)]
pub(crate) struct CheckoutAttempt {
    pub cart_id: CartId,
    pub user_id: UserId,

    /// Chosen up front; reservations are made under this id.
    pub order_id: OrderId,
    current: CheckoutPhase,
    pub phases: Vec<PhaseResult>,
    pub reservations: Vec<ReservationOutcome>,
    pub warnings: Vec<CheckoutIssue>,

    /// Issues raised since the last phase was recorded.
    phase_issues: Vec<CheckoutIssue>,
    pub started_at: DateTime<Utc>,
    pub clock: Instant,
}

impl CheckoutAttempt {
    pub fn new(cart_id: CartId, user_id: UserId) -> Self {
        Self {
            cart_id,
            user_id,
            order_id: OrderId::new(),
            current: CheckoutPhase::CartValidation,
            phases: Vec::new(),
            reservations: Vec::new(),
            warnings: Vec::new(),
            phase_issues: Vec::new(),
            started_at: Utc::now(),
            clock: Instant::now(),
        }
    }

    pub fn enter(&mut self, phase: CheckoutPhase) {
        self.current = phase;
    }

    /// The phase running now, or the last one to run.
    pub fn current_phase(&self) -> CheckoutPhase {
        self.current
    }

    pub fn record(&mut self, phase: CheckoutPhase, status: PhaseStatus) {
        tracing::debug!(phase = %phase, ?status, "checkout phase finished");
        self.phases.push(PhaseResult {
            phase,
            status,
            finished_at: Utc::now(),
            issues: std::mem::take(&mut self.phase_issues),
        });
    }

    /// Records `phase` as failed with the errors that stopped it.
    pub fn fail(&mut self, phase: CheckoutPhase, errors: &[CheckoutIssue]) {
        self.phase_issues.extend_from_slice(errors);
        self.record(phase, PhaseStatus::Failed);
    }

    pub fn warn(&mut self, issue: CheckoutIssue) {
        tracing::warn!(code = ?issue.code, message = %issue.message, "checkout warning");
        self.phase_issues.push(issue.clone());
        self.warnings.push(issue);
    }

    /// Successful reservations, most recent first.
    pub fn held(&self) -> impl Iterator<Item = (&ItemId, WarehouseId, u32)> {
        self.reservations.iter().rev().filter_map(|r| match r {
            ReservationOutcome::Reserved {
                item_id,
                warehouse_id,
                quantity,
            } => Some((item_id, *warehouse_id, *quantity)),
            ReservationOutcome::Failed { .. } => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::IssueCode;

    #[test]
    fn issues_belong_to_the_phase_that_raised_them() {
        let mut attempt = CheckoutAttempt::new(CartId::new(), UserId::new());
        attempt.warn(CheckoutIssue::warning(IssueCode::PriceChanged, "price moved"));
        attempt.record(CheckoutPhase::CartValidation, PhaseStatus::Success);
        attempt.fail(
            CheckoutPhase::AddressValidation,
            &[CheckoutIssue::error(IssueCode::AddressNotFound, "no address")],
        );

        assert_eq!(attempt.phases[0].issues.len(), 1);
        assert_eq!(attempt.phases[0].issues[0].code, IssueCode::PriceChanged);
        assert_eq!(attempt.phases[1].status, PhaseStatus::Failed);
        assert_eq!(attempt.phases[1].issues.len(), 1);
        assert_eq!(attempt.phases[1].issues[0].code, IssueCode::AddressNotFound);
        assert_eq!(attempt.warnings.len(), 1);
    }
}
