//! The checkout saga.
//!
//! Phases run in order and the first failing phase ends the attempt. Stock
//! is reserved line by line, each reservation under its own row lock; if a
//! later line or the order itself fails, every reservation already taken is
//! released again before the error is returned.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{
    AddressId, CartId, Coordinates, ItemId, OrderId, ReservationRef, UserId, WarehouseId,
};
use inventory::{
    AvailabilityAggregator, AvailabilityReport, DeliveryEstimate, InventoryError,
    ItemAvailability, ItemRequest, RESERVATION_TTL, ReleaseStock, ReservationEngine, ReserveStock,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stock_ledger::StockLedger;
use task_queue::{Task, TaskId, TaskQueue};

use crate::attempt::{CheckoutAttempt, ReservationOutcome};
use crate::collaborators::{
    Cart, Collaborators, NewOrder, OrderConfirmation, OrderLine, OrderStatus, PaymentMethod,
};
use crate::error::{CheckoutError, CheckoutFailure, Result};
use crate::issue::{CheckoutIssue, IssueCode};
use crate::phase::{CheckoutPhase, PhaseResult, PhaseStatus};
use crate::pricing::{PriceBreakdown, PricingPolicy};
use crate::promotion::PromotionService;

#[derive(Debug, Clone, Default)]
pub struct CheckoutConfig {
    pub pricing: PricingPolicy,

    /// Ship from here when the address has no coordinates and it has stock.
    pub default_warehouse_id: Option<WarehouseId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub cart_id: CartId,
    pub user_id: UserId,
    pub address_id: AddressId,
    pub payment_method: PaymentMethod,

    /// Overrides the code stored on the cart.
    #[serde(default)]
    pub promo_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutResult {
    pub order_id: OrderId,
    pub order_number: String,
    pub status: OrderStatus,
    pub pricing: PriceBreakdown,
    pub promo_code: Option<String>,
    pub reservations: Vec<ReservationOutcome>,
    pub warnings: Vec<CheckoutIssue>,
    pub phases: Vec<PhaseResult>,

    /// Bounded by the farthest warehouse shipping part of the order.
    pub delivery: DeliveryEstimate,

    /// Set for every successful non-cash-on-delivery checkout unless enqueueing failed.
    pub auto_release_task: Option<TaskId>,
    pub reservation_expires_at: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct PricedLine {
    item_id: ItemId,
    quantity: u32,
    unit_price: Decimal,
}

struct ValidatedCart {
    lines: Vec<PricedLine>,
    promo_code: Option<String>,
}

impl ValidatedCart {
    fn subtotal(&self) -> Decimal {
        self.lines
            .iter()
            .map(|l| l.unit_price * Decimal::from(l.quantity))
            .sum()
    }

    fn price_of(&self, item_id: &ItemId) -> Decimal {
        self.lines
            .iter()
            .find(|l| &l.item_id == item_id)
            .map_or(Decimal::ZERO, |l| l.unit_price)
    }
}

/// A line with the warehouse chosen to ship it.
struct Allocation {
    item_id: ItemId,
    warehouse_id: WarehouseId,
    quantity: u32,
    distance_km: Option<f64>,
}

/// Runs checkouts against the stock ledger and the external collaborators.
pub struct CheckoutOrchestrator<L: StockLedger> {
    engine: ReservationEngine<L>,
    aggregator: AvailabilityAggregator<L>,
    promotions: PromotionService,
    collaborators: Collaborators,
    queue: Arc<dyn TaskQueue>,
    config: CheckoutConfig,
}

impl<L: StockLedger> CheckoutOrchestrator<L> {
    pub fn new(
        ledger: Arc<L>,
        collaborators: Collaborators,
        queue: Arc<dyn TaskQueue>,
        config: CheckoutConfig,
    ) -> Self {
        let promotions = PromotionService::new(
            Arc::clone(&collaborators.promotions),
            Arc::clone(&collaborators.orders),
            Arc::clone(&collaborators.carts),
        );
        Self {
            engine: ReservationEngine::new(Arc::clone(&ledger)),
            aggregator: AvailabilityAggregator::new(ledger),
            promotions,
            collaborators,
            queue,
            config,
        }
    }

    pub fn promotions(&self) -> &PromotionService {
        &self.promotions
    }

    /// Runs one checkout attempt to completion or failure.
    ///
    /// A failed attempt holds no stock and created no order, so the caller
    /// may simply retry it.
    #[tracing::instrument(skip(self, request), fields(cart_id = %request.cart_id, user_id = %request.user_id))]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutResult> {
        metrics::counter!("checkout_attempts_total").increment(1);
        let mut attempt = CheckoutAttempt::new(request.cart_id, request.user_id);
        tracing::info!(order_id = %attempt.order_id, "checkout started");

        let result = self.run(&request, &mut attempt).await;
        metrics::histogram!("checkout_duration_seconds")
            .record(attempt.clock.elapsed().as_secs_f64());

        match &result {
            Ok(done) => {
                metrics::counter!("checkout_completed_total").increment(1);
                tracing::info!(
                    order_id = %done.order_id,
                    order_number = %done.order_number,
                    total = %done.pricing.total,
                    warnings = done.warnings.len(),
                    "checkout completed"
                );
            }
            Err(e) => {
                let phase = attempt.current_phase().as_str();
                metrics::counter!("checkout_failed_total", "phase" => phase).increment(1);
                tracing::warn!(phase, error = %e, "checkout failed");
            }
        }
        result
    }

    async fn run(
        &self,
        request: &CheckoutRequest,
        attempt: &mut CheckoutAttempt,
    ) -> Result<CheckoutResult> {
        let cart = self.validate_cart(attempt).await?;
        let coordinates = self.validate_address(request, attempt).await?;
        let (promo_code, discount) = self.validate_promo(request, &cart, attempt).await?;

        attempt.enter(CheckoutPhase::PricingCalculation);
        let pricing =
            self.config
                .pricing
                .price(cart.subtotal(), discount, request.payment_method);
        attempt.record(CheckoutPhase::PricingCalculation, PhaseStatus::Success);

        let allocations = self.select_warehouses(&cart, coordinates, attempt).await?;
        self.reserve_all(&allocations, attempt).await?;

        attempt.enter(CheckoutPhase::OrderCreation);
        let order = NewOrder {
            order_id: attempt.order_id,
            user_id: attempt.user_id,
            address_id: request.address_id,
            payment_method: request.payment_method,
            promo_code: promo_code.clone(),
            lines: allocations
                .iter()
                .map(|a| OrderLine {
                    item_id: a.item_id.clone(),
                    warehouse_id: a.warehouse_id,
                    quantity: a.quantity,
                    unit_price: cart.price_of(&a.item_id),
                })
                .collect(),
            pricing: pricing.clone(),
        };
        let confirmation = match self.collaborators.orders.create_order(order).await {
            Ok(confirmation) => confirmation,
            Err(e) => {
                tracing::error!(order_id = %attempt.order_id, error = %e, "order creation failed");
                self.rollback(attempt).await;
                return Err(phase_failed(
                    attempt,
                    CheckoutPhase::OrderCreation,
                    vec![CheckoutIssue::error(
                        IssueCode::OrderCreationFailed,
                        format!("order could not be created: {e}"),
                    )],
                    Vec::new(),
                ));
            }
        };
        attempt.record(CheckoutPhase::OrderCreation, PhaseStatus::Success);

        attempt.enter(CheckoutPhase::Cleanup);
        let auto_release = self
            .cleanup(request, &confirmation, promo_code.as_deref(), &allocations, attempt)
            .await;
        attempt.record(CheckoutPhase::Cleanup, PhaseStatus::Success);

        let farthest = allocations
            .iter()
            .map(|a| a.distance_km)
            .try_fold(0.0_f64, |max, d| d.map(|d| max.max(d)));

        Ok(CheckoutResult {
            order_id: confirmation.order_id,
            order_number: confirmation.order_number,
            status: confirmation.status,
            pricing,
            promo_code,
            reservations: attempt.reservations.clone(),
            warnings: attempt.warnings.clone(),
            phases: attempt.phases.clone(),
            delivery: DeliveryEstimate::for_distance(farthest),
            auto_release_task: auto_release.map(|(id, _)| id),
            reservation_expires_at: auto_release.map(|(_, due)| due),
            started_at: attempt.started_at,
        })
    }

    async fn validate_cart(&self, attempt: &mut CheckoutAttempt) -> Result<ValidatedCart> {
        attempt.enter(CheckoutPhase::CartValidation);
        let phase = CheckoutPhase::CartValidation;

        let cart = self
            .collaborators
            .carts
            .get_cart(attempt.cart_id)
            .await
            .map_err(|e| unavailable(attempt, CheckoutError::collaborator("carts", e)))?;
        let Some(cart) = cart else {
            let issue = CheckoutIssue::error(IssueCode::CartNotFound, "cart not found");
            return Err(phase_failed(attempt, phase, vec![issue], Vec::new()));
        };
        if let Some(issue) = cart_state_issue(&cart, attempt.user_id, Utc::now()) {
            return Err(phase_failed(attempt, phase, vec![issue], Vec::new()));
        }

        let mut issues = Vec::new();
        let mut lines = Vec::with_capacity(cart.items.len());
        for line in &cart.items {
            let item_id = line.item_id.clone();
            if line.quantity == 0 {
                issues.push(
                    CheckoutIssue::error(IssueCode::InvalidQuantity, "quantity must be positive")
                        .for_item(item_id),
                );
                continue;
            }

            let detail = self
                .collaborators
                .catalog
                .get_item_detail(&line.item_id)
                .await
                .map_err(|e| unavailable(attempt, CheckoutError::collaborator("catalog", e)))?;
            let Some(detail) = detail else {
                issues.push(
                    CheckoutIssue::error(IssueCode::ItemNotFound, format!("{item_id} not found"))
                        .for_item(item_id),
                );
                continue;
            };
            if !detail.is_active {
                issues.push(
                    CheckoutIssue::error(
                        IssueCode::ItemInactive,
                        format!("{} is no longer sold", detail.title),
                    )
                    .for_item(item_id),
                );
                continue;
            }
            let Some(price) = detail.current_price else {
                issues.push(
                    CheckoutIssue::error(
                        IssueCode::ItemUnpriced,
                        format!("{} has no price", detail.title),
                    )
                    .for_item(item_id),
                );
                continue;
            };
            if price < Decimal::ZERO {
                issues.push(
                    CheckoutIssue::error(
                        IssueCode::ItemUnpriced,
                        format!("{} has an invalid price {price}", detail.title),
                    )
                    .for_item(item_id),
                );
                continue;
            }

            let available: i64 = self
                .engine
                .stock_for_item(&line.item_id)
                .await
                .map_err(|e| unavailable(attempt, storage(e)))?
                .iter()
                .map(|r| r.available())
                .sum();
            if available < i64::from(line.quantity) {
                issues.push(
                    CheckoutIssue::error(
                        IssueCode::OutOfStock,
                        format!(
                            "{}: requested {}, available {available}",
                            detail.title, line.quantity
                        ),
                    )
                    .for_item(item_id.clone()),
                );
            }

            if price != line.unit_price {
                attempt.warn(
                    CheckoutIssue::warning(
                        IssueCode::PriceChanged,
                        format!(
                            "{} price changed from {} to {price}",
                            detail.title, line.unit_price
                        ),
                    )
                    .for_item(item_id.clone()),
                );
            }
            lines.push(PricedLine {
                item_id,
                quantity: line.quantity,
                unit_price: price,
            });
        }

        if issues.iter().any(CheckoutIssue::is_error) {
            return Err(phase_failed(attempt, phase, issues, Vec::new()));
        }
        attempt.record(phase, PhaseStatus::Success);
        Ok(ValidatedCart {
            lines,
            promo_code: cart.promo_code,
        })
    }

    async fn validate_address(
        &self,
        request: &CheckoutRequest,
        attempt: &mut CheckoutAttempt,
    ) -> Result<Option<Coordinates>> {
        attempt.enter(CheckoutPhase::AddressValidation);
        let address = self
            .collaborators
            .addresses
            .get_address(attempt.user_id, request.address_id)
            .await
            .map_err(|e| unavailable(attempt, CheckoutError::collaborator("addresses", e)))?;
        let Some(address) = address else {
            return Err(phase_failed(
                attempt,
                CheckoutPhase::AddressValidation,
                vec![CheckoutIssue::error(
                    IssueCode::AddressNotFound,
                    "shipping address not found",
                )],
                Vec::new(),
            ));
        };

        if address.coordinates.is_none() {
            attempt.warn(CheckoutIssue::warning(
                IssueCode::MissingCoordinates,
                "address has no coordinates; shipping from the default warehouse",
            ));
        }
        attempt.record(CheckoutPhase::AddressValidation, PhaseStatus::Success);
        Ok(address.coordinates)
    }

    async fn validate_promo(
        &self,
        request: &CheckoutRequest,
        cart: &ValidatedCart,
        attempt: &mut CheckoutAttempt,
    ) -> Result<(Option<String>, Decimal)> {
        attempt.enter(CheckoutPhase::PromoValidation);
        let Some(code) = request.promo_code.as_ref().or(cart.promo_code.as_ref()) else {
            attempt.record(CheckoutPhase::PromoValidation, PhaseStatus::Skipped);
            return Ok((None, Decimal::ZERO));
        };

        let validation = self
            .promotions
            .validate_promo(code, Some(attempt.user_id), cart.subtotal())
            .await
            .map_err(|e| unavailable(attempt, e))?;
        if let Some(reason) = validation.reason {
            return Err(phase_failed(
                attempt,
                CheckoutPhase::PromoValidation,
                vec![CheckoutIssue::error(
                    IssueCode::PromoInvalid,
                    format!("promo code {}: {reason}", validation.code),
                )],
                Vec::new(),
            ));
        }
        attempt.record(CheckoutPhase::PromoValidation, PhaseStatus::Success);
        Ok((Some(validation.code), validation.discount))
    }

    async fn select_warehouses(
        &self,
        cart: &ValidatedCart,
        coordinates: Option<Coordinates>,
        attempt: &mut CheckoutAttempt,
    ) -> Result<Vec<Allocation>> {
        let phase = CheckoutPhase::WarehouseSelection;
        attempt.enter(phase);
        let requests: Vec<ItemRequest> = cart
            .lines
            .iter()
            .map(|l| ItemRequest::new(l.item_id.clone(), l.quantity))
            .collect();

        let report = match self.aggregator.check_availability(&requests, coordinates).await {
            Ok(report) => report,
            Err(e @ InventoryError::Storage(_)) => return Err(unavailable(attempt, storage(e))),
            Err(e) => {
                let issue = CheckoutIssue::error(IssueCode::Unfulfillable, e.to_string());
                return Err(phase_failed(attempt, phase, vec![issue], Vec::new()));
            }
        };

        if !report.overall_fulfillable {
            let issues: Vec<_> = report
                .unfulfillable()
                .map(|item| {
                    CheckoutIssue::error(
                        IssueCode::Unfulfillable,
                        format!(
                            "no single warehouse can ship {} x {} ({} available in total)",
                            item.requested, item.item_id, item.total_available
                        ),
                    )
                    .for_item(item.item_id.clone())
                })
                .collect();
            return Err(phase_failed(attempt, phase, issues, report.items));
        }

        let preferred = self.preferred_warehouse(&report, coordinates);
        let mut allocations = Vec::with_capacity(report.items.len());
        for item in &report.items {
            let Some(warehouse) = item.fulfilling_warehouse(preferred) else {
                let issue = CheckoutIssue::error(
                    IssueCode::Unfulfillable,
                    format!("no warehouse can ship {}", item.item_id),
                )
                .for_item(item.item_id.clone());
                return Err(phase_failed(attempt, phase, vec![issue], report.items.clone()));
            };
            allocations.push(Allocation {
                item_id: item.item_id.clone(),
                warehouse_id: warehouse.warehouse_id,
                quantity: item.requested,
                distance_km: warehouse.distance_km,
            });
        }

        tracing::debug!(
            ?preferred,
            warehouses = ?allocations.iter().map(|a| a.warehouse_id).collect::<Vec<_>>(),
            "warehouses selected"
        );
        attempt.record(phase, PhaseStatus::Success);
        Ok(allocations)
    }

    fn preferred_warehouse(
        &self,
        report: &AvailabilityReport,
        coordinates: Option<Coordinates>,
    ) -> Option<WarehouseId> {
        let recommended = report.recommended_warehouse.as_ref().map(|r| r.warehouse_id);
        match coordinates {
            Some(_) => recommended,
            None => self.config.default_warehouse_id.or(recommended),
        }
    }

    async fn reserve_all(
        &self,
        allocations: &[Allocation],
        attempt: &mut CheckoutAttempt,
    ) -> Result<()> {
        let phase = CheckoutPhase::InventoryReservation;
        attempt.enter(phase);
        let reference = ReservationRef::Order(attempt.order_id);

        for allocation in allocations {
            let reserved = self
                .engine
                .reserve(ReserveStock {
                    warehouse_id: allocation.warehouse_id,
                    item_id: allocation.item_id.clone(),
                    quantity: allocation.quantity,
                    reference,
                    actor: Some(format!("user:{}", attempt.user_id)),
                })
                .await;

            match reserved {
                Ok(_) => attempt.reservations.push(ReservationOutcome::Reserved {
                    item_id: allocation.item_id.clone(),
                    warehouse_id: allocation.warehouse_id,
                    quantity: allocation.quantity,
                }),
                Err(e) => {
                    tracing::warn!(
                        item_id = %allocation.item_id,
                        warehouse_id = %allocation.warehouse_id,
                        error = %e,
                        "reservation failed"
                    );
                    attempt.reservations.push(ReservationOutcome::Failed {
                        item_id: allocation.item_id.clone(),
                        warehouse_id: allocation.warehouse_id,
                        quantity: allocation.quantity,
                        code: e.code().to_string(),
                        message: e.to_string(),
                    });
                    self.rollback(attempt).await;

                    let issue = CheckoutIssue::error(IssueCode::ReservationFailed, e.to_string())
                        .for_item(allocation.item_id.clone());
                    let stock = self.current_stock(allocations).await;
                    return Err(phase_failed(attempt, phase, vec![issue], stock));
                }
            }
        }

        attempt.record(phase, PhaseStatus::Success);
        Ok(())
    }

    /// Releases every reservation this attempt holds, newest first.
    ///
    /// Keeps going past individual failures; each one is logged and counted
    /// since it leaves stock held with no order.
    async fn rollback(&self, attempt: &CheckoutAttempt) {
        let reference = ReservationRef::Order(attempt.order_id);
        let held: Vec<_> = attempt.held().collect();
        if held.is_empty() {
            return;
        }
        metrics::counter!("checkout_rollbacks_total").increment(1);
        tracing::info!(order_id = %attempt.order_id, reservations = held.len(), "rolling back reservations");

        for (item_id, warehouse_id, quantity) in held {
            let released = self
                .engine
                .release(ReleaseStock {
                    warehouse_id,
                    item_id: item_id.clone(),
                    quantity,
                    reference,
                    reason: Some("checkout rollback".to_string()),
                })
                .await;
            if let Err(e) = released {
                metrics::counter!("checkout_rollback_failures_total").increment(1);
                tracing::error!(
                    %item_id,
                    %warehouse_id,
                    quantity,
                    error = %e,
                    "failed to release reservation during rollback"
                );
            }
        }
    }

    /// Fresh per-item stock for the failure report. Best effort.
    async fn current_stock(&self, allocations: &[Allocation]) -> Vec<ItemAvailability> {
        let requests: Vec<ItemRequest> = allocations
            .iter()
            .map(|a| ItemRequest::new(a.item_id.clone(), a.quantity))
            .collect();
        match self.aggregator.check_availability(&requests, None).await {
            Ok(report) => report.items,
            Err(e) => {
                tracing::warn!(error = %e, "could not load stock for failure report");
                Vec::new()
            }
        }
    }

    /// Follow-up work that must never fail the checkout.
    ///
    /// Returns the auto-release task and the instant it becomes due.
    async fn cleanup(
        &self,
        request: &CheckoutRequest,
        confirmation: &OrderConfirmation,
        promo_code: Option<&str>,
        allocations: &[Allocation],
        attempt: &mut CheckoutAttempt,
    ) -> Option<(TaskId, DateTime<Utc>)> {
        let order_id = confirmation.order_id;

        if let Err(e) = self
            .collaborators
            .carts
            .mark_checked_out(attempt.cart_id)
            .await
        {
            tracing::warn!(cart_id = %attempt.cart_id, error = %e, "failed to mark cart checked out");
        }

        if let Some(code) = promo_code
            && let Err(e) = self
                .collaborators
                .promotions
                .record_redemption(code, attempt.user_id, order_id)
                .await
        {
            tracing::warn!(%order_id, code, error = %e, "failed to record promo redemption");
        }

        let mut auto_release = None;
        if !request.payment_method.is_cash_on_delivery() {
            let task = Task::AutoReleaseReservation { order_id };
            let options = task.default_options().delay(RESERVATION_TTL);
            let enqueued_at = Utc::now();
            match self.queue.enqueue(task, options).await {
                Ok(id) => {
                    let due = match self.queue.get(id).await {
                        Ok(Some(record)) => record.run_at,
                        _ => enqueued_at + hold(),
                    };
                    auto_release = Some((id, due));
                }
                Err(e) => {
                    metrics::counter!("auto_release_enqueue_failures_total").increment(1);
                    tracing::error!(
                        %order_id,
                        error = %e,
                        "auto-release not scheduled; reservation will be held until released manually"
                    );
                    attempt.warn(CheckoutIssue::warning(
                        IssueCode::AutoReleaseNotScheduled,
                        "unpaid reservation will not be released automatically",
                    ));
                }
            }
        }

        let email = Task::SendOrderConfirmation {
            user_id: attempt.user_id,
            order_id,
            order_number: confirmation.order_number.clone(),
            total: confirmation.total,
        };
        self.enqueue_quietly(email).await;

        let analytics = Task::RecordCheckoutAnalytics {
            cart_id: attempt.cart_id,
            user_id: attempt.user_id,
            order_id,
            item_count: allocations.iter().map(|a| a.quantity).sum(),
            total: confirmation.total,
            duration_ms: u64::try_from(attempt.clock.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        self.enqueue_quietly(analytics).await;

        auto_release
    }

    async fn enqueue_quietly(&self, task: Task) {
        let kind = task.kind();
        let options = task.default_options();
        if let Err(e) = self.queue.enqueue(task, options).await {
            tracing::warn!(kind, error = %e, "failed to enqueue follow-up task");
        }
    }
}

fn cart_state_issue(cart: &Cart, user_id: UserId, now: DateTime<Utc>) -> Option<CheckoutIssue> {
    if cart.checked_out {
        return Some(CheckoutIssue::error(
            IssueCode::CartCheckedOut,
            "cart has already been checked out",
        ));
    }
    if cart.is_expired(now) {
        return Some(CheckoutIssue::error(IssueCode::CartExpired, "cart has expired"));
    }
    if cart.user_id.is_some_and(|owner| owner != user_id) {
        return Some(CheckoutIssue::error(
            IssueCode::CartNotOwned,
            "cart belongs to another user",
        ));
    }
    if cart.items.is_empty() {
        return Some(CheckoutIssue::error(IssueCode::CartEmpty, "cart is empty"));
    }
    None
}

fn phase_failed(
    attempt: &mut CheckoutAttempt,
    phase: CheckoutPhase,
    mut issues: Vec<CheckoutIssue>,
    stock: Vec<ItemAvailability>,
) -> CheckoutError {
    attempt.fail(phase, &issues);
    issues.extend(attempt.warnings.iter().cloned());
    CheckoutError::PhaseFailed(Box::new(CheckoutFailure {
        phase,
        issues,
        stock,
        phases: attempt.phases.clone(),
    }))
}

/// Fails the running phase because a dependency could not be reached.
fn unavailable(attempt: &mut CheckoutAttempt, err: CheckoutError) -> CheckoutError {
    let phase = attempt.current_phase();
    tracing::error!(%phase, error = %err, "checkout dependency unavailable");
    let issue = CheckoutIssue::error(IssueCode::CollaboratorUnavailable, err.to_string());
    phase_failed(attempt, phase, vec![issue], Vec::new())
}

fn storage(err: InventoryError) -> CheckoutError {
    CheckoutError::Collaborator {
        collaborator: "stock ledger",
        message: err.to_string(),
    }
}

fn hold() -> chrono::Duration {
    chrono::Duration::from_std(RESERVATION_TTL).unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::CartLine;

    fn cart(user_id: Option<UserId>) -> Cart {
        Cart::new(
            user_id,
            vec![CartLine {
                item_id: "SKU-1".into(),
                quantity: 1,
                unit_price: Decimal::ONE,
            }],
        )
    }

    #[test]
    fn cart_state_checks() {
        let user = UserId::new();
        let now = Utc::now();
        assert_eq!(cart_state_issue(&cart(Some(user)), user, now), None);
        assert_eq!(cart_state_issue(&cart(None), user, now), None);

        let issue = cart_state_issue(&cart(Some(UserId::new())), user, now).unwrap();
        assert_eq!(issue.code, IssueCode::CartNotOwned);

        let mut expired = cart(Some(user));
        expired.expires_at = Some(now - chrono::Duration::minutes(1));
        assert_eq!(
            cart_state_issue(&expired, user, now).unwrap().code,
            IssueCode::CartExpired
        );

        let mut empty = cart(Some(user));
        empty.items.clear();
        assert_eq!(
            cart_state_issue(&empty, user, now).unwrap().code,
            IssueCode::CartEmpty
        );

        let mut done = cart(Some(user));
        done.checked_out = true;
        assert_eq!(
            cart_state_issue(&done, user, now).unwrap().code,
            IssueCode::CartCheckedOut
        );
    }

    #[test]
    fn hold_is_fifteen_minutes() {
        assert_eq!(hold(), chrono::Duration::minutes(15));
    }
}
