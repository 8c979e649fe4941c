//! Cancels unpaid orders whose reservation hold has run out.

use std::sync::Arc;

use checkout::collaborators::{Notifier, Order, OrderLine, OrderService};
use common::{OrderId, ReservationRef};
use inventory::{ReleaseStock, ReservationEngine};
use serde::Serialize;
use stock_ledger::{AuditAction, AuditQuery, StockLedger};

use crate::error::{Result, SweepError};

pub const AUTO_CANCEL_TEMPLATE: &str = "order_auto_cancelled";

const RELEASE_REASON: &str = "reservation expired";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AutoReleaseOutcome {
    /// Nothing to do: the order is gone, paid or already closed.
    Skipped { reason: String },

    /// The order was cancelled. `failed` lines could not be released and
    /// stay held until someone releases them by hand.
    Cancelled { released: usize, failed: usize },
}

pub struct AutoReleaser<L: StockLedger> {
    engine: ReservationEngine<L>,
    orders: Arc<dyn OrderService>,
    notifier: Arc<dyn Notifier>,
}

impl<L: StockLedger> AutoReleaser<L> {
    pub fn new(
        ledger: Arc<L>,
        orders: Arc<dyn OrderService>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            engine: ReservationEngine::new(ledger),
            orders,
            notifier,
        }
    }

    /// Releases the stock of an unpaid order and cancels it.
    ///
    /// Safe to run more than once: lines already released or sold under the
    /// order's reference are skipped.
    #[tracing::instrument(skip(self))]
    pub async fn release_order(&self, order_id: OrderId) -> Result<AutoReleaseOutcome> {
        let order = self
            .orders
            .get_order(order_id)
            .await
            .map_err(SweepError::collaborator("orders"))?;
        let Some(order) = order else {
            tracing::warn!(%order_id, "auto-release fired for unknown order");
            return Ok(AutoReleaseOutcome::Skipped {
                reason: "order not found".to_string(),
            });
        };
        if !order.awaits_payment() {
            tracing::debug!(%order_id, status = %order.status, "order settled; nothing to release");
            return Ok(AutoReleaseOutcome::Skipped {
                reason: format!("order is {}", order.status),
            });
        }

        let (mut released, mut failed) = (0, 0);
        for line in &order.lines {
            match self.release_line(&order, line).await {
                Ok(true) => released += 1,
                Ok(false) => {}
                Err(e) => {
                    failed += 1;
                    metrics::counter!("auto_release_line_failures_total").increment(1);
                    tracing::error!(
                        %order_id,
                        item_id = %line.item_id,
                        warehouse_id = %line.warehouse_id,
                        quantity = line.quantity,
                        error = %e,
                        "failed to release reservation line"
                    );
                }
            }
        }

        self.orders
            .cancel_order(order_id, "payment not received in time")
            .await
            .map_err(SweepError::collaborator("orders"))?;
        tracing::info!(%order_id, released, failed, "unpaid order auto-cancelled");

        let data = serde_json::json!({
            "order_id": order_id,
            "order_number": order.order_number,
        });
        if let Err(e) = self
            .notifier
            .send(order.user_id, AUTO_CANCEL_TEMPLATE, data)
            .await
        {
            tracing::warn!(%order_id, error = %e, "failed to send auto-cancel notification");
        }

        Ok(AutoReleaseOutcome::Cancelled { released, failed })
    }

    /// Returns `false` when the line's hold was already closed earlier.
    async fn release_line(&self, order: &Order, line: &OrderLine) -> Result<bool> {
        let reference = ReservationRef::Order(order.id);
        let closed = self
            .engine
            .audit(
                AuditQuery::for_reference(reference)
                    .warehouse_id(line.warehouse_id)
                    .item_id(line.item_id.clone())
                    .actions(vec![AuditAction::Release, AuditAction::Sale])
                    .limit(1),
            )
            .await?;
        if !closed.is_empty() {
            return Ok(false);
        }

        self.engine
            .release(ReleaseStock {
                warehouse_id: line.warehouse_id,
                item_id: line.item_id.clone(),
                quantity: line.quantity,
                reference,
                reason: Some(RELEASE_REASON.to_string()),
            })
            .await?;
        Ok(true)
    }
}
