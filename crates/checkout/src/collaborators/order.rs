use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AddressId, ItemId, OrderId, UserId, WarehouseId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::CollaboratorError;
use crate::pricing::PriceBreakdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CashOnDelivery,
    Card,
    BankTransfer,
    EWallet,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CashOnDelivery => "cash_on_delivery",
            PaymentMethod::Card => "card",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::EWallet => "e_wallet",
        }
    }

    pub fn is_cash_on_delivery(&self) -> bool {
        matches!(self, PaymentMethod::CashOnDelivery)
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Returned,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Returned => "returned",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

/// One order line, tied to the warehouse that holds its stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub item_id: ItemId,
    pub warehouse_id: WarehouseId,
    pub quantity: u32,
    pub unit_price: Decimal,
}

/// Order creation request.
///
/// The id is chosen by the caller so stock can be reserved under it before
/// the order exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub address_id: AddressId,
    pub payment_method: PaymentMethod,
    pub promo_code: Option<String>,
    pub lines: Vec<OrderLine>,
    pub pricing: PriceBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderConfirmation {
    pub order_id: OrderId,
    pub order_number: String,
    pub total: Decimal,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub user_id: UserId,
    pub address_id: AddressId,
    pub payment_method: PaymentMethod,
    pub promo_code: Option<String>,
    pub lines: Vec<OrderLine>,
    pub pricing: PriceBreakdown,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Whether an unpaid hold on this order may still be released.
    pub fn awaits_payment(&self) -> bool {
        self.payment_status != PaymentStatus::Paid
            && !matches!(
                self.status,
                OrderStatus::Paid | OrderStatus::Cancelled | OrderStatus::Returned
            )
    }
}

#[async_trait]
pub trait OrderService: Send + Sync {
    async fn create_order(&self, order: NewOrder) -> Result<OrderConfirmation, CollaboratorError>;

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>, CollaboratorError>;

    async fn cancel_order(&self, order_id: OrderId, reason: &str)
    -> Result<(), CollaboratorError>;

    /// Number of orders the user has placed, used for first-order promotions.
    async fn order_count(&self, user_id: UserId) -> Result<u64, CollaboratorError>;
}

#[derive(Default)]
struct OrderBook {
    orders: HashMap<OrderId, Order>,
    next_number: u64,
    fail_on_create: bool,
}

/// In-memory order service for testing.
#[derive(Clone, Default)]
pub struct InMemoryOrderService {
    book: Arc<RwLock<OrderBook>>,
}

impl InMemoryOrderService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to reject order creation.
    pub async fn set_fail_on_create(&self, fail: bool) {
        self.book.write().await.fail_on_create = fail;
    }

    /// Records a completed payment, as the payment collaborator would.
    pub async fn mark_paid(&self, order_id: OrderId) {
        if let Some(order) = self.book.write().await.orders.get_mut(&order_id) {
            order.payment_status = PaymentStatus::Paid;
            order.status = OrderStatus::Paid;
        }
    }

    pub async fn len(&self) -> usize {
        self.book.read().await.orders.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.book.read().await.orders.is_empty()
    }
}

#[async_trait]
impl OrderService for InMemoryOrderService {
    async fn create_order(&self, order: NewOrder) -> Result<OrderConfirmation, CollaboratorError> {
        let mut book = self.book.write().await;
        if book.fail_on_create {
            return Err(CollaboratorError::Unavailable(
                "order service unavailable".to_string(),
            ));
        }
        if book.orders.contains_key(&order.order_id) {
            return Err(CollaboratorError::Rejected(format!(
                "order {} already exists",
                order.order_id
            )));
        }

        book.next_number += 1;
        let now = Utc::now();
        let order_number = format!("ORD-{}-{:06}", now.format("%Y%m%d"), book.next_number);
        let created = Order {
            id: order.order_id,
            order_number: order_number.clone(),
            user_id: order.user_id,
            address_id: order.address_id,
            payment_method: order.payment_method,
            promo_code: order.promo_code,
            lines: order.lines,
            pricing: order.pricing,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            cancel_reason: None,
            created_at: now,
        };
        let confirmation = OrderConfirmation {
            order_id: created.id,
            order_number,
            total: created.pricing.total,
            status: created.status,
        };
        book.orders.insert(created.id, created);
        Ok(confirmation)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>, CollaboratorError> {
        Ok(self.book.read().await.orders.get(&order_id).cloned())
    }

    async fn cancel_order(
        &self,
        order_id: OrderId,
        reason: &str,
    ) -> Result<(), CollaboratorError> {
        let mut book = self.book.write().await;
        let order = book
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| CollaboratorError::Rejected(format!("order {order_id} not found")))?;
        order.status = OrderStatus::Cancelled;
        order.cancel_reason = Some(reason.to_string());
        Ok(())
    }

    async fn order_count(&self, user_id: UserId) -> Result<u64, CollaboratorError> {
        Ok(self
            .book
            .read()
            .await
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .count() as u64)
    }
}
