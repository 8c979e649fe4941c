use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::CollaboratorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DiscountKind {
    /// Percent of the subtotal, e.g. `10` for 10%.
    Percentage(Decimal),
    Fixed(Decimal),
}

/// A promotion as stored by the marketing system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Promotion {
    pub code: String,
    pub discount: DiscountKind,
    pub max_discount: Option<Decimal>,
    pub min_order_amount: Option<Decimal>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,

    /// Global redemption cap; `None` is unlimited.
    pub max_uses: Option<u32>,
    pub current_uses: u32,
    pub per_user_limit: Option<u32>,
    pub first_order_only: bool,
}

impl Promotion {
    /// An active, unlimited promotion with no window.
    pub fn new(code: impl Into<String>, discount: DiscountKind) -> Self {
        Self {
            code: code.into(),
            discount,
            max_discount: None,
            min_order_amount: None,
            starts_at: None,
            expires_at: None,
            is_active: true,
            max_uses: None,
            current_uses: 0,
            per_user_limit: None,
            first_order_only: false,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_uses.is_some_and(|max| self.current_uses >= max)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

pub(crate) fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[async_trait]
pub trait PromotionStore: Send + Sync {
    /// Looks a code up case-insensitively.
    async fn get_promotion(&self, code: &str) -> Result<Option<Promotion>, CollaboratorError>;

    async fn user_usage_count(&self, code: &str, user_id: UserId)
    -> Result<u32, CollaboratorError>;

    async fn record_redemption(
        &self,
        code: &str,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<(), CollaboratorError>;
}

#[derive(Default)]
struct PromotionBook {
    promotions: HashMap<String, Promotion>,
    redemptions: Vec<(String, UserId, OrderId)>,
}

/// In-memory promotion store for testing.
#[derive(Clone, Default)]
pub struct InMemoryPromotionStore {
    book: Arc<RwLock<PromotionBook>>,
}

impl InMemoryPromotionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, promotion: Promotion) {
        self.book
            .write()
            .await
            .promotions
            .insert(normalize_code(&promotion.code), promotion);
    }

    pub async fn deactivate(&self, code: &str) {
        if let Some(p) = self.book.write().await.promotions.get_mut(&normalize_code(code)) {
            p.is_active = false;
        }
    }
}

#[async_trait]
impl PromotionStore for InMemoryPromotionStore {
    async fn get_promotion(&self, code: &str) -> Result<Option<Promotion>, CollaboratorError> {
        Ok(self
            .book
            .read()
            .await
            .promotions
            .get(&normalize_code(code))
            .cloned())
    }

    async fn user_usage_count(
        &self,
        code: &str,
        user_id: UserId,
    ) -> Result<u32, CollaboratorError> {
        let code = normalize_code(code);
        let count = self
            .book
            .read()
            .await
            .redemptions
            .iter()
            .filter(|(c, u, _)| *c == code && *u == user_id)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn record_redemption(
        &self,
        code: &str,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<(), CollaboratorError> {
        let code = normalize_code(code);
        let mut book = self.book.write().await;
        let promotion = book
            .promotions
            .get_mut(&code)
            .ok_or_else(|| CollaboratorError::Rejected(format!("promotion {code} not found")))?;
        promotion.current_uses += 1;
        book.redemptions.push((code, user_id, order_id));
        Ok(())
    }
}
