use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartId, ItemId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::CollaboratorError;

/// One line in a cart, priced when it was added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub item_id: ItemId,
    pub quantity: u32,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,

    /// `None` for guest carts.
    pub user_id: Option<UserId>,
    pub items: Vec<CartLine>,
    pub promo_code: Option<String>,

    /// When the promotion sweep last looked at this cart's promo code.
    pub promo_checked_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub checked_out: bool,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(user_id: Option<UserId>, items: Vec<CartLine>) -> Self {
        Self {
            id: CartId::new(),
            user_id,
            items,
            promo_code: None,
            promo_checked_at: None,
            expires_at: None,
            checked_out: false,
            updated_at: Utc::now(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn get_cart(&self, cart_id: CartId) -> Result<Option<Cart>, CollaboratorError>;

    /// Sets or clears the cart's promo code.
    async fn set_promo_code(
        &self,
        cart_id: CartId,
        code: Option<String>,
    ) -> Result<(), CollaboratorError>;

    /// Records that the promotion sweep checked this cart.
    async fn touch_promo_checked(
        &self,
        cart_id: CartId,
        at: DateTime<Utc>,
    ) -> Result<(), CollaboratorError>;

    async fn mark_checked_out(&self, cart_id: CartId) -> Result<(), CollaboratorError>;

    /// Open carts holding a promo code, ordered by id, starting after `after`.
    async fn carts_with_promo(
        &self,
        after: Option<CartId>,
        limit: usize,
    ) -> Result<Vec<Cart>, CollaboratorError>;
}

/// In-memory cart store for testing.
#[derive(Clone, Default)]
pub struct InMemoryCartStore {
    carts: Arc<RwLock<BTreeMap<CartId, Cart>>>,
}

impl InMemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, cart: Cart) {
        self.carts.write().await.insert(cart.id, cart);
    }

    async fn update<F>(&self, cart_id: CartId, f: F) -> Result<(), CollaboratorError>
    where
        F: FnOnce(&mut Cart) + Send,
    {
        let mut carts = self.carts.write().await;
        let cart = carts
            .get_mut(&cart_id)
            .ok_or_else(|| CollaboratorError::Rejected(format!("cart {cart_id} not found")))?;
        f(cart);
        Ok(())
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn get_cart(&self, cart_id: CartId) -> Result<Option<Cart>, CollaboratorError> {
        Ok(self.carts.read().await.get(&cart_id).cloned())
    }

    async fn set_promo_code(
        &self,
        cart_id: CartId,
        code: Option<String>,
    ) -> Result<(), CollaboratorError> {
        self.update(cart_id, |cart| {
            cart.promo_code = code;
            cart.promo_checked_at = None;
            cart.updated_at = Utc::now();
        })
        .await
    }

    async fn touch_promo_checked(
        &self,
        cart_id: CartId,
        at: DateTime<Utc>,
    ) -> Result<(), CollaboratorError> {
        self.update(cart_id, |cart| cart.promo_checked_at = Some(at))
            .await
    }

    async fn mark_checked_out(&self, cart_id: CartId) -> Result<(), CollaboratorError> {
        self.update(cart_id, |cart| {
            cart.checked_out = true;
            cart.updated_at = Utc::now();
        })
        .await
    }

    async fn carts_with_promo(
        &self,
        after: Option<CartId>,
        limit: usize,
    ) -> Result<Vec<Cart>, CollaboratorError> {
        let carts = self.carts.read().await;
        Ok(carts
            .values()
            .filter(|c| after.is_none_or(|a| c.id > a))
            .filter(|c| c.promo_code.is_some() && !c.checked_out)
            .take(limit)
            .cloned()
            .collect())
    }
}
