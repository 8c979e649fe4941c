use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::ItemId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::CollaboratorError;

/// What the catalog currently says about an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDetail {
    pub item_id: ItemId,
    pub title: String,

    /// `None` when the item has no price and cannot be sold.
    pub current_price: Option<Decimal>,
    pub is_active: bool,
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_item_detail(&self, item_id: &ItemId)
    -> Result<Option<ItemDetail>, CollaboratorError>;
}

/// In-memory catalog for testing.
#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    items: Arc<RwLock<HashMap<ItemId, ItemDetail>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, detail: ItemDetail) {
        self.items.write().await.insert(detail.item_id.clone(), detail);
    }

    /// Changes the current price of a listed item.
    pub async fn set_price(&self, item_id: &ItemId, price: Decimal) {
        if let Some(detail) = self.items.write().await.get_mut(item_id) {
            detail.current_price = Some(price);
        }
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn get_item_detail(
        &self,
        item_id: &ItemId,
    ) -> Result<Option<ItemDetail>, CollaboratorError> {
        Ok(self.items.read().await.get(item_id).cloned())
    }
}
