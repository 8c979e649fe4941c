use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{AddressId, Coordinates, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::CollaboratorError;

/// A saved shipping address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub user_id: UserId,
    pub recipient: String,
    pub street: String,
    pub city: String,

    /// Not every address has been geocoded.
    pub coordinates: Option<Coordinates>,
}

#[async_trait]
pub trait AddressBook: Send + Sync {
    /// Returns the address only if it belongs to `user_id`.
    async fn get_address(
        &self,
        user_id: UserId,
        address_id: AddressId,
    ) -> Result<Option<Address>, CollaboratorError>;
}

/// In-memory address book for testing.
#[derive(Clone, Default)]
pub struct InMemoryAddressBook {
    addresses: Arc<RwLock<HashMap<AddressId, Address>>>,
}

impl InMemoryAddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, address: Address) {
        self.addresses.write().await.insert(address.id, address);
    }
}

#[async_trait]
impl AddressBook for InMemoryAddressBook {
    async fn get_address(
        &self,
        user_id: UserId,
        address_id: AddressId,
    ) -> Result<Option<Address>, CollaboratorError> {
        Ok(self
            .addresses
            .read()
            .await
            .get(&address_id)
            .filter(|a| a.user_id == user_id)
            .cloned())
    }
}
