//! Contracts for the systems checkout consumes but does not own.
//!
//! Each contract is a narrow async trait with an in-memory implementation
//! for tests and local runs.

pub mod address;
pub mod cart;
pub mod catalog;
pub mod notification;
pub mod order;
pub mod promotion;

use std::sync::Arc;

use thiserror::Error;

pub use address::{Address, AddressBook, InMemoryAddressBook};
pub use cart::{Cart, CartLine, CartStore, InMemoryCartStore};
pub use catalog::{Catalog, InMemoryCatalog, ItemDetail};
pub use notification::{InMemoryNotifier, Notifier, SentNotification};
pub use order::{
    InMemoryOrderService, NewOrder, Order, OrderConfirmation, OrderLine, OrderService,
    OrderStatus, PaymentMethod, PaymentStatus,
};
pub use promotion::{DiscountKind, InMemoryPromotionStore, Promotion, PromotionStore};

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// The collaborator refused the request.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The collaborator could not be reached or failed internally.
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

/// Every collaborator the checkout and the sweeper talk to.
#[derive(Clone)]
pub struct Collaborators {
    pub carts: Arc<dyn CartStore>,
    pub catalog: Arc<dyn Catalog>,
    pub addresses: Arc<dyn AddressBook>,
    pub orders: Arc<dyn OrderService>,
    pub promotions: Arc<dyn PromotionStore>,
    pub notifier: Arc<dyn Notifier>,
}
