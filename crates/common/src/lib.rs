//! Shared identifiers and value types used across the workspace.

mod geo;
mod types;

pub use geo::Coordinates;
pub use types::{
    AddressId, CartId, ItemId, OrderId, ParseReferenceError, ReservationRef, UserId, WarehouseId,
};
