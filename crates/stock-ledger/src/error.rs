use thiserror::Error;

use crate::{StockKey, WarehouseId};

/// A stock rule was violated by the requested mutation.
///
/// Raised by [`crate::StockRecord::apply`] before anything is written, so the
/// stored record is always left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockError {
    /// Not enough unreserved stock to hold the requested quantity.
    #[error("Insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    /// Attempted to release more than is currently reserved.
    #[error("Invalid release quantity: requested {requested}, reserved {reserved}")]
    InvalidReleaseQuantity { requested: i64, reserved: i64 },

    /// Attempted to sell more than is currently reserved.
    #[error("Insufficient reserved stock: requested {requested}, reserved {reserved}")]
    InsufficientReserved { requested: i64, reserved: i64 },

    /// The caller's version does not match the stored version.
    #[error("Optimistic lock conflict: expected version {expected}, found {actual}")]
    OptimisticLockConflict { expected: i64, actual: i64 },

    /// A manual adjustment would drop quantity below what is already held.
    #[error("New quantity {new_quantity} is below reserved quantity {reserved}")]
    BelowReserved { new_quantity: i64, reserved: i64 },

    /// Quantity must be greater than zero.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: i64 },

    /// `0 <= reserved <= quantity` would no longer hold.
    #[error("Stock invariant violated: quantity {quantity}, reserved {reserved}")]
    InvariantViolation { quantity: i64, reserved: i64 },
}

/// Errors that can occur when interacting with the stock ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The mutation was rejected by a stock rule.
    #[error(transparent)]
    Stock(#[from] StockError),

    /// No stock record exists for the key.
    #[error("Stock record not found: {0}")]
    RecordNotFound(StockKey),

    /// The warehouse does not exist.
    #[error("Warehouse not found: {0}")]
    WarehouseNotFound(WarehouseId),

    /// The warehouse still holds stock and cannot be deactivated.
    #[error("Warehouse {warehouse_id} still holds {units} units of stock")]
    WarehouseHasStock { warehouse_id: WarehouseId, units: i64 },

    /// A concurrent edit changed the warehouse first.
    #[error("Warehouse {warehouse_id} was modified: expected version {expected}, found {actual}")]
    WarehouseVersionConflict {
        warehouse_id: WarehouseId,
        expected: i64,
        actual: i64,
    },

    /// A stored value could not be decoded.
    #[error("Corrupt ledger data: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
