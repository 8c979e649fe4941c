use common::ItemId;
use stock_ledger::{LedgerError, StockError};
use thiserror::Error;

/// Errors returned by the reservation engine, selector and aggregator.
///
/// Rule violations from the ledger map one-to-one onto these variants so
/// callers match on the kind instead of on messages.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The stock record or warehouse does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Not enough unreserved stock.
    #[error("Insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    /// Releasing more than is currently reserved.
    #[error("Invalid release quantity: requested {requested}, reserved {reserved}")]
    InvalidReleaseQuantity { requested: i64, reserved: i64 },

    /// Selling more than is currently reserved.
    #[error("Insufficient reserved stock: requested {requested}, reserved {reserved}")]
    InsufficientReserved { requested: i64, reserved: i64 },

    /// The record or warehouse was modified since the caller read it.
    #[error("Optimistic lock conflict: expected version {expected}, found {actual}")]
    OptimisticLockConflict { expected: i64, actual: i64 },

    /// Malformed or out-of-range input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No single active warehouse can cover the requested quantity.
    #[error("No warehouse can fulfill {requested} x {item_id}")]
    NoWarehouseFulfillable { item_id: ItemId, requested: u32 },

    /// Infrastructure failure in the ledger backend.
    #[error("Storage error: {0}")]
    Storage(#[source] LedgerError),
}

impl InventoryError {
    /// Short machine-readable code for API responses and checkout issues.
    pub fn code(&self) -> &'static str {
        match self {
            InventoryError::NotFound(_) => "NOT_FOUND",
            InventoryError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            InventoryError::InvalidReleaseQuantity { .. } => "INVALID_RELEASE_QUANTITY",
            InventoryError::InsufficientReserved { .. } => "INSUFFICIENT_RESERVED",
            InventoryError::OptimisticLockConflict { .. } => "OPTIMISTIC_LOCK_CONFLICT",
            InventoryError::Validation(_) => "VALIDATION_ERROR",
            InventoryError::NoWarehouseFulfillable { .. } => "NO_WAREHOUSE_FULFILLABLE",
            InventoryError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<StockError> for InventoryError {
    fn from(e: StockError) -> Self {
        match e {
            StockError::InsufficientStock {
                requested,
                available,
            } => InventoryError::InsufficientStock {
                requested,
                available,
            },
            StockError::InvalidReleaseQuantity {
                requested,
                reserved,
            } => InventoryError::InvalidReleaseQuantity {
                requested,
                reserved,
            },
            StockError::InsufficientReserved {
                requested,
                reserved,
            } => InventoryError::InsufficientReserved {
                requested,
                reserved,
            },
            StockError::OptimisticLockConflict { expected, actual } => {
                InventoryError::OptimisticLockConflict { expected, actual }
            }
            StockError::BelowReserved { .. } | StockError::InvalidQuantity { .. } => {
                InventoryError::Validation(e.to_string())
            }
            StockError::InvariantViolation { .. } => {
                InventoryError::Storage(LedgerError::Stock(e))
            }
        }
    }
}

impl From<LedgerError> for InventoryError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Stock(stock) => stock.into(),
            LedgerError::RecordNotFound(key) => {
                InventoryError::NotFound(format!("stock record {key}"))
            }
            LedgerError::WarehouseNotFound(id) => {
                InventoryError::NotFound(format!("warehouse {id}"))
            }
            LedgerError::WarehouseVersionConflict {
                expected, actual, ..
            } => InventoryError::OptimisticLockConflict { expected, actual },
            LedgerError::WarehouseHasStock { .. } => InventoryError::Validation(e.to_string()),
            other => InventoryError::Storage(other),
        }
    }
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
