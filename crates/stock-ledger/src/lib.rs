//! Stock ledger: the source of truth for per-(warehouse, item) availability.
//!
//! Every mutation goes through [`StockLedger::apply`], which locks the target
//! record, validates the change against [`StockRecord::apply`], writes the new
//! state and appends an [`AuditEntry`] in one transaction.

pub mod audit;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;
pub mod warehouse;

pub use audit::{AuditAction, AuditEntry, AuditQuery};
pub use common::{ItemId, WarehouseId};
pub use error::{LedgerError, Result, StockError};
pub use memory::InMemoryStockLedger;
pub use postgres::PostgresStockLedger;
pub use record::{
    DEFAULT_ALERT_THRESHOLD, MutationContext, MutationOutcome, StockKey, StockMutation, StockRecord,
};
pub use store::{AuditStream, StockLedger};
pub use warehouse::{NewWarehouse, Warehouse, WarehouseUpdate};
