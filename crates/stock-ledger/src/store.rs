use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{
    AuditEntry, AuditQuery, ItemId, MutationContext, MutationOutcome, NewWarehouse, Result,
    StockKey, StockMutation, StockRecord, Warehouse, WarehouseId, WarehouseUpdate,
};

/// A stream of audit entries.
pub type AuditStream = Pin<Box<dyn Stream<Item = Result<AuditEntry>> + Send>>;

/// Core trait for stock ledger implementations.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Applies a mutation to one stock record atomically.
    ///
    /// Reserve, release, sale and restock hold an exclusive lock on the record
    /// for the whole check-then-write, so concurrent callers against the same
    /// key are serialized and each observes the previous commit. Adjust uses a
    /// compare-and-swap on `version` instead of a lock.
    ///
    /// The new state and its audit entry are committed together. A rejected
    /// mutation leaves both the record and the audit log untouched.
    async fn apply(
        &self,
        key: &StockKey,
        mutation: StockMutation,
        context: MutationContext,
    ) -> Result<MutationOutcome>;

    /// Reads one stock record without locking.
    async fn get_record(&self, key: &StockKey) -> Result<Option<StockRecord>>;

    /// Reads every record for an item in active warehouses.
    ///
    /// Records are returned in warehouse creation order, which callers rely on
    /// for deterministic tie-breaking.
    async fn records_for_item(&self, item_id: &ItemId) -> Result<Vec<StockRecord>>;

    /// Reads every record whose quantity is below its alert threshold.
    async fn low_stock_records(&self) -> Result<Vec<StockRecord>>;

    /// Registers a new, active warehouse.
    async fn create_warehouse(&self, warehouse: NewWarehouse) -> Result<Warehouse>;

    async fn get_warehouse(&self, id: WarehouseId) -> Result<Option<Warehouse>>;

    /// Lists warehouses in creation order.
    async fn list_warehouses(&self, active_only: bool) -> Result<Vec<Warehouse>>;

    /// Edits a warehouse if its version still matches.
    async fn update_warehouse(&self, update: WarehouseUpdate) -> Result<Warehouse>;

    /// Soft-deletes a warehouse.
    ///
    /// Fails with `WarehouseHasStock` while any of its records has quantity > 0.
    async fn deactivate_warehouse(&self, id: WarehouseId, expected_version: i64)
    -> Result<Warehouse>;

    /// Reads audit entries matching `query`, oldest first.
    async fn query_audit(&self, query: AuditQuery) -> Result<Vec<AuditEntry>>;

    /// Streams the whole audit log in insertion order.
    async fn stream_audit(&self) -> Result<AuditStream>;
}
