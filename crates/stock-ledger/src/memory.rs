use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use crate::{
    AuditEntry, AuditQuery, ItemId, LedgerError, MutationContext, MutationOutcome, NewWarehouse,
    Result, StockKey, StockMutation, StockRecord, Warehouse, WarehouseId, WarehouseUpdate,
    store::{AuditStream, StockLedger},
};

type Row = Arc<Mutex<StockRecord>>;

/// In-memory stock ledger for testing and local development.
///
/// Each record sits behind its own mutex, which plays the part of the
/// database row lock: two mutations of the same key are serialized while
/// different keys proceed in parallel.
#[derive(Clone, Default)]
pub struct InMemoryStockLedger {
    records: Arc<RwLock<HashMap<StockKey, Row>>>,
    audit: Arc<RwLock<Vec<AuditEntry>>>,
    warehouses: Arc<RwLock<Vec<Warehouse>>>,
}

impl InMemoryStockLedger {
    /// Creates a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of audit entries written so far.
    pub async fn audit_count(&self) -> usize {
        self.audit.read().await.len()
    }

    async fn existing_row(&self, key: &StockKey) -> Option<Row> {
        self.records.read().await.get(key).cloned()
    }

    async fn ensure_warehouse(&self, id: WarehouseId) -> Result<()> {
        let warehouses = self.warehouses.read().await;
        if warehouses.iter().any(|w| w.id == id) {
            Ok(())
        } else {
            Err(LedgerError::WarehouseNotFound(id))
        }
    }

    /// First restock of a key: builds the record from empty and inserts it.
    async fn create_row(
        &self,
        key: &StockKey,
        mutation: StockMutation,
        context: MutationContext,
    ) -> Result<MutationOutcome> {
        self.ensure_warehouse(key.warehouse_id).await?;

        let mut records = self.records.write().await;
        if records.contains_key(key) {
            drop(records);
            return self.apply(key, mutation, context).await;
        }

        let now = Utc::now();
        let before = StockRecord::empty(key.clone(), now);
        let after = before.apply(&mutation, now)?;
        let audit = AuditEntry::for_transition(&before, &after, mutation.action(), &context, now);

        records.insert(key.clone(), Arc::new(Mutex::new(after.clone())));
        self.audit.write().await.push(audit.clone());

        Ok(MutationOutcome {
            before,
            after,
            audit,
        })
    }
}

#[async_trait]
impl StockLedger for InMemoryStockLedger {
    async fn apply(
        &self,
        key: &StockKey,
        mutation: StockMutation,
        context: MutationContext,
    ) -> Result<MutationOutcome> {
        let Some(row) = self.existing_row(key).await else {
            if mutation.creates_record() {
                return self.create_row(key, mutation, context).await;
            }
            return Err(LedgerError::RecordNotFound(key.clone()));
        };

        let mut record = row.lock().await;
        let now = Utc::now();
        let after = record.apply(&mutation, now)?;
        let audit = AuditEntry::for_transition(&record, &after, mutation.action(), &context, now);
        let before = std::mem::replace(&mut *record, after.clone());

        // Appended while the row is still held so the log order matches commit order.
        self.audit.write().await.push(audit.clone());

        Ok(MutationOutcome {
            before,
            after,
            audit,
        })
    }

    async fn get_record(&self, key: &StockKey) -> Result<Option<StockRecord>> {
        match self.existing_row(key).await {
            Some(row) => Ok(Some(row.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn records_for_item(&self, item_id: &ItemId) -> Result<Vec<StockRecord>> {
        let warehouses = self.warehouses.read().await.clone();
        let records = self.records.read().await;

        let mut result = Vec::new();
        for warehouse in warehouses.iter().filter(|w| w.is_active) {
            let key = StockKey::new(warehouse.id, item_id.clone());
            if let Some(row) = records.get(&key) {
                result.push(row.lock().await.clone());
            }
        }
        Ok(result)
    }

    async fn low_stock_records(&self) -> Result<Vec<StockRecord>> {
        let records = self.records.read().await;
        let mut result = Vec::new();
        for row in records.values() {
            let record = row.lock().await;
            if record.is_low_stock() {
                result.push(record.clone());
            }
        }
        result.sort_by(|a, b| {
            a.warehouse_id
                .cmp(&b.warehouse_id)
                .then_with(|| a.item_id.cmp(&b.item_id))
        });
        Ok(result)
    }

    async fn create_warehouse(&self, warehouse: NewWarehouse) -> Result<Warehouse> {
        let warehouse = warehouse.into_warehouse(Utc::now());
        self.warehouses.write().await.push(warehouse.clone());
        Ok(warehouse)
    }

    async fn get_warehouse(&self, id: WarehouseId) -> Result<Option<Warehouse>> {
        let warehouses = self.warehouses.read().await;
        Ok(warehouses.iter().find(|w| w.id == id).cloned())
    }

    async fn list_warehouses(&self, active_only: bool) -> Result<Vec<Warehouse>> {
        let warehouses = self.warehouses.read().await;
        Ok(warehouses
            .iter()
            .filter(|w| !active_only || w.is_active)
            .cloned()
            .collect())
    }

    async fn update_warehouse(&self, update: WarehouseUpdate) -> Result<Warehouse> {
        let mut warehouses = self.warehouses.write().await;
        let warehouse = warehouses
            .iter_mut()
            .find(|w| w.id == update.id)
            .ok_or(LedgerError::WarehouseNotFound(update.id))?;

        if warehouse.version != update.expected_version {
            return Err(LedgerError::WarehouseVersionConflict {
                warehouse_id: update.id,
                expected: update.expected_version,
                actual: warehouse.version,
            });
        }

        *warehouse = update.apply_to(warehouse);
        Ok(warehouse.clone())
    }

    async fn deactivate_warehouse(
        &self,
        id: WarehouseId,
        expected_version: i64,
    ) -> Result<Warehouse> {
        let records = self.records.read().await;
        let mut warehouses = self.warehouses.write().await;
        let warehouse = warehouses
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or(LedgerError::WarehouseNotFound(id))?;

        if warehouse.version != expected_version {
            return Err(LedgerError::WarehouseVersionConflict {
                warehouse_id: id,
                expected: expected_version,
                actual: warehouse.version,
            });
        }

        let mut units = 0;
        for (key, row) in records.iter() {
            if key.warehouse_id == id {
                units += row.lock().await.quantity;
            }
        }
        if units > 0 {
            return Err(LedgerError::WarehouseHasStock {
                warehouse_id: id,
                units,
            });
        }

        warehouse.is_active = false;
        warehouse.version += 1;
        Ok(warehouse.clone())
    }

    async fn query_audit(&self, query: AuditQuery) -> Result<Vec<AuditEntry>> {
        let audit = self.audit.read().await;
        let matching = audit.iter().filter(|e| query.matches(e)).cloned();
        Ok(match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn stream_audit(&self) -> Result<AuditStream> {
        use futures_util::stream;

        let entries = self.audit.read().await.clone();
        Ok(Box::pin(stream::iter(entries.into_iter().map(Ok))))
    }
}
