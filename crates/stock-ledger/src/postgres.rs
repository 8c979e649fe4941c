use async_trait::async_trait;
use chrono::Utc;
use common::Coordinates;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AuditAction, AuditEntry, AuditQuery, ItemId, LedgerError, MutationContext, MutationOutcome,
    NewWarehouse, Result, StockKey, StockMutation, StockRecord, Warehouse, WarehouseId,
    WarehouseUpdate,
    store::{AuditStream, StockLedger},
};

const RECORD_COLUMNS: &str = "warehouse_id, item_id, quantity, reserved, version, alert_threshold, last_restock_at, updated_at";

const WAREHOUSE_COLUMNS: &str = "id, name, latitude, longitude, is_active, version, created_at";

const AUDIT_PAGE_SIZE: i64 = 500;

const AUDIT_PAGE_SQL: &str = r#"
    SELECT seq, id, warehouse_id, item_id, action, quantity_before, quantity_after,
           reserved_before, reserved_after, reference, reason, actor, recorded_at
    FROM stock_audit_log
    WHERE seq > $1
    ORDER BY seq ASC
    LIMIT $2
"#;

const AUDIT_COLUMNS: &str = "id, warehouse_id, item_id, action, quantity_before, quantity_after, reserved_before, reserved_after, reference, reason, actor, recorded_at";

/// PostgreSQL-backed stock ledger.
///
/// Hot-path mutations run `SELECT ... FOR UPDATE` on the record inside a
/// transaction; adjustments run a version-guarded `UPDATE` instead.
#[derive(Clone)]
pub struct PostgresStockLedger {
    pool: PgPool,
}

impl PostgresStockLedger {
    /// Creates a new PostgreSQL stock ledger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_record(row: &PgRow) -> Result<StockRecord> {
        Ok(StockRecord {
            warehouse_id: WarehouseId::from_uuid(row.try_get::<Uuid, _>("warehouse_id")?),
            item_id: ItemId::new(row.try_get::<String, _>("item_id")?),
            quantity: row.try_get("quantity")?,
            reserved: row.try_get("reserved")?,
            version: row.try_get("version")?,
            alert_threshold: row.try_get("alert_threshold")?,
            last_restock_at: row.try_get("last_restock_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_warehouse(row: &PgRow) -> Result<Warehouse> {
        let latitude: Option<f64> = row.try_get("latitude")?;
        let longitude: Option<f64> = row.try_get("longitude")?;
        let coordinates = match (latitude, longitude) {
            (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon).ok_or_else(|| {
                LedgerError::Corrupt(format!("warehouse coordinates out of range: {lat}, {lon}"))
            })?),
            _ => None,
        };

        Ok(Warehouse {
            id: WarehouseId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            coordinates,
            is_active: row.try_get("is_active")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_audit(row: &PgRow) -> Result<AuditEntry> {
        let action: String = row.try_get("action")?;
        Ok(AuditEntry {
            id: row.try_get("id")?,
            warehouse_id: WarehouseId::from_uuid(row.try_get::<Uuid, _>("warehouse_id")?),
            item_id: ItemId::new(row.try_get::<String, _>("item_id")?),
            action: action.parse::<AuditAction>().map_err(LedgerError::Corrupt)?,
            quantity_before: row.try_get("quantity_before")?,
            quantity_after: row.try_get("quantity_after")?,
            reserved_before: row.try_get("reserved_before")?,
            reserved_after: row.try_get("reserved_after")?,
            reference: row.try_get("reference")?,
            reason: row.try_get("reason")?,
            actor: row.try_get("actor")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }

    async fn lock_record(
        tx: &mut Transaction<'_, Postgres>,
        key: &StockKey,
    ) -> Result<Option<StockRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM stock_records WHERE warehouse_id = $1 AND item_id = $2 FOR UPDATE"
        ))
        .bind(key.warehouse_id.as_uuid())
        .bind(key.item_id.as_str())
        .fetch_optional(&mut **tx)
        .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    /// Inserts an empty record for a first restock and locks it.
    ///
    /// The warehouse row is share-locked so it cannot be deactivated while the
    /// new record is being filled.
    async fn create_and_lock_record(
        tx: &mut Transaction<'_, Postgres>,
        key: &StockKey,
    ) -> Result<StockRecord> {
        let exists: Option<bool> =
            sqlx::query_scalar("SELECT is_active FROM warehouses WHERE id = $1 FOR SHARE")
                .bind(key.warehouse_id.as_uuid())
                .fetch_optional(&mut **tx)
                .await?;
        if exists.is_none() {
            return Err(LedgerError::WarehouseNotFound(key.warehouse_id));
        }

        sqlx::query(
            r#"
            INSERT INTO stock_records (warehouse_id, item_id, quantity, reserved, version, alert_threshold, updated_at)
            VALUES ($1, $2, 0, 0, 0, $3, NOW())
            ON CONFLICT (warehouse_id, item_id) DO NOTHING
            "#,
        )
        .bind(key.warehouse_id.as_uuid())
        .bind(key.item_id.as_str())
        .bind(crate::DEFAULT_ALERT_THRESHOLD)
        .execute(&mut **tx)
        .await?;

        Self::lock_record(tx, key)
            .await?
            .ok_or_else(|| LedgerError::RecordNotFound(key.clone()))
    }

    async fn write_record(tx: &mut Transaction<'_, Postgres>, record: &StockRecord) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE stock_records
            SET quantity = $3, reserved = $4, version = $5, last_restock_at = $6, updated_at = $7
            WHERE warehouse_id = $1 AND item_id = $2
            "#,
        )
        .bind(record.warehouse_id.as_uuid())
        .bind(record.item_id.as_str())
        .bind(record.quantity)
        .bind(record.reserved)
        .bind(record.version)
        .bind(record.last_restock_at)
        .bind(record.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_audit(tx: &mut Transaction<'_, Postgres>, entry: &AuditEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_audit_log (id, warehouse_id, item_id, action, quantity_before, quantity_after,
                                         reserved_before, reserved_after, reference, reason, actor, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(entry.id)
        .bind(entry.warehouse_id.as_uuid())
        .bind(entry.item_id.as_str())
        .bind(entry.action.as_str())
        .bind(entry.quantity_before)
        .bind(entry.quantity_after)
        .bind(entry.reserved_before)
        .bind(entry.reserved_after)
        .bind(&entry.reference)
        .bind(&entry.reason)
        .bind(&entry.actor)
        .bind(entry.recorded_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Row-locked check-then-write for reserve, release, sale and restock.
    async fn apply_locked(
        &self,
        key: &StockKey,
        mutation: StockMutation,
        context: MutationContext,
    ) -> Result<MutationOutcome> {
        let mut tx = self.pool.begin().await?;

        let before = match Self::lock_record(&mut tx, key).await? {
            Some(record) => record,
            None if mutation.creates_record() => Self::create_and_lock_record(&mut tx, key).await?,
            None => return Err(LedgerError::RecordNotFound(key.clone())),
        };

        // An Err here drops the transaction, which rolls it back.
        let now = Utc::now();
        let after = before.apply(&mutation, now)?;
        let audit = AuditEntry::for_transition(&before, &after, mutation.action(), &context, now);

        Self::write_record(&mut tx, &after).await?;
        Self::insert_audit(&mut tx, &audit).await?;
        tx.commit().await?;

        Ok(MutationOutcome {
            before,
            after,
            audit,
        })
    }

    /// Compare-and-swap on `version` for manual adjustments.
    async fn apply_compare_and_swap(
        &self,
        key: &StockKey,
        mutation: StockMutation,
        context: MutationContext,
    ) -> Result<MutationOutcome> {
        let before = self
            .get_record(key)
            .await?
            .ok_or_else(|| LedgerError::RecordNotFound(key.clone()))?;

        let now = Utc::now();
        let after = before.apply(&mutation, now)?;

        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            r#"
            UPDATE stock_records
            SET quantity = $3, version = $4, updated_at = $5
            WHERE warehouse_id = $1 AND item_id = $2 AND version = $6 AND reserved <= $3
            "#,
        )
        .bind(key.warehouse_id.as_uuid())
        .bind(key.item_id.as_str())
        .bind(after.quantity)
        .bind(after.version)
        .bind(after.updated_at)
        .bind(before.version)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            drop(tx);
            let current = self
                .get_record(key)
                .await?
                .ok_or_else(|| LedgerError::RecordNotFound(key.clone()))?;
            // Re-running the rule against the winner's state yields the precise error.
            current.apply(&mutation, now)?;
            return Err(crate::StockError::OptimisticLockConflict {
                expected: before.version,
                actual: current.version,
            }
            .into());
        }

        let audit = AuditEntry::for_transition(&before, &after, mutation.action(), &context, now);
        Self::insert_audit(&mut tx, &audit).await?;
        tx.commit().await?;

        Ok(MutationOutcome {
            before,
            after,
            audit,
        })
    }

    async fn fetch_warehouse(&self, id: WarehouseId) -> Result<Warehouse> {
        self.get_warehouse(id)
            .await?
            .ok_or(LedgerError::WarehouseNotFound(id))
    }
}

#[async_trait]
impl StockLedger for PostgresStockLedger {
    #[tracing::instrument(skip(self, context), fields(key = %key))]
    async fn apply(
        &self,
        key: &StockKey,
        mutation: StockMutation,
        context: MutationContext,
    ) -> Result<MutationOutcome> {
        if mutation.is_version_checked() {
            self.apply_compare_and_swap(key, mutation, context).await
        } else {
            self.apply_locked(key, mutation, context).await
        }
    }

    async fn get_record(&self, key: &StockKey) -> Result<Option<StockRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM stock_records WHERE warehouse_id = $1 AND item_id = $2"
        ))
        .bind(key.warehouse_id.as_uuid())
        .bind(key.item_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn records_for_item(&self, item_id: &ItemId) -> Result<Vec<StockRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT s.warehouse_id, s.item_id, s.quantity, s.reserved, s.version,
                   s.alert_threshold, s.last_restock_at, s.updated_at
            FROM stock_records s
            JOIN warehouses w ON w.id = s.warehouse_id
            WHERE s.item_id = $1 AND w.is_active
            ORDER BY w.seq ASC
            "#,
        )
        .bind(item_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn low_stock_records(&self) -> Result<Vec<StockRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM stock_records WHERE quantity < alert_threshold ORDER BY warehouse_id, item_id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn create_warehouse(&self, warehouse: NewWarehouse) -> Result<Warehouse> {
        let warehouse = warehouse.into_warehouse(Utc::now());
        sqlx::query(
            r#"
            INSERT INTO warehouses (id, name, latitude, longitude, is_active, version, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(warehouse.id.as_uuid())
        .bind(&warehouse.name)
        .bind(warehouse.coordinates.map(|c| c.latitude))
        .bind(warehouse.coordinates.map(|c| c.longitude))
        .bind(warehouse.is_active)
        .bind(warehouse.version)
        .bind(warehouse.created_at)
        .execute(&self.pool)
        .await?;

        Ok(warehouse)
    }

    async fn get_warehouse(&self, id: WarehouseId) -> Result<Option<Warehouse>> {
        let row = sqlx::query(&format!(
            "SELECT {WAREHOUSE_COLUMNS} FROM warehouses WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_warehouse).transpose()
    }

    async fn list_warehouses(&self, active_only: bool) -> Result<Vec<Warehouse>> {
        let rows = sqlx::query(&format!(
            "SELECT {WAREHOUSE_COLUMNS} FROM warehouses WHERE is_active OR NOT $1 ORDER BY seq ASC"
        ))
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_warehouse).collect()
    }

    async fn update_warehouse(&self, update: WarehouseUpdate) -> Result<Warehouse> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE warehouses
            SET name = COALESCE($2, name),
                latitude = COALESCE($3, latitude),
                longitude = COALESCE($4, longitude),
                version = version + 1
            WHERE id = $1 AND version = $5
            RETURNING {WAREHOUSE_COLUMNS}
            "#
        ))
        .bind(update.id.as_uuid())
        .bind(&update.name)
        .bind(update.coordinates.map(|c| c.latitude))
        .bind(update.coordinates.map(|c| c.longitude))
        .bind(update.expected_version)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_warehouse(&row),
            None => {
                let current = self.fetch_warehouse(update.id).await?;
                Err(LedgerError::WarehouseVersionConflict {
                    warehouse_id: update.id,
                    expected: update.expected_version,
                    actual: current.version,
                })
            }
        }
    }

    async fn deactivate_warehouse(
        &self,
        id: WarehouseId,
        expected_version: i64,
    ) -> Result<Warehouse> {
        let mut tx = self.pool.begin().await?;

        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM warehouses WHERE id = $1 FOR UPDATE")
                .bind(id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        let version = version.ok_or(LedgerError::WarehouseNotFound(id))?;
        if version != expected_version {
            return Err(LedgerError::WarehouseVersionConflict {
                warehouse_id: id,
                expected: expected_version,
                actual: version,
            });
        }

        let units: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM stock_records WHERE warehouse_id = $1",
        )
        .bind(id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;
        if units > 0 {
            return Err(LedgerError::WarehouseHasStock {
                warehouse_id: id,
                units,
            });
        }

        let row = sqlx::query(&format!(
            "UPDATE warehouses SET is_active = FALSE, version = version + 1 WHERE id = $1 RETURNING {WAREHOUSE_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;
        let warehouse = Self::row_to_warehouse(&row)?;

        tx.commit().await?;
        Ok(warehouse)
    }

    async fn query_audit(&self, query: AuditQuery) -> Result<Vec<AuditEntry>> {
        let mut sql = format!("SELECT {AUDIT_COLUMNS} FROM stock_audit_log WHERE 1=1");
        let mut param_count = 0;

        if query.warehouse_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND warehouse_id = ${param_count}"));
        }
        if query.item_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND item_id = ${param_count}"));
        }
        if query.reference.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND reference = ${param_count}"));
        }
        if query.actions.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND action = ANY(${param_count})"));
        }
        if query.from_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND recorded_at >= ${param_count}"));
        }
        if query.to_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND recorded_at <= ${param_count}"));
        }

        sql.push_str(" ORDER BY seq ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(id) = query.warehouse_id {
            sqlx_query = sqlx_query.bind(id.as_uuid());
        }
        if let Some(item_id) = query.item_id {
            sqlx_query = sqlx_query.bind(item_id.as_str().to_string());
        }
        if let Some(reference) = query.reference {
            sqlx_query = sqlx_query.bind(reference);
        }
        if let Some(actions) = query.actions {
            let actions: Vec<String> = actions.iter().map(|a| a.as_str().to_string()).collect();
            sqlx_query = sqlx_query.bind(actions);
        }
        if let Some(from_ts) = query.from_timestamp {
            sqlx_query = sqlx_query.bind(from_ts);
        }
        if let Some(to_ts) = query.to_timestamp {
            sqlx_query = sqlx_query.bind(to_ts);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_audit).collect()
    }

    async fn stream_audit(&self) -> Result<AuditStream> {
        use futures_util::{StreamExt, TryStreamExt, stream};

        // Keyset-paged on `seq` so the stream owns its pool handle.
        let pages = stream::try_unfold(
            (self.pool.clone(), Some(0_i64)),
            |(pool, cursor)| async move {
                let Some(after) = cursor else {
                    return Ok::<_, LedgerError>(None);
                };
                let rows = sqlx::query(AUDIT_PAGE_SQL)
                    .bind(after)
                    .bind(AUDIT_PAGE_SIZE)
                    .fetch_all(&pool)
                    .await?;

                let next = if (rows.len() as i64) < AUDIT_PAGE_SIZE {
                    None
                } else {
                    rows.last()
                        .map(|row| row.try_get::<i64, _>("seq"))
                        .transpose()?
                };
                let entries = rows
                    .iter()
                    .map(Self::row_to_audit)
                    .collect::<Result<Vec<_>>>()?;

                Ok(Some((entries, (pool, next))))
            },
        );

        let stream = pages
            .map_ok(|entries| stream::iter(entries.into_iter().map(Ok::<_, LedgerError>)))
            .try_flatten();

        Ok(stream.boxed())
    }
}
