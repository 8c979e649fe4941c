//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container and truncate between tests.
//! Run with:
//!
//! ```bash
//! cargo test -p stock-ledger --test postgres_integration
//! ```

use std::sync::Arc;

use common::Coordinates;
use futures_util::TryStreamExt;
use serial_test::serial;
use sqlx::PgPool;
use stock_ledger::{
    AuditAction, AuditQuery, LedgerError, MutationContext, NewWarehouse, PostgresStockLedger,
    StockError, StockKey, StockLedger, StockMutation, WarehouseId, WarehouseUpdate,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_stock_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_ledger() -> PostgresStockLedger {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE stock_audit_log, stock_records, warehouses")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStockLedger::new(pool)
}

async fn stocked(ledger: &PostgresStockLedger, quantity: u32) -> StockKey {
    let warehouse = ledger
        .create_warehouse(NewWarehouse::new(
            "Hanoi",
            Coordinates::new(21.0285, 105.8542),
        ))
        .await
        .unwrap();
    let key = StockKey::new(warehouse.id, "SKU-001");
    ledger
        .apply(
            &key,
            StockMutation::Restock { quantity },
            MutationContext::new().reason("initial"),
        )
        .await
        .unwrap();
    key
}

#[tokio::test]
#[serial]
async fn first_restock_creates_record() {
    let ledger = get_test_ledger().await;
    let key = stocked(&ledger, 40).await;

    let record = ledger.get_record(&key).await.unwrap().unwrap();
    assert_eq!(record.quantity, 40);
    assert_eq!(record.reserved, 0);
    assert_eq!(record.version, 1);
    assert!(record.last_restock_at.is_some());
}

#[tokio::test]
#[serial]
async fn restock_into_unknown_warehouse_fails() {
    let ledger = get_test_ledger().await;
    let key = StockKey::new(WarehouseId::new(), "SKU-001");

    let result = ledger
        .apply(&key, StockMutation::Restock { quantity: 5 }, MutationContext::new())
        .await;
    assert!(matches!(result, Err(LedgerError::WarehouseNotFound(_))));
}

#[tokio::test]
#[serial]
async fn reserve_release_and_sale_are_audited() {
    let ledger = get_test_ledger().await;
    let key = stocked(&ledger, 20).await;
    let context = MutationContext::new().reference("order:abc");

    ledger
        .apply(&key, StockMutation::Reserve { quantity: 6 }, context.clone())
        .await
        .unwrap();
    ledger
        .apply(&key, StockMutation::Release { quantity: 2 }, context.clone())
        .await
        .unwrap();
    let outcome = ledger
        .apply(&key, StockMutation::CompleteSale { quantity: 4 }, context)
        .await
        .unwrap();

    assert_eq!(outcome.after.quantity, 16);
    assert_eq!(outcome.after.reserved, 0);
    assert_eq!(outcome.after.version, 4);

    let entries = ledger
        .query_audit(AuditQuery::for_reference("order:abc"))
        .await
        .unwrap();
    let actions: Vec<_> = entries.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![AuditAction::Reserve, AuditAction::Release, AuditAction::Sale]
    );
    assert_eq!(entries[0].reserved_delta(), 6);
}

#[tokio::test]
#[serial]
async fn rejected_reservation_leaves_no_trace() {
    let ledger = get_test_ledger().await;
    let key = stocked(&ledger, 3).await;

    let result = ledger
        .apply(&key, StockMutation::Reserve { quantity: 4 }, MutationContext::new())
        .await;
    assert!(matches!(
        result,
        Err(LedgerError::Stock(StockError::InsufficientStock {
            requested: 4,
            available: 3
        }))
    ));

    let record = ledger.get_record(&key).await.unwrap().unwrap();
    assert_eq!(record.reserved, 0);
    assert_eq!(record.version, 1);

    let entries = ledger
        .query_audit(AuditQuery::new().action(AuditAction::Reserve))
        .await
        .unwrap();
    assert!(entries.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn parallel_reservations_never_oversell() {
    let ledger = get_test_ledger().await;
    let key = stocked(&ledger, 100).await;

    let mut handles = Vec::new();
    for i in 0..10 {
        let ledger = ledger.clone();
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .apply(
                    &key,
                    StockMutation::Reserve { quantity: 11 },
                    MutationContext::new().reference(format!("order:{i}")),
                )
                .await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 9);
    let record = ledger.get_record(&key).await.unwrap().unwrap();
    assert_eq!(record.reserved, 99);
    assert_eq!(record.version, 10);
}

#[tokio::test]
#[serial]
async fn adjust_is_compare_and_swap() {
    let ledger = get_test_ledger().await;
    let key = stocked(&ledger, 10).await;
    ledger
        .apply(&key, StockMutation::Reserve { quantity: 4 }, MutationContext::new())
        .await
        .unwrap();

    let stale = ledger
        .apply(
            &key,
            StockMutation::Adjust {
                new_quantity: 30,
                expected_version: 1,
            },
            MutationContext::new(),
        )
        .await;
    assert!(matches!(
        stale,
        Err(LedgerError::Stock(StockError::OptimisticLockConflict {
            expected: 1,
            actual: 2
        }))
    ));

    let below = ledger
        .apply(
            &key,
            StockMutation::Adjust {
                new_quantity: 3,
                expected_version: 2,
            },
            MutationContext::new(),
        )
        .await;
    assert!(matches!(
        below,
        Err(LedgerError::Stock(StockError::BelowReserved { .. }))
    ));

    let outcome = ledger
        .apply(
            &key,
            StockMutation::Adjust {
                new_quantity: 30,
                expected_version: 2,
            },
            MutationContext::new().actor("stock-take"),
        )
        .await
        .unwrap();
    assert_eq!(outcome.after.quantity, 30);
    assert_eq!(outcome.after.reserved, 4);
    assert_eq!(outcome.after.version, 3);
    assert_eq!(outcome.audit.action, AuditAction::Adjustment);
}

#[tokio::test]
#[serial]
async fn warehouses_list_in_creation_order_and_deactivate() {
    let ledger = get_test_ledger().await;
    let first = ledger
        .create_warehouse(NewWarehouse::new("First", None))
        .await
        .unwrap();
    let second = ledger
        .create_warehouse(NewWarehouse::new("Second", Coordinates::new(10.0, 106.0)))
        .await
        .unwrap();

    let listed = ledger.list_warehouses(true).await.unwrap();
    assert_eq!(
        listed.iter().map(|w| w.id).collect::<Vec<_>>(),
        vec![first.id, second.id]
    );
    assert_eq!(listed[1].coordinates, Coordinates::new(10.0, 106.0));

    let renamed = ledger
        .update_warehouse(WarehouseUpdate::new(first.id, 1).name("First North"))
        .await
        .unwrap();
    assert_eq!(renamed.name, "First North");
    assert_eq!(renamed.version, 2);

    let conflict = ledger
        .update_warehouse(WarehouseUpdate::new(first.id, 1).name("Again"))
        .await;
    assert!(matches!(
        conflict,
        Err(LedgerError::WarehouseVersionConflict { actual: 2, .. })
    ));

    let key = StockKey::new(second.id, "SKU-001");
    ledger
        .apply(&key, StockMutation::Restock { quantity: 1 }, MutationContext::new())
        .await
        .unwrap();
    let stocked = ledger.deactivate_warehouse(second.id, 1).await;
    assert!(matches!(
        stocked,
        Err(LedgerError::WarehouseHasStock { units: 1, .. })
    ));

    let deactivated = ledger.deactivate_warehouse(first.id, 2).await.unwrap();
    assert!(!deactivated.is_active);
    assert_eq!(ledger.list_warehouses(true).await.unwrap().len(), 1);
    assert_eq!(ledger.list_warehouses(false).await.unwrap().len(), 2);

    let records = ledger
        .records_for_item(&"SKU-001".into())
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].warehouse_id, second.id);
}

#[tokio::test]
#[serial]
async fn low_stock_and_audit_stream() {
    let ledger = get_test_ledger().await;
    let key = stocked(&ledger, 4).await;
    ledger
        .apply(&key, StockMutation::Reserve { quantity: 1 }, MutationContext::new())
        .await
        .unwrap();

    let low = ledger.low_stock_records().await.unwrap();
    assert_eq!(low.len(), 1);
    assert_eq!(low[0].key(), key);

    let entries: Vec<_> = ledger
        .stream_audit()
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].action, AuditAction::Restock);
    assert_eq!(entries[1].action, AuditAction::Reserve);
}
