//! Concurrency and invariant properties of the reservation engine.

use std::sync::Arc;

use common::{CartId, ItemId, OrderId, ReservationRef, WarehouseId};
use inventory::{
    AdjustStock, CompleteSale, InventoryError, ReleaseStock, ReservationAnalytics,
    ReservationEngine, ReserveStock, Restock,
};
use stock_ledger::{InMemoryStockLedger, NewWarehouse};

async fn engine_with(quantity: u32) -> (ReservationEngine<InMemoryStockLedger>, WarehouseId) {
    let engine = ReservationEngine::new(Arc::new(InMemoryStockLedger::new()));
    let warehouse = engine
        .create_warehouse(NewWarehouse::new("Main", None))
        .await
        .unwrap();
    engine
        .restock(Restock {
            warehouse_id: warehouse.id,
            item_id: "SKU-001".into(),
            quantity,
            reason: None,
        })
        .await
        .unwrap();
    (engine, warehouse.id)
}

fn item() -> ItemId {
    "SKU-001".into()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn parallel_reservations_never_oversell() {
    const QUANTITY: u32 = 120;
    const N: u32 = 12;
    let (engine, warehouse_id) = engine_with(QUANTITY).await;

    let handles: Vec<_> = (0..N)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .reserve(ReserveStock {
                        warehouse_id,
                        item_id: item(),
                        quantity: QUANTITY / N + 1,
                        reference: ReservationRef::Order(OrderId::new()),
                        actor: None,
                    })
                    .await
            })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(InventoryError::InsufficientStock { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert!(succeeded <= N - 1);
    let record = engine.get_stock(warehouse_id, &item()).await.unwrap();
    assert!(record.reserved <= record.quantity);
    assert_eq!(record.reserved, i64::from(succeeded * (QUANTITY / N + 1)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mixed_concurrent_traffic_keeps_invariant() {
    let (engine, warehouse_id) = engine_with(50).await;

    let handles: Vec<_> = (0..40)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                let reference = ReservationRef::Cart(CartId::new());
                if engine
                    .reserve(ReserveStock {
                        warehouse_id,
                        item_id: item(),
                        quantity: 3,
                        reference,
                        actor: None,
                    })
                    .await
                    .is_err()
                {
                    return;
                }
                if i % 2 == 0 {
                    engine
                        .release(ReleaseStock {
                            warehouse_id,
                            item_id: item(),
                            quantity: 3,
                            reference,
                            reason: None,
                        })
                        .await
                        .unwrap();
                } else {
                    engine
                        .complete_sale(CompleteSale {
                            warehouse_id,
                            item_id: item(),
                            quantity: 3,
                            reference,
                        })
                        .await
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }

    let record = engine.get_stock(warehouse_id, &item()).await.unwrap();
    assert_eq!(record.reserved, 0);
    assert!(record.quantity >= 0);
    assert_eq!((50 - record.quantity) % 3, 0);
}

#[tokio::test]
async fn adjust_races_with_reservation() {
    let (engine, warehouse_id) = engine_with(10).await;
    let seen = engine.get_stock(warehouse_id, &item()).await.unwrap();

    engine
        .reserve(ReserveStock {
            warehouse_id,
            item_id: item(),
            quantity: 2,
            reference: ReservationRef::Order(OrderId::new()),
            actor: None,
        })
        .await
        .unwrap();

    let result = engine
        .adjust(AdjustStock {
            warehouse_id,
            item_id: item(),
            new_quantity: 8,
            expected_version: seen.version,
            reason: "cycle count".to_string(),
            actor: None,
        })
        .await;

    assert!(matches!(
        result,
        Err(InventoryError::OptimisticLockConflict { expected, actual }) if expected == seen.version && actual == seen.version + 1
    ));
}

#[tokio::test]
async fn analytics_follow_reservation_lifecycle() {
    let (engine, warehouse_id) = engine_with(20).await;
    let sold = ReservationRef::Order(OrderId::new());
    let cancelled = ReservationRef::Order(OrderId::new());

    for (reference, quantity) in [(sold, 4), (cancelled, 6)] {
        engine
            .reserve(ReserveStock {
                warehouse_id,
                item_id: item(),
                quantity,
                reference,
                actor: None,
            })
            .await
            .unwrap();
    }
    engine
        .complete_sale(CompleteSale {
            warehouse_id,
            item_id: item(),
            quantity: 4,
            reference: sold,
        })
        .await
        .unwrap();
    engine
        .release(ReleaseStock {
            warehouse_id,
            item_id: item(),
            quantity: 6,
            reference: cancelled,
            reason: Some("timeout".to_string()),
        })
        .await
        .unwrap();

    let analytics = ReservationAnalytics::new(Arc::clone(engine.ledger()));
    let stats = analytics.for_item(&item()).await.unwrap().unwrap();
    assert_eq!(stats.reservations, 2);
    assert_eq!(stats.reserved_units, 10);
    assert_eq!(stats.sold_units, 4);
    assert_eq!(stats.released_units, 6);
    assert!((stats.conversion_rate - 0.4).abs() < 1e-9);
    assert!(stats.mean_hold_seconds.is_some());
}
