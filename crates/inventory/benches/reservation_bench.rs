use std::sync::Arc;

use common::{Coordinates, OrderId, ReservationRef, WarehouseId};
use criterion::{Criterion, criterion_group, criterion_main};
use inventory::{
    AvailabilityAggregator, ItemRequest, ReleaseStock, ReservationEngine, ReserveStock, Restock,
    WarehouseSelector,
};
use stock_ledger::{InMemoryStockLedger, NewWarehouse};

fn setup(
    rt: &tokio::runtime::Runtime,
    warehouses: usize,
) -> (ReservationEngine<InMemoryStockLedger>, Vec<WarehouseId>) {
    let engine = ReservationEngine::new(Arc::new(InMemoryStockLedger::new()));
    let ids = rt.block_on(async {
        let mut ids = Vec::new();
        for i in 0..warehouses {
            let warehouse = engine
                .create_warehouse(NewWarehouse::new(
                    format!("W{i}"),
                    Coordinates::new(10.0 + i as f64 * 0.5, 106.0),
                ))
                .await
                .unwrap();
            for item in ["SKU-A", "SKU-B", "SKU-C"] {
                engine
                    .restock(Restock {
                        warehouse_id: warehouse.id,
                        item_id: item.into(),
                        quantity: 1_000_000,
                        reason: None,
                    })
                    .await
                    .unwrap();
            }
            ids.push(warehouse.id);
        }
        ids
    });
    (engine, ids)
}

fn bench_reserve_release(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (engine, ids) = setup(&rt, 1);
    let warehouse_id = ids[0];

    c.bench_function("reservation/reserve_then_release", |b| {
        b.iter(|| {
            rt.block_on(async {
                let reference = ReservationRef::Order(OrderId::new());
                engine
                    .reserve(ReserveStock {
                        warehouse_id,
                        item_id: "SKU-A".into(),
                        quantity: 1,
                        reference,
                        actor: None,
                    })
                    .await
                    .unwrap();
                engine
                    .release(ReleaseStock {
                        warehouse_id,
                        item_id: "SKU-A".into(),
                        quantity: 1,
                        reference,
                        reason: None,
                    })
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_contended_reserve(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .build()
        .unwrap();
    let (engine, ids) = setup(&rt, 1);
    let warehouse_id = ids[0];

    c.bench_function("reservation/contended_reserve_8", |b| {
        b.iter(|| {
            rt.block_on(async {
                let handles: Vec<_> = (0..8)
                    .map(|_| {
                        let engine = engine.clone();
                        tokio::spawn(async move {
                            engine
                                .reserve(ReserveStock {
                                    warehouse_id,
                                    item_id: "SKU-B".into(),
                                    quantity: 1,
                                    reference: ReservationRef::Order(OrderId::new()),
                                    actor: None,
                                })
                                .await
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.await.unwrap().unwrap();
                }
            });
        });
    });
}

fn bench_availability(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (engine, _) = setup(&rt, 20);
    let aggregator = AvailabilityAggregator::new(Arc::clone(engine.ledger()));
    let selector = WarehouseSelector::new(Arc::clone(engine.ledger()));
    let customer = Coordinates::new(10.76, 106.66);
    let basket = [
        ItemRequest::new("SKU-A", 2),
        ItemRequest::new("SKU-B", 1),
        ItemRequest::new("SKU-C", 5),
    ];

    c.bench_function("availability/three_items_twenty_warehouses", |b| {
        b.iter(|| {
            rt.block_on(async {
                aggregator
                    .check_availability(&basket, customer)
                    .await
                    .unwrap();
            });
        });
    });

    c.bench_function("selector/find_nearest_twenty_warehouses", |b| {
        b.iter(|| {
            rt.block_on(async {
                selector
                    .find_nearest(&"SKU-A".into(), 3, customer)
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_reserve_release,
    bench_contended_reserve,
    bench_availability,
);
criterion_main!(benches);
