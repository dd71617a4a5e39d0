use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use movement_store::{BalanceKey, InMemoryLedgerStore, Movement, MovementType, Reason};
use projections::{BalanceProjector, Projection, ProjectionProcessor, ReplayedBalancesView};

const WAREHOUSES: [&str; 4] = ["Main", "Branch", "Outlet", "Returns"];

/// Populate a store with `n` receipts spread over 25 items and 4 warehouses.
async fn populate_store(projector: &BalanceProjector<InMemoryLedgerStore>, n: usize) {
    for i in 0..n {
        let key = BalanceKey::new(format!("ITEM-{:03}", i % 25), WAREHOUSES[i % 4]);
        let movement = Movement::new(key, MovementType::In, 10, Reason::ReceiptFromPurchase);
        projector.apply(movement).await.unwrap();
    }
}

fn bench_apply_single_movement(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let projector = BalanceProjector::new(Arc::new(InMemoryLedgerStore::new()));
    let key = BalanceKey::new("FAB-001", "Main");

    c.bench_function("projections/apply_single_movement", |b| {
        b.iter(|| {
            rt.block_on(async {
                let movement =
                    Movement::new(key.clone(), MovementType::In, 1, Reason::ReceiptFromPurchase);
                projector.apply(movement).await.unwrap();
            });
        });
    });
}

fn bench_replay_1000_movements(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = Arc::new(InMemoryLedgerStore::new());
    let projector = BalanceProjector::new(Arc::clone(&store));

    rt.block_on(populate_store(&projector, 1000));

    c.bench_function("projections/replay_1000_movements", |b| {
        b.iter(|| {
            rt.block_on(async {
                let view = ReplayedBalancesView::new();
                let mut processor = ProjectionProcessor::new(Arc::clone(&store));
                processor.register(Box::new(view.clone()) as Box<dyn Projection>);
                processor.run_catch_up().await.unwrap();
            });
        });
    });
}

fn bench_rebuild_single_key(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let projector = BalanceProjector::new(Arc::new(InMemoryLedgerStore::new()));
    let key = BalanceKey::new("ITEM-000", "Main");

    rt.block_on(populate_store(&projector, 1000));

    c.bench_function("projections/rebuild_single_key", |b| {
        b.iter(|| {
            rt.block_on(async {
                projector.rebuild(&key).await.unwrap();
            });
        });
    });
}

fn bench_verify_all_1000_movements(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let projector = BalanceProjector::new(Arc::new(InMemoryLedgerStore::new()));

    rt.block_on(populate_store(&projector, 1000));

    c.bench_function("projections/verify_all_1000_movements", |b| {
        b.iter(|| {
            rt.block_on(async {
                projector.verify_all().await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_apply_single_movement,
    bench_replay_1000_movements,
    bench_rebuild_single_key,
    bench_verify_all_1000_movements,
);
criterion_main!(benches);
