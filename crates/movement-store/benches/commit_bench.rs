use criterion::{Criterion, criterion_group, criterion_main};
use movement_store::{
    BalanceKey, CommitOptions, CorrelationId, InMemoryLedgerStore, LedgerStore, LedgerStoreExt,
    Movement, MovementType, Reason,
};

fn receipt(key: &BalanceKey, qty: i64) -> Movement {
    Movement::new(
        key.clone(),
        MovementType::In,
        qty,
        Reason::ReceiptFromPurchase,
    )
}

fn bench_commit_single(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryLedgerStore::new();
    let key = BalanceKey::new("FAB-001", "Main");

    c.bench_function("movement_store/commit_single", |b| {
        b.iter(|| {
            rt.block_on(async {
                store
                    .commit_one(receipt(&key, 1), CommitOptions::new())
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_commit_transfer(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryLedgerStore::new();
    let from = BalanceKey::new("FAB-001", "Main");
    let to = BalanceKey::new("FAB-001", "Branch");

    rt.block_on(async {
        store
            .commit_one(receipt(&from, 1_000_000_000), CommitOptions::new())
            .await
            .unwrap();
    });

    c.bench_function("movement_store/commit_transfer", |b| {
        b.iter(|| {
            rt.block_on(async {
                let correlation_id = CorrelationId::new();
                let legs = vec![
                    Movement::new(
                        from.clone(),
                        MovementType::TransferOut,
                        -1,
                        Reason::InternalTransfer,
                    )
                    .correlated(correlation_id),
                    Movement::new(
                        to.clone(),
                        MovementType::TransferIn,
                        1,
                        Reason::InternalTransfer,
                    )
                    .correlated(correlation_id),
                ];
                store.commit(legs, CommitOptions::new()).await.unwrap();
            });
        });
    });
}

fn bench_contended_commits(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .build()
        .unwrap();

    c.bench_function("movement_store/contended_commits_32", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryLedgerStore::new();
                let key = BalanceKey::new("FAB-001", "Main");
                let handles: Vec<_> = (0..32)
                    .map(|_| {
                        let store = store.clone();
                        let movement = receipt(&key, 1);
                        tokio::spawn(async move {
                            store.commit_one(movement, CommitOptions::new()).await
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

criterion_group!(
    benches,
    bench_commit_single,
    bench_commit_transfer,
    bench_contended_commits
);
criterion_main!(benches);
