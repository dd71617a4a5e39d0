use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    InMemoryCatalog, ItemKind, MovementRequest, StockableItem, Warehouse, validate_references,
};

const RECEIPT: &str = r#"{"type": "in", "item_id": "FAB-001", "warehouse_id": "Main",
    "quantity": 100, "reason": "RECEIPT_FROM_PURCHASE", "reference": "PO-17"}"#;

const TRANSFER: &str = r#"{"type": "transfer", "item_id": "FAB-001",
    "from_warehouse_id": "Main", "to_warehouse_id": "Branch", "quantity": 20}"#;

fn bench_parse_and_plan(c: &mut Criterion) {
    c.bench_function("domain/parse_and_plan_receipt", |b| {
        b.iter(|| {
            let request: MovementRequest = serde_json::from_str(RECEIPT).unwrap();
            request.into_plan("bench").unwrap();
        });
    });

    c.bench_function("domain/parse_and_plan_transfer", |b| {
        b.iter(|| {
            let request: MovementRequest = serde_json::from_str(TRANSFER).unwrap();
            request.into_plan("bench").unwrap();
        });
    });
}

fn bench_validate_references(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let catalog = InMemoryCatalog::new();
    rt.block_on(async {
        catalog
            .add_item(StockableItem {
                id: "FAB-001".into(),
                sku: "FAB-COT-WHT".to_string(),
                name: "Cotton fabric, white".to_string(),
                unit: "m".to_string(),
                kind: ItemKind::Material,
                low_stock_threshold: 25,
            })
            .await;
        for id in ["Main", "Branch"] {
            catalog
                .add_warehouse(Warehouse {
                    id: id.into(),
                    name: id.to_string(),
                })
                .await;
        }
    });
    let request: MovementRequest = serde_json::from_str(TRANSFER).unwrap();

    c.bench_function("domain/validate_transfer_references", |b| {
        b.iter(|| {
            rt.block_on(async {
                validate_references(&catalog, &request).await.unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_parse_and_plan, bench_validate_references);
criterion_main!(benches);
