//! Integration tests for turning submitted requests into movements.
//!
//! These tests drive the public API the way the HTTP layer does: parse JSON,
//! check catalog references, then build the plan.

use domain::{
    InMemoryCatalog, MovementPlan, MovementRequest, StockStatus, ValidationError, reason_label,
    validate_references,
};
use movement_store::{MovementType, Reason};

const SEED: &str = r#"{
    "items": [
        {"id": "FAB-001", "sku": "FAB-COT-WHT", "name": "Cotton fabric, white",
         "unit": "m", "kind": "material", "low_stock_threshold": 25},
        {"id": "TSH-M-BLK", "sku": "TSH-M-BLK", "name": "T-shirt M black",
         "unit": "pcs", "kind": "variant", "low_stock_threshold": 5}
    ],
    "warehouses": [
        {"id": "Main", "name": "Main warehouse"},
        {"id": "Branch", "name": "Branch store"}
    ]
}"#;

fn catalog() -> InMemoryCatalog {
    InMemoryCatalog::from_json(SEED).unwrap()
}

async fn plan(json: &str) -> Result<MovementPlan, ValidationError> {
    let request: MovementRequest = serde_json::from_str(json).unwrap();
    validate_references(&catalog(), &request).await?;
    request.into_plan("operator")
}

mod accepted {
    use super::*;

    #[tokio::test]
    async fn receipt_from_purchase() {
        let plan = plan(
            r#"{"type": "in", "item_id": "FAB-001", "warehouse_id": "Main",
                "quantity": 100, "reason": "RECEIPT_FROM_PURCHASE"}"#,
        )
        .await
        .unwrap();

        let MovementPlan::Single(movement) = plan else {
            panic!("expected a single movement");
        };
        assert_eq!(movement.delta, 100);
        assert_eq!(reason_label(movement.reason), "Receipt from purchase");
    }

    #[tokio::test]
    async fn transfer_between_known_warehouses() {
        let plan = plan(
            r#"{"type": "transfer", "item_id": "TSH-M-BLK", "from_warehouse_id": "Main",
                "to_warehouse_id": "Branch", "quantity": 20, "notes": "weekend restock"}"#,
        )
        .await
        .unwrap();

        let MovementPlan::Transfer(order) = plan else {
            panic!("expected a transfer");
        };
        assert_eq!(order.quantity, 20);
        assert_eq!(order.reason, Reason::InternalTransfer);
        assert_eq!(order.created_by, "operator");
        assert_eq!(order.notes.as_deref(), Some("weekend restock"));
    }

    #[tokio::test]
    async fn every_allowed_reason_passes() {
        for (kind, movement_type, quantity) in [
            ("in", MovementType::In, 5),
            ("out", MovementType::Out, 5),
            ("adjust", MovementType::Adjust, -5),
        ] {
            for reason in Reason::allowed_for(movement_type) {
                let json = format!(
                    r#"{{"type": "{kind}", "item_id": "FAB-001", "warehouse_id": "Main",
                        "quantity": {quantity}, "reason": "{reason}"}}"#
                );
                assert!(plan(&json).await.is_ok(), "{kind} with {reason}");
            }
        }
    }
}

mod rejected {
    use super::*;

    #[tokio::test]
    async fn reason_outside_type() {
        for (kind, reason) in [
            ("in", "LOSS_DAMAGE"),
            ("out", "CUSTOMER_RETURN"),
            ("adjust", "INTERNAL_TRANSFER"),
        ] {
            let json = format!(
                r#"{{"type": "{kind}", "item_id": "FAB-001", "warehouse_id": "Main",
                    "quantity": 1, "reason": "{reason}"}}"#
            );
            assert!(matches!(
                plan(&json).await,
                Err(ValidationError::ReasonNotAllowed { .. })
            ));
        }
    }

    #[tokio::test]
    async fn unknown_item() {
        let result = plan(
            r#"{"type": "in", "item_id": "NOPE", "warehouse_id": "Main",
                "quantity": 1, "reason": "CUSTOMER_RETURN"}"#,
        )
        .await;
        assert!(matches!(result, Err(ValidationError::UnknownItem(_))));
    }

    #[tokio::test]
    async fn unknown_destination_warehouse() {
        let result = plan(
            r#"{"type": "transfer", "item_id": "FAB-001", "from_warehouse_id": "Main",
                "to_warehouse_id": "Attic", "quantity": 1}"#,
        )
        .await;
        assert!(matches!(result, Err(ValidationError::UnknownWarehouse(_))));
    }

    #[tokio::test]
    async fn zero_quantity_transfer() {
        let result = plan(
            r#"{"type": "transfer", "item_id": "FAB-001", "from_warehouse_id": "Main",
                "to_warehouse_id": "Branch", "quantity": 0}"#,
        )
        .await;
        assert_eq!(result, Err(ValidationError::ZeroQuantity));
    }
}

#[test]
fn status_uses_item_threshold() {
    let catalog_item_threshold = 5;
    assert_eq!(
        StockStatus::derive(5, catalog_item_threshold),
        StockStatus::LowStock
    );
    assert_eq!(
        StockStatus::derive(6, catalog_item_threshold),
        StockStatus::InStock
    );
}
