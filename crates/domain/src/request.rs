//! Movement requests as submitted by upstream collaborators.

use common::{BalanceKey, CorrelationId, ItemId, WarehouseId};
use movement_store::{MAX_QUANTITY, Movement, MovementType, Reason};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A request to change stock, one variant per kind of change.
///
/// `in` and `out` carry a positive magnitude; the ledger applies the sign.
/// `adjust` carries the signed correction itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MovementRequest {
    In {
        item_id: ItemId,
        warehouse_id: WarehouseId,
        quantity: i64,
        reason: Reason,
        reference: Option<String>,
        notes: Option<String>,
    },
    Out {
        item_id: ItemId,
        warehouse_id: WarehouseId,
        quantity: i64,
        reason: Reason,
        reference: Option<String>,
        notes: Option<String>,
    },
    Adjust {
        item_id: ItemId,
        warehouse_id: WarehouseId,
        quantity: i64,
        #[serde(default = "count_adjustment")]
        reason: Reason,
        reference: Option<String>,
        notes: Option<String>,
    },
    Transfer {
        item_id: ItemId,
        from_warehouse_id: WarehouseId,
        to_warehouse_id: WarehouseId,
        quantity: i64,
        #[serde(default = "internal_transfer")]
        reason: Reason,
        reference: Option<String>,
        notes: Option<String>,
    },
}

fn count_adjustment() -> Reason {
    Reason::CountAdjustment
}

fn internal_transfer() -> Reason {
    Reason::InternalTransfer
}

/// What a validated request turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MovementPlan {
    /// One movement at one warehouse.
    Single(Movement),
    /// Two linked legs, handled by the transfer coordinator.
    Transfer(TransferOrder),
}

impl MovementRequest {
    pub fn item_id(&self) -> &ItemId {
        match self {
            MovementRequest::In { item_id, .. }
            | MovementRequest::Out { item_id, .. }
            | MovementRequest::Adjust { item_id, .. }
            | MovementRequest::Transfer { item_id, .. } => item_id,
        }
    }

    /// The request's `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            MovementRequest::In { .. } => "in",
            MovementRequest::Out { .. } => "out",
            MovementRequest::Adjust { .. } => "adjust",
            MovementRequest::Transfer { .. } => "transfer",
        }
    }

    /// Every warehouse the request touches.
    pub fn warehouse_ids(&self) -> Vec<&WarehouseId> {
        match self {
            MovementRequest::In { warehouse_id, .. }
            | MovementRequest::Out { warehouse_id, .. }
            | MovementRequest::Adjust { warehouse_id, .. } => vec![warehouse_id],
            MovementRequest::Transfer {
                from_warehouse_id,
                to_warehouse_id,
                ..
            } => vec![from_warehouse_id, to_warehouse_id],
        }
    }

    /// Checks quantity, reason and warehouse shape without consulting the catalog.
    pub fn check(&self) -> Result<(), ValidationError> {
        if self.item_id().as_str().trim().is_empty() {
            return Err(ValidationError::MissingItem);
        }
        if self
            .warehouse_ids()
            .iter()
            .any(|w| w.as_str().trim().is_empty())
        {
            return Err(ValidationError::MissingWarehouse);
        }

        let (movement_type, quantity, reason) = match self {
            MovementRequest::In {
                quantity, reason, ..
            } => (MovementType::In, *quantity, *reason),
            MovementRequest::Out {
                quantity, reason, ..
            } => (MovementType::Out, *quantity, *reason),
            MovementRequest::Adjust {
                quantity, reason, ..
            } => (MovementType::Adjust, *quantity, *reason),
            MovementRequest::Transfer {
                quantity,
                reason,
                from_warehouse_id,
                to_warehouse_id,
                ..
            } => {
                if from_warehouse_id == to_warehouse_id {
                    return Err(ValidationError::SameWarehouseTransfer(
                        from_warehouse_id.clone(),
                    ));
                }
                (MovementType::TransferOut, *quantity, *reason)
            }
        };

        check_quantity(self.kind(), movement_type, quantity)?;
        if !reason.is_allowed_for(movement_type) {
            return Err(ValidationError::ReasonNotAllowed {
                reason,
                movement_type: self.kind(),
            });
        }

        Ok(())
    }

    /// Validates the request and builds the movement(s) it stands for.
    pub fn into_plan(self, actor: &str) -> Result<MovementPlan, ValidationError> {
        self.check()?;

        let plan = match self {
            MovementRequest::In {
                item_id,
                warehouse_id,
                quantity,
                reason,
                reference,
                notes,
            } => MovementPlan::Single(
                Movement::new(
                    BalanceKey::new(item_id, warehouse_id),
                    MovementType::In,
                    quantity,
                    reason,
                )
                .with_reference(reference)
                .with_notes(notes)
                .created_by(actor),
            ),
            MovementRequest::Out {
                item_id,
                warehouse_id,
                quantity,
                reason,
                reference,
                notes,
            } => MovementPlan::Single(
                Movement::new(
                    BalanceKey::new(item_id, warehouse_id),
                    MovementType::Out,
                    -quantity,
                    reason,
                )
                .with_reference(reference)
                .with_notes(notes)
                .created_by(actor),
            ),
            MovementRequest::Adjust {
                item_id,
                warehouse_id,
                quantity,
                reason,
                reference,
                notes,
            } => MovementPlan::Single(
                Movement::new(
                    BalanceKey::new(item_id, warehouse_id),
                    MovementType::Adjust,
                    quantity,
                    reason,
                )
                .with_reference(reference)
                .with_notes(notes)
                .created_by(actor),
            ),
            MovementRequest::Transfer {
                item_id,
                from_warehouse_id,
                to_warehouse_id,
                quantity,
                reason,
                reference,
                notes,
            } => MovementPlan::Transfer(TransferOrder {
                item_id,
                from_warehouse_id,
                to_warehouse_id,
                quantity,
                reason,
                reference,
                notes,
                created_by: actor.to_string(),
            }),
        };

        Ok(plan)
    }
}

fn check_quantity(
    kind: &'static str,
    movement_type: MovementType,
    quantity: i64,
) -> Result<(), ValidationError> {
    if quantity == 0 {
        return Err(ValidationError::ZeroQuantity);
    }
    if quantity.unsigned_abs() > MAX_QUANTITY.unsigned_abs() {
        return Err(ValidationError::QuantityTooLarge {
            quantity,
            max: MAX_QUANTITY,
        });
    }
    if movement_type != MovementType::Adjust && quantity < 0 {
        return Err(ValidationError::NonPositiveQuantity {
            movement_type: kind,
            quantity,
        });
    }
    Ok(())
}

/// Moves `quantity` units of one item between two warehouses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOrder {
    pub item_id: ItemId,
    pub from_warehouse_id: WarehouseId,
    pub to_warehouse_id: WarehouseId,
    pub quantity: i64,
    pub reason: Reason,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub created_by: String,
}

impl TransferOrder {
    pub fn new(
        item_id: impl Into<ItemId>,
        from_warehouse_id: impl Into<WarehouseId>,
        to_warehouse_id: impl Into<WarehouseId>,
        quantity: i64,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            from_warehouse_id: from_warehouse_id.into(),
            to_warehouse_id: to_warehouse_id.into(),
            quantity,
            reason: Reason::InternalTransfer,
            reference: None,
            notes: None,
            created_by: "system".to_string(),
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn created_by(mut self, actor: impl Into<String>) -> Self {
        self.created_by = actor.into();
        self
    }

    pub fn source(&self) -> BalanceKey {
        BalanceKey::new(self.item_id.clone(), self.from_warehouse_id.clone())
    }

    pub fn destination(&self) -> BalanceKey {
        BalanceKey::new(self.item_id.clone(), self.to_warehouse_id.clone())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        MovementRequest::Transfer {
            item_id: self.item_id.clone(),
            from_warehouse_id: self.from_warehouse_id.clone(),
            to_warehouse_id: self.to_warehouse_id.clone(),
            quantity: self.quantity,
            reason: self.reason,
            reference: None,
            notes: None,
        }
        .check()
    }

    /// Builds the `transfer_out` and `transfer_in` legs sharing `correlation_id`.
    pub fn legs(&self, correlation_id: CorrelationId) -> (Movement, Movement) {
        let leg = |key, movement_type, delta| {
            Movement::new(key, movement_type, delta, self.reason)
                .with_reference(self.reference.clone())
                .with_notes(self.notes.clone())
                .created_by(self.created_by.clone())
                .correlated(correlation_id)
        };

        (
            leg(self.source(), MovementType::TransferOut, -self.quantity),
            leg(self.destination(), MovementType::TransferIn, self.quantity),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> MovementRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn receipt_becomes_positive_movement() {
        let request = parse(
            r#"{"type": "in", "item_id": "FAB-001", "warehouse_id": "Main",
                "quantity": 100, "reason": "RECEIPT_FROM_PURCHASE", "reference": "PO-17"}"#,
        );

        let MovementPlan::Single(movement) = request.into_plan("alice").unwrap() else {
            panic!("expected a single movement");
        };
        assert_eq!(movement.movement_type, MovementType::In);
        assert_eq!(movement.delta, 100);
        assert_eq!(movement.reference.as_deref(), Some("PO-17"));
        assert_eq!(movement.created_by, "alice");
        assert!(movement.correlation_id.is_none());
    }

    #[test]
    fn issue_is_negated() {
        let request = parse(
            r#"{"type": "out", "item_id": "FAB-001", "warehouse_id": "Main",
                "quantity": 30, "reason": "PRODUCTION_CONSUMPTION"}"#,
        );
        let MovementPlan::Single(movement) = request.into_plan("system").unwrap() else {
            panic!("expected a single movement");
        };
        assert_eq!(movement.delta, -30);
    }

    #[test]
    fn adjust_keeps_sign_and_defaults_reason() {
        let request = parse(
            r#"{"type": "adjust", "item_id": "FAB-001", "warehouse_id": "Main", "quantity": -4}"#,
        );
        let MovementPlan::Single(movement) = request.into_plan("system").unwrap() else {
            panic!("expected a single movement");
        };
        assert_eq!(movement.delta, -4);
        assert_eq!(movement.reason, Reason::CountAdjustment);
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let request = parse(
            r#"{"type": "adjust", "item_id": "FAB-001", "warehouse_id": "Main", "quantity": 0}"#,
        );
        assert_eq!(request.check(), Err(ValidationError::ZeroQuantity));
    }

    #[test]
    fn quantities_past_the_limit_are_rejected() {
        let adjust = parse(&format!(
            r#"{{"type": "adjust", "item_id": "FAB-001", "warehouse_id": "Main", "quantity": {}}}"#,
            i64::MIN
        ));
        assert_eq!(
            adjust.check(),
            Err(ValidationError::QuantityTooLarge {
                quantity: i64::MIN,
                max: MAX_QUANTITY
            })
        );

        let receipt = parse(&format!(
            r#"{{"type": "in", "item_id": "FAB-001", "warehouse_id": "Main",
                "quantity": {}, "reason": "CUSTOMER_RETURN"}}"#,
            i64::MAX
        ));
        assert!(matches!(
            receipt.into_plan("system"),
            Err(ValidationError::QuantityTooLarge { .. })
        ));
    }

    #[test]
    fn negative_receipt_is_rejected() {
        let request = parse(
            r#"{"type": "in", "item_id": "FAB-001", "warehouse_id": "Main",
                "quantity": -5, "reason": "CUSTOMER_RETURN"}"#,
        );
        assert!(matches!(
            request.check(),
            Err(ValidationError::NonPositiveQuantity { quantity: -5, .. })
        ));
    }

    #[test]
    fn reason_of_another_type_is_rejected() {
        let request = parse(
            r#"{"type": "in", "item_id": "FAB-001", "warehouse_id": "Main",
                "quantity": 5, "reason": "DIRECT_SALE"}"#,
        );
        assert_eq!(
            request.check(),
            Err(ValidationError::ReasonNotAllowed {
                reason: Reason::DirectSale,
                movement_type: "in",
            })
        );
    }

    #[test]
    fn blank_warehouse_is_rejected() {
        let request = parse(
            r#"{"type": "out", "item_id": "FAB-001", "warehouse_id": " ",
                "quantity": 5, "reason": "DIRECT_SALE"}"#,
        );
        assert_eq!(request.check(), Err(ValidationError::MissingWarehouse));
    }

    #[test]
    fn transfer_to_same_warehouse_is_rejected() {
        let request = parse(
            r#"{"type": "transfer", "item_id": "FAB-001", "from_warehouse_id": "Main",
                "to_warehouse_id": "Main", "quantity": 5}"#,
        );
        assert_eq!(
            request.check(),
            Err(ValidationError::SameWarehouseTransfer(WarehouseId::new(
                "Main"
            )))
        );
    }

    #[test]
    fn transfer_legs_mirror_each_other() {
        let order = TransferOrder::new("FAB-001", "Main", "Branch", 20).with_notes("restock");
        let correlation_id = CorrelationId::new();
        let (out, inbound) = order.legs(correlation_id);

        assert_eq!(out.movement_type, MovementType::TransferOut);
        assert_eq!(out.delta, -20);
        assert_eq!(out.key(), BalanceKey::new("FAB-001", "Main"));
        assert_eq!(inbound.movement_type, MovementType::TransferIn);
        assert_eq!(inbound.delta, 20);
        assert_eq!(inbound.key(), BalanceKey::new("FAB-001", "Branch"));
        assert_eq!(out.correlation_id, Some(correlation_id));
        assert_eq!(inbound.correlation_id, Some(correlation_id));
        assert!(out.validate().is_ok());
        assert!(inbound.validate().is_ok());
    }

    #[test]
    fn transfer_rejects_non_transfer_reason() {
        let mut order = TransferOrder::new("FAB-001", "Main", "Branch", 20);
        order.reason = Reason::DirectSale;
        assert!(matches!(
            order.validate(),
            Err(ValidationError::ReasonNotAllowed { .. })
        ));
    }

    #[test]
    fn unknown_type_fails_to_parse() {
        let result: Result<MovementRequest, _> = serde_json::from_str(
            r#"{"type": "teleport", "item_id": "FAB-001", "warehouse_id": "Main", "quantity": 1}"#,
        );
        assert!(result.is_err());
    }
}
