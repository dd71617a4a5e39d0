//! Domain error types.

use common::{BalanceKey, ItemId, WarehouseId};
use movement_store::Reason;
use thiserror::Error;

/// A movement request that can never succeed as submitted. Not retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("quantity must not be zero")]
    ZeroQuantity,

    #[error("quantity must be positive for {movement_type} movements, got {quantity}")]
    NonPositiveQuantity {
        movement_type: &'static str,
        quantity: i64,
    },

    #[error("quantity {quantity} is out of range, the limit is {max}")]
    QuantityTooLarge { quantity: i64, max: i64 },

    #[error("reason {reason} is not allowed for {movement_type} movements")]
    ReasonNotAllowed {
        reason: Reason,
        movement_type: &'static str,
    },

    #[error("item id is required")]
    MissingItem,

    #[error("warehouse id is required")]
    MissingWarehouse,

    #[error("cannot transfer from warehouse {0} to itself")]
    SameWarehouseTransfer(WarehouseId),

    #[error("unknown item: {0}")]
    UnknownItem(ItemId),

    #[error("unknown warehouse: {0}")]
    UnknownWarehouse(WarehouseId),

    /// The non-negative guard refused an issue or reservation.
    #[error("insufficient stock at {key}: {available} available, {requested} requested")]
    InsufficientStock {
        key: BalanceKey,
        available: i64,
        requested: i64,
    },

    #[error("cannot release {requested} at {key}: only {reserved} reserved")]
    ReleaseExceedsReserved {
        key: BalanceKey,
        reserved: i64,
        requested: i64,
    },
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The catalog seed could not be read.
    #[error("Catalog seed I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
