//! Shared identifier types used across the inventory ledger crates.

pub mod types;

pub use types::{BalanceKey, CorrelationId, ItemId, MovementId, WarehouseId};
