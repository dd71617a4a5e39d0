use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BalanceKey, ItemId, Movement, MovementId, Result, StoreError, WarehouseId};

/// Derived stock position of one item at one warehouse.
///
/// `current_stock` is always the sum of the deltas of every movement with this
/// key; `version` counts those movements. Only the projector mutates a balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub item_id: ItemId,
    pub warehouse_id: WarehouseId,
    pub current_stock: i64,
    pub reserved_stock: i64,
    pub last_applied_movement_id: Option<MovementId>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl Balance {
    /// Creates the zero balance a key starts from before its first movement.
    pub fn empty(key: BalanceKey) -> Self {
        Self {
            item_id: key.item_id,
            warehouse_id: key.warehouse_id,
            current_stock: 0,
            reserved_stock: 0,
            last_applied_movement_id: None,
            version: 0,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Returns the key of this balance.
    pub fn key(&self) -> BalanceKey {
        BalanceKey {
            item_id: self.item_id.clone(),
            warehouse_id: self.warehouse_id.clone(),
        }
    }

    /// Stock not earmarked by reservations.
    pub fn available(&self) -> i64 {
        self.current_stock.saturating_sub(self.reserved_stock)
    }

    /// `current_stock + delta`, or `StockOverflow` when it leaves the `i64` range.
    pub fn stock_after(&self, delta: i64) -> Result<i64> {
        self.current_stock
            .checked_add(delta)
            .ok_or_else(|| StoreError::StockOverflow {
                key: self.key(),
                current: self.current_stock,
                op: "+",
                delta,
            })
    }

    /// Folds one movement into the balance.
    ///
    /// Uses the movement's own timestamp so that replaying the ledger yields
    /// exactly the incrementally maintained value.
    /// Leaves the balance untouched when the new stock would overflow.
    pub fn apply(&mut self, movement: &Movement) -> Result<()> {
        debug_assert_eq!(movement.item_id, self.item_id);
        debug_assert_eq!(movement.warehouse_id, self.warehouse_id);

        self.current_stock = self.stock_after(movement.delta)?;
        self.last_applied_movement_id = Some(movement.id);
        self.version += 1;
        self.updated_at = movement.created_at;
        Ok(())
    }

    /// Rebuilds a balance from zero by replaying movements in append order.
    pub fn replay<'a>(
        key: BalanceKey,
        movements: impl IntoIterator<Item = &'a Movement>,
    ) -> Result<Self> {
        let mut balance = Self::empty(key);
        for movement in movements {
            balance.apply(movement)?;
        }
        Ok(balance)
    }

    /// Compares the movement-derived part of two balances.
    ///
    /// Reserved stock is excluded: it is not recorded in the ledger and cannot be replayed.
    pub fn matches_ledger_state(&self, other: &Balance) -> bool {
        self.current_stock == other.current_stock
            && self.version == other.version
            && self.last_applied_movement_id == other.last_applied_movement_id
    }
}
