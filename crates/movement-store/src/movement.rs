use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BalanceKey, CorrelationId, ItemId, MovementId, Reason, WarehouseId};

/// Largest quantity a single movement may carry, in either direction.
pub const MAX_QUANTITY: i64 = 1_000_000_000_000;

/// Kind of stock change a movement records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    In,
    Out,
    Adjust,
    TransferOut,
    TransferIn,
}

impl MovementType {
    /// Returns the stored code (e.g. `"transfer_out"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "in",
            MovementType::Out => "out",
            MovementType::Adjust => "adjust",
            MovementType::TransferOut => "transfer_out",
            MovementType::TransferIn => "transfer_in",
        }
    }

    /// Returns true for the two legs of a warehouse transfer.
    pub fn is_transfer_leg(&self) -> bool {
        matches!(self, MovementType::TransferOut | MovementType::TransferIn)
    }

    /// Checks that a delta has the sign this type requires.
    ///
    /// Receipts add stock, issues remove it, adjustments may go either way.
    pub fn accepts_delta(&self, delta: i64) -> bool {
        match self {
            MovementType::In | MovementType::TransferIn => delta > 0,
            MovementType::Out | MovementType::TransferOut => delta < 0,
            MovementType::Adjust => delta != 0,
        }
    }
}

impl std::fmt::Display for MovementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MovementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(MovementType::In),
            "out" => Ok(MovementType::Out),
            "adjust" => Ok(MovementType::Adjust),
            "transfer_out" => Ok(MovementType::TransferOut),
            "transfer_in" => Ok(MovementType::TransferIn),
            other => Err(format!("unknown movement type: {other}")),
        }
    }
}

/// One immutable ledger entry changing the stock of one item at one warehouse.
///
/// `sequence` and `created_at` are assigned by the store when the movement
/// is committed; before that `sequence` is 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,

    /// Position in the global append order.
    pub sequence: i64,

    pub item_id: ItemId,
    pub warehouse_id: WarehouseId,
    pub movement_type: MovementType,

    /// Signed quantity applied to `current_stock`.
    pub delta: i64,

    pub reason: Reason,

    /// External document this movement originates from (purchase order, invoice...).
    pub reference: Option<String>,

    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,

    /// Shared by both legs of a transfer; `None` for every other movement.
    pub correlation_id: Option<CorrelationId>,
}

impl Movement {
    /// Creates an uncommitted movement for the given key.
    pub fn new(key: BalanceKey, movement_type: MovementType, delta: i64, reason: Reason) -> Self {
        Self {
            id: MovementId::new(),
            sequence: 0,
            item_id: key.item_id,
            warehouse_id: key.warehouse_id,
            movement_type,
            delta,
            reason,
            reference: None,
            notes: None,
            created_at: Utc::now(),
            created_by: "system".to_string(),
            correlation_id: None,
        }
    }

    pub fn with_reference(mut self, reference: Option<String>) -> Self {
        self.reference = reference;
        self
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    pub fn created_by(mut self, actor: impl Into<String>) -> Self {
        self.created_by = actor.into();
        self
    }

    pub fn correlated(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Returns the balance key this movement applies to.
    pub fn key(&self) -> BalanceKey {
        BalanceKey {
            item_id: self.item_id.clone(),
            warehouse_id: self.warehouse_id.clone(),
        }
    }

    /// Checks the invariants every stored movement must satisfy.
    pub fn validate(&self) -> Result<(), String> {
        if self.delta.unsigned_abs() > MAX_QUANTITY.unsigned_abs() {
            return Err(format!(
                "delta {} exceeds the movement limit of {MAX_QUANTITY}",
                self.delta
            ));
        }
        if !self.movement_type.accepts_delta(self.delta) {
            return Err(format!(
                "delta {} is not valid for a {} movement",
                self.delta, self.movement_type
            ));
        }
        if !self.reason.is_allowed_for(self.movement_type) {
            return Err(format!(
                "reason {} is not allowed for a {} movement",
                self.reason, self.movement_type
            ));
        }
        match (self.movement_type.is_transfer_leg(), self.correlation_id) {
            (true, None) => Err(format!("transfer leg {} has no correlation id", self.id)),
            (false, Some(_)) => Err(format!(
                "{} movement {} must not carry a correlation id",
                self.movement_type, self.id
            )),
            _ => Ok(()),
        }
    }
}
