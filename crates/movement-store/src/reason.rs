use serde::{Deserialize, Serialize};

use crate::MovementType;

/// Closed set of reasons a movement may carry.
///
/// Each movement type accepts only its own subset; see [`Reason::is_allowed_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    ReceiptFromPurchase,
    CustomerReturn,
    ProductionOutput,
    ProductionConsumption,
    DirectSale,
    LossDamage,
    CountAdjustment,
    InternalTransfer,
}

impl Reason {
    pub const ALL: [Reason; 8] = [
        Reason::ReceiptFromPurchase,
        Reason::CustomerReturn,
        Reason::ProductionOutput,
        Reason::ProductionConsumption,
        Reason::DirectSale,
        Reason::LossDamage,
        Reason::CountAdjustment,
        Reason::InternalTransfer,
    ];

    /// Returns the reasons a movement of the given type may carry.
    pub fn allowed_for(movement_type: MovementType) -> &'static [Reason] {
        match movement_type {
            MovementType::In => &[
                Reason::ReceiptFromPurchase,
                Reason::CustomerReturn,
                Reason::ProductionOutput,
            ],
            MovementType::Out => &[
                Reason::ProductionConsumption,
                Reason::DirectSale,
                Reason::LossDamage,
            ],
            MovementType::Adjust => &[Reason::CountAdjustment],
            MovementType::TransferOut | MovementType::TransferIn => &[Reason::InternalTransfer],
        }
    }

    /// Returns true if this reason belongs to the given movement type.
    pub fn is_allowed_for(&self, movement_type: MovementType) -> bool {
        Self::allowed_for(movement_type).contains(self)
    }

    /// Returns the stored code (e.g. `"RECEIPT_FROM_PURCHASE"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::ReceiptFromPurchase => "RECEIPT_FROM_PURCHASE",
            Reason::CustomerReturn => "CUSTOMER_RETURN",
            Reason::ProductionOutput => "PRODUCTION_OUTPUT",
            Reason::ProductionConsumption => "PRODUCTION_CONSUMPTION",
            Reason::DirectSale => "DIRECT_SALE",
            Reason::LossDamage => "LOSS_DAMAGE",
            Reason::CountAdjustment => "COUNT_ADJUSTMENT",
            Reason::InternalTransfer => "INTERNAL_TRANSFER",
        }
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Reason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Reason::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown reason code: {s}"))
    }
}
