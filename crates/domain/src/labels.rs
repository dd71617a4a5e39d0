//! Display labels for reason codes and movement types.

use movement_store::{MovementType, Reason};

pub fn reason_label(reason: Reason) -> &'static str {
    match reason {
        Reason::ReceiptFromPurchase => "Receipt from purchase",
        Reason::CustomerReturn => "Customer return",
        Reason::ProductionOutput => "Production output",
        Reason::ProductionConsumption => "Production consumption",
        Reason::DirectSale => "Direct sale",
        Reason::LossDamage => "Loss or damage",
        Reason::CountAdjustment => "Count adjustment",
        Reason::InternalTransfer => "Internal transfer",
    }
}

pub fn movement_type_label(movement_type: MovementType) -> &'static str {
    match movement_type {
        MovementType::In => "Stock in",
        MovementType::Out => "Stock out",
        MovementType::Adjust => "Adjustment",
        MovementType::TransferOut => "Transfer out",
        MovementType::TransferIn => "Transfer in",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_reason_has_a_distinct_label() {
        let labels: HashSet<&str> = Reason::ALL.iter().map(|r| reason_label(*r)).collect();
        assert_eq!(labels.len(), Reason::ALL.len());
    }
}
