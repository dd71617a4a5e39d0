//! Balances recomputed from the ledger alone, for whole-ledger audits.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use movement_store::{Balance, BalanceKey, Movement};
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};

#[derive(Default)]
struct ReplayState {
    balances: BTreeMap<BalanceKey, Balance>,
    position: ProjectionPosition,
}

/// Balance per key as a full replay of the ledger computes it.
///
/// Independent of the stored balance rows, so comparing the two detects drift.
/// Reserved stock is not in the ledger and stays zero here.
#[derive(Clone, Default)]
pub struct ReplayedBalancesView {
    state: Arc<RwLock<ReplayState>>,
}

impl ReplayedBalancesView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn balance(&self, key: &BalanceKey) -> Option<Balance> {
        self.state.read().await.balances.get(key).cloned()
    }

    /// Every replayed balance, in key order.
    pub async fn balances(&self) -> Vec<Balance> {
        self.state.read().await.balances.values().cloned().collect()
    }

    pub async fn key_count(&self) -> usize {
        self.state.read().await.balances.len()
    }
}

#[async_trait]
impl Projection for ReplayedBalancesView {
    fn name(&self) -> &'static str {
        "ReplayedBalancesView"
    }

    async fn handle(&self, movement: &Movement) -> Result<()> {
        let mut state = self.state.write().await;
        let key = movement.key();
        state
            .balances
            .entry(key.clone())
            .or_insert_with(|| Balance::empty(key))
            .apply(movement)?;
        state.position = state.position.advance(movement.sequence);
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.balances.clear();
        state.position = ProjectionPosition::zero();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use movement_store::{MovementType, Reason};

    fn movement(warehouse: &str, delta: i64, sequence: i64) -> Movement {
        let movement_type = if delta > 0 {
            MovementType::In
        } else {
            MovementType::Out
        };
        let reason = if delta > 0 {
            Reason::ReceiptFromPurchase
        } else {
            Reason::DirectSale
        };
        let mut m = Movement::new(
            BalanceKey::new("FAB-001", warehouse),
            movement_type,
            delta,
            reason,
        );
        m.sequence = sequence;
        m
    }

    #[tokio::test]
    async fn folds_movements_per_key() {
        let view = ReplayedBalancesView::new();
        view.handle(&movement("Main", 100, 1)).await.unwrap();
        view.handle(&movement("Branch", 5, 2)).await.unwrap();
        view.handle(&movement("Main", -30, 3)).await.unwrap();

        let main = view
            .balance(&BalanceKey::new("FAB-001", "Main"))
            .await
            .unwrap();
        assert_eq!(main.current_stock, 70);
        assert_eq!(main.version, 2);
        assert_eq!(view.key_count().await, 2);
        assert_eq!(view.position().await.last_sequence, 3);
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let view = ReplayedBalancesView::new();
        view.handle(&movement("Main", 1, 1)).await.unwrap();
        view.reset().await.unwrap();

        assert!(view.balances().await.is_empty());
        assert_eq!(view.position().await, ProjectionPosition::zero());
    }
}
