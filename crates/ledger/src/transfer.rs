//! Two-legged warehouse transfers.

use std::time::Instant;

use common::CorrelationId;
use domain::TransferOrder;
use movement_store::{Balance, LedgerStore, Movement, MovementType};
use projections::BalanceProjector;
use serde::Serialize;

use crate::{LedgerError, Result};

/// Both committed legs of a transfer and the balances they produced.
#[derive(Debug, Clone, Serialize)]
pub struct TransferReceipt {
    pub correlation_id: CorrelationId,
    pub transfer_out: Movement,
    pub transfer_in: Movement,
    /// Source and destination balances, in key order.
    pub balances: Vec<Balance>,
}

impl TransferReceipt {
    pub fn movements(&self) -> [&Movement; 2] {
        [&self.transfer_out, &self.transfer_in]
    }
}

/// Moves stock between two warehouses as one unit.
///
/// On stores with atomic batches both legs go into a single commit, which
/// locks the two keys in ascending order. Otherwise the legs are committed
/// one after the other and a failed inbound leg is reversed at the source.
pub struct TransferCoordinator<S: LedgerStore> {
    projector: BalanceProjector<S>,
}

impl<S: LedgerStore> Clone for TransferCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            projector: self.projector.clone(),
        }
    }
}

impl<S: LedgerStore> TransferCoordinator<S> {
    pub fn new(projector: BalanceProjector<S>) -> Self {
        Self { projector }
    }

    /// Executes a transfer order under a fresh correlation id.
    #[tracing::instrument(
        skip(self, order),
        fields(
            item_id = %order.item_id,
            from = %order.from_warehouse_id,
            to = %order.to_warehouse_id,
            quantity = order.quantity,
        )
    )]
    pub async fn transfer(&self, order: &TransferOrder) -> Result<TransferReceipt> {
        order.validate()?;

        let started = Instant::now();
        let correlation_id = CorrelationId::new();
        let (transfer_out, transfer_in) = order.legs(correlation_id);

        let result = if self.projector.store().atomic_batches() {
            self.commit_atomic(correlation_id, transfer_out, transfer_in)
                .await
        } else {
            self.commit_compensating(correlation_id, transfer_out, transfer_in)
                .await
        };

        let outcome = match &result {
            Ok(_) => "committed",
            Err(LedgerError::PartialTransferFailure { .. }) => "compensated",
            Err(_) => "rejected",
        };
        metrics::counter!("transfers_total", "outcome" => outcome).increment(1);
        metrics::histogram!("transfer_duration_seconds").record(started.elapsed().as_secs_f64());

        if result.is_ok() {
            tracing::info!(%correlation_id, "transfer committed");
        }
        result
    }

    async fn commit_atomic(
        &self,
        correlation_id: CorrelationId,
        transfer_out: Movement,
        transfer_in: Movement,
    ) -> Result<TransferReceipt> {
        let committed = self.projector.commit(vec![transfer_out, transfer_in]).await?;
        let mut legs = committed.movements.into_iter();
        match (legs.next(), legs.next()) {
            (Some(transfer_out), Some(transfer_in)) => Ok(TransferReceipt {
                correlation_id,
                transfer_out,
                transfer_in,
                balances: committed.balances,
            }),
            _ => Err(LedgerError::Persistence(format!(
                "transfer {correlation_id} committed without both legs"
            ))),
        }
    }

    async fn commit_compensating(
        &self,
        correlation_id: CorrelationId,
        transfer_out: Movement,
        transfer_in: Movement,
    ) -> Result<TransferReceipt> {
        let source = transfer_out.key();
        let outbound = self.projector.commit(vec![transfer_out]).await?;
        let (transfer_out, mut balances) = match outbound.movements.into_iter().next() {
            Some(leg) => (leg, outbound.balances),
            None => {
                return Err(LedgerError::Persistence(format!(
                    "transfer {correlation_id} outbound leg was not returned"
                )));
            }
        };

        let inbound_error = match self.projector.commit(vec![transfer_in]).await {
            Ok(inbound) => match inbound.movements.into_iter().next() {
                Some(transfer_in) => {
                    balances.extend(inbound.balances);
                    balances.sort_by_key(Balance::key);
                    return Ok(TransferReceipt {
                        correlation_id,
                        transfer_out,
                        transfer_in,
                        balances,
                    });
                }
                None => "inbound leg was not returned".to_string(),
            },
            Err(err) => err.to_string(),
        };

        tracing::warn!(
            %correlation_id,
            committed_leg = %transfer_out.id,
            reason = %inbound_error,
            "inbound leg failed, reversing outbound leg"
        );

        let reversal = Movement::new(
            source,
            MovementType::TransferIn,
            -transfer_out.delta,
            transfer_out.reason,
        )
        .with_reference(transfer_out.reference.clone())
        .with_notes(Some(format!("reverses {}", transfer_out.id)))
        .created_by(transfer_out.created_by.clone())
        .correlated(correlation_id);
        let reversal_id = reversal.id;

        let compensation_id = match self.projector.commit(vec![reversal]).await {
            Ok(_) => Some(reversal_id),
            Err(err) => {
                tracing::error!(
                    %correlation_id,
                    committed_leg = %transfer_out.id,
                    error = %err,
                    "reversal of outbound leg failed; source balance needs correction"
                );
                None
            }
        };

        Err(LedgerError::PartialTransferFailure {
            correlation_id,
            committed_leg: transfer_out.id,
            compensation_id,
            reason: inbound_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use domain::ValidationError;
    use movement_store::{BalanceKey, InMemoryLedgerStore, LedgerStoreExt, Reason};

    async fn stocked(
        qty: i64,
    ) -> (
        Arc<InMemoryLedgerStore>,
        TransferCoordinator<InMemoryLedgerStore>,
    ) {
        let store = Arc::new(InMemoryLedgerStore::new());
        let projector = BalanceProjector::new(Arc::clone(&store));
        projector
            .apply(Movement::new(
                BalanceKey::new("FAB-001", "Main"),
                MovementType::In,
                qty,
                Reason::ReceiptFromPurchase,
            ))
            .await
            .unwrap();
        (store, TransferCoordinator::new(projector))
    }

    #[tokio::test]
    async fn transfer_commits_both_legs() {
        let (store, coordinator) = stocked(70).await;
        let order = TransferOrder::new("FAB-001", "Main", "Branch", 20);

        let receipt = coordinator.transfer(&order).await.unwrap();

        assert_eq!(receipt.transfer_out.delta, -20);
        assert_eq!(receipt.transfer_in.delta, 20);
        assert_eq!(receipt.transfer_out.correlation_id, Some(receipt.correlation_id));
        assert_eq!(receipt.transfer_in.correlation_id, Some(receipt.correlation_id));
        assert_eq!(receipt.balances.len(), 2);

        let legs = store
            .movements_by_correlation(receipt.correlation_id)
            .await
            .unwrap();
        assert_eq!(legs.len(), 2);
        assert_eq!(store.total_stock(&"FAB-001".into()).await.unwrap(), 70);
    }

    #[tokio::test]
    async fn transfer_beyond_stock_leaves_no_leg() {
        let (store, coordinator) = stocked(10).await;
        let order = TransferOrder::new("FAB-001", "Main", "Branch", 20);

        let err = coordinator.transfer(&order).await.unwrap_err();

        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::InsufficientStock { available: 10, .. })
        ));
        assert_eq!(store.movement_count().await, 1);
        assert!(
            store
                .balance(&BalanceKey::new("FAB-001", "Branch"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn same_warehouse_is_rejected() {
        let (_, coordinator) = stocked(10).await;
        let order = TransferOrder::new("FAB-001", "Main", "Main", 5);

        let err = coordinator.transfer(&order).await.unwrap_err();

        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::SameWarehouseTransfer(_))
        ));
    }

    #[tokio::test]
    async fn opposite_transfers_do_not_deadlock() {
        let (_, coordinator) = stocked(1000).await;
        coordinator
            .transfer(&TransferOrder::new("FAB-001", "Main", "Branch", 500))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..40 {
            let coordinator = coordinator.clone();
            let order = if i % 2 == 0 {
                TransferOrder::new("FAB-001", "Main", "Branch", 5)
            } else {
                TransferOrder::new("FAB-001", "Branch", "Main", 5)
            };
            handles.push(tokio::spawn(async move { coordinator.transfer(&order).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let store = coordinator.projector.store();
        assert_eq!(store.total_stock(&"FAB-001".into()).await.unwrap(), 1000);
    }
}
