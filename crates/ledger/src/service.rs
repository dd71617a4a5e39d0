//! The movement ledger service.

use std::sync::Arc;

use common::{BalanceKey, CorrelationId, MovementId};
use domain::{
    Catalog, MovementPlan, MovementRequest, TransferOrder, ValidationError,
    validate_key_references, validate_references,
};
use movement_store::{
    Balance, Committed, HistoryQuery, LedgerStore, LedgerStoreExt, MAX_QUANTITY, Movement, Page,
};
use projections::{BalanceProjector, ChangeFeed, StockChange};
use serde::Serialize;

use crate::transfer::{TransferCoordinator, TransferReceipt};
use crate::{LedgerError, Result};

/// What an append produced: one movement, or both legs of a transfer.
#[derive(Debug, Clone, Serialize)]
pub struct AppendOutcome {
    pub movements: Vec<Movement>,
    pub balances: Vec<Balance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
}

impl From<Committed> for AppendOutcome {
    fn from(committed: Committed) -> Self {
        Self {
            movements: committed.movements,
            balances: committed.balances,
            correlation_id: None,
        }
    }
}

impl From<TransferReceipt> for AppendOutcome {
    fn from(receipt: TransferReceipt) -> Self {
        Self {
            correlation_id: Some(receipt.correlation_id),
            movements: vec![receipt.transfer_out, receipt.transfer_in],
            balances: receipt.balances,
        }
    }
}

/// Single entry point for stock changes.
///
/// Validates requests, commits them through the balance projector and
/// publishes what was committed. Reads of immutable history go straight to
/// the store.
pub struct MovementLedger<S: LedgerStore, C: Catalog> {
    projector: BalanceProjector<S>,
    transfers: TransferCoordinator<S>,
    catalog: Arc<C>,
    feed: ChangeFeed,
}

impl<S: LedgerStore, C: Catalog> Clone for MovementLedger<S, C> {
    fn clone(&self) -> Self {
        Self {
            projector: self.projector.clone(),
            transfers: self.transfers.clone(),
            catalog: Arc::clone(&self.catalog),
            feed: self.feed.clone(),
        }
    }
}

impl<S: LedgerStore, C: Catalog> MovementLedger<S, C> {
    pub fn new(projector: BalanceProjector<S>, catalog: Arc<C>, feed: ChangeFeed) -> Self {
        Self {
            transfers: TransferCoordinator::new(projector.clone()),
            projector,
            catalog,
            feed,
        }
    }

    pub fn projector(&self) -> &BalanceProjector<S> {
        &self.projector
    }

    pub fn catalog(&self) -> &Arc<C> {
        &self.catalog
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Validates and commits a movement request on behalf of `actor`.
    #[tracing::instrument(skip(self, request), fields(kind = request.kind(), item_id = %request.item_id()))]
    pub async fn append(&self, request: MovementRequest, actor: &str) -> Result<AppendOutcome> {
        validate_references(self.catalog.as_ref(), &request).await?;

        match request.into_plan(actor)? {
            MovementPlan::Single(movement) => {
                let committed = self.projector.commit(vec![movement]).await?;
                self.feed.publish_committed(&committed);
                Ok(committed.into())
            }
            MovementPlan::Transfer(order) => self.transfer(&order).await,
        }
    }

    /// Runs a transfer order that already passed request validation.
    #[tracing::instrument(skip(self, order), fields(item_id = %order.item_id))]
    pub async fn transfer(&self, order: &TransferOrder) -> Result<AppendOutcome> {
        validate_key_references(
            self.catalog.as_ref(),
            &order.item_id,
            &[&order.from_warehouse_id, &order.to_warehouse_id],
        )
        .await?;

        match self.transfers.transfer(order).await {
            Ok(receipt) => {
                let outcome = AppendOutcome::from(receipt);
                self.feed.publish_committed(&Committed {
                    movements: outcome.movements.clone(),
                    balances: outcome.balances.clone(),
                });
                Ok(outcome)
            }
            Err(err) => {
                if let LedgerError::PartialTransferFailure { correlation_id, .. } = &err {
                    self.publish_stranded(*correlation_id, order.source()).await;
                }
                Err(err)
            }
        }
    }

    /// Publishes whatever a failed non-atomic transfer left in the ledger.
    async fn publish_stranded(&self, correlation_id: CorrelationId, source: BalanceKey) {
        let store = self.projector.store();
        match store.movements_by_correlation(correlation_id).await {
            Ok(movements) => {
                for movement in movements {
                    self.feed.publish(StockChange::Movement(movement));
                }
            }
            Err(err) => tracing::warn!(%correlation_id, error = %err, "could not read transfer legs"),
        }
        if let Ok(Some(balance)) = store.balance(&source).await {
            self.feed.publish_balance(&balance);
        }
    }

    /// One page of an item's movement history, newest first.
    #[tracing::instrument(skip(self, query), fields(item_id = %query.item_id))]
    pub async fn history(&self, query: HistoryQuery) -> Result<Page<Movement>> {
        if self.catalog.item(&query.item_id).await.is_none() {
            return Err(LedgerError::NotFound(format!("item {}", query.item_id)));
        }
        Ok(self.projector.store().history(query).await?)
    }

    pub async fn movement(&self, id: MovementId) -> Result<Movement> {
        self.projector
            .store()
            .movement(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("movement {id}")))
    }

    /// Both legs of a transfer, plus a reversal if one was needed.
    pub async fn transfer_legs(&self, correlation_id: CorrelationId) -> Result<Vec<Movement>> {
        let legs = self
            .projector
            .store()
            .movements_by_correlation(correlation_id)
            .await?;
        if legs.is_empty() {
            return Err(LedgerError::NotFound(format!("transfer {correlation_id}")));
        }
        Ok(legs)
    }

    /// Current balance of a key; zero before its first movement.
    pub async fn balance(&self, key: &BalanceKey) -> Result<Balance> {
        validate_key_references(self.catalog.as_ref(), &key.item_id, &[&key.warehouse_id]).await?;
        Ok(self.projector.store().balance_or_empty(key).await?)
    }

    /// Earmarks `quantity` units at a key for a pending order.
    #[tracing::instrument(skip(self), fields(key = %key))]
    pub async fn reserve(&self, key: &BalanceKey, quantity: i64) -> Result<Balance> {
        self.change_reservation(key, quantity, "reserve").await
    }

    /// Returns `quantity` previously reserved units to available stock.
    #[tracing::instrument(skip(self), fields(key = %key))]
    pub async fn release(&self, key: &BalanceKey, quantity: i64) -> Result<Balance> {
        self.change_reservation(key, quantity, "release").await
    }

    async fn change_reservation(
        &self,
        key: &BalanceKey,
        quantity: i64,
        action: &'static str,
    ) -> Result<Balance> {
        if quantity <= 0 {
            return Err(ValidationError::NonPositiveQuantity {
                movement_type: action,
                quantity,
            }
            .into());
        }
        if quantity > MAX_QUANTITY {
            return Err(ValidationError::QuantityTooLarge {
                quantity,
                max: MAX_QUANTITY,
            }
            .into());
        }
        validate_key_references(self.catalog.as_ref(), &key.item_id, &[&key.warehouse_id]).await?;

        let delta = if action == "release" { -quantity } else { quantity };
        let balance = self.projector.adjust_reserved(key, delta).await?;

        metrics::counter!("reservations_total", "action" => action).increment(1);
        self.feed.publish_balance(&balance);
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{InMemoryCatalog, ItemKind, StockableItem, Warehouse};
    use movement_store::{InMemoryLedgerStore, MovementType, Reason};
    use projections::FeedEvent;

    async fn ledger() -> MovementLedger<InMemoryLedgerStore, InMemoryCatalog> {
        let catalog = InMemoryCatalog::new();
        catalog
            .add_item(StockableItem {
                id: "FAB-001".into(),
                sku: "FAB-COT-WHT".to_string(),
                name: "Cotton fabric, white".to_string(),
                unit: "m".to_string(),
                kind: ItemKind::Material,
                low_stock_threshold: 10,
            })
            .await;
        for id in ["Main", "Branch"] {
            catalog
                .add_warehouse(Warehouse {
                    id: id.into(),
                    name: id.to_string(),
                })
                .await;
        }
        let projector = BalanceProjector::new(Arc::new(InMemoryLedgerStore::new()));
        MovementLedger::new(projector, Arc::new(catalog), ChangeFeed::default())
    }

    fn receive(qty: i64) -> MovementRequest {
        MovementRequest::In {
            item_id: "FAB-001".into(),
            warehouse_id: "Main".into(),
            quantity: qty,
            reason: Reason::ReceiptFromPurchase,
            reference: Some("PO-1001".to_string()),
            notes: None,
        }
    }

    #[tokio::test]
    async fn append_commits_and_publishes() {
        let ledger = ledger().await;
        let mut subscription = ledger.feed().subscribe(None);

        let outcome = ledger.append(receive(100), "alice").await.unwrap();

        assert_eq!(outcome.movements.len(), 1);
        assert_eq!(outcome.movements[0].created_by, "alice");
        assert_eq!(outcome.balances[0].current_stock, 100);
        assert!(outcome.correlation_id.is_none());

        let Some(FeedEvent::Change(StockChange::Movement(movement))) = subscription.next().await
        else {
            panic!("expected a movement event");
        };
        assert_eq!(movement.id, outcome.movements[0].id);
        assert!(matches!(
            subscription.next().await,
            Some(FeedEvent::Change(StockChange::Balance { .. }))
        ));
    }

    #[tokio::test]
    async fn mismatched_reason_changes_nothing() {
        let ledger = ledger().await;
        let request = MovementRequest::Out {
            item_id: "FAB-001".into(),
            warehouse_id: "Main".into(),
            quantity: 5,
            reason: Reason::ReceiptFromPurchase,
            reference: None,
            notes: None,
        };

        let err = ledger.append(request, "alice").await.unwrap_err();

        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::ReasonNotAllowed { .. })
        ));
        let key = BalanceKey::new("FAB-001", "Main");
        assert!(ledger.projector().store().balance(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_warehouse_is_rejected() {
        let ledger = ledger().await;
        let request = MovementRequest::In {
            item_id: "FAB-001".into(),
            warehouse_id: "Nowhere".into(),
            quantity: 5,
            reason: Reason::ReceiptFromPurchase,
            reference: None,
            notes: None,
        };

        let err = ledger.append(request, "alice").await.unwrap_err();

        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::UnknownWarehouse(_))
        ));
    }

    #[tokio::test]
    async fn transfer_request_returns_both_legs() {
        let ledger = ledger().await;
        ledger.append(receive(70), "alice").await.unwrap();

        let outcome = ledger
            .append(
                MovementRequest::Transfer {
                    item_id: "FAB-001".into(),
                    from_warehouse_id: "Main".into(),
                    to_warehouse_id: "Branch".into(),
                    quantity: 20,
                    reason: Reason::InternalTransfer,
                    reference: None,
                    notes: Some("restock branch".to_string()),
                },
                "bob",
            )
            .await
            .unwrap();

        let correlation_id = outcome.correlation_id.unwrap();
        assert_eq!(outcome.movements[0].movement_type, MovementType::TransferOut);
        assert_eq!(outcome.movements[1].movement_type, MovementType::TransferIn);
        assert_eq!(ledger.transfer_legs(correlation_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn reserve_and_release() {
        let ledger = ledger().await;
        ledger.append(receive(50), "alice").await.unwrap();
        let key = BalanceKey::new("FAB-001", "Main");

        let reserved = ledger.reserve(&key, 20).await.unwrap();
        assert_eq!(reserved.reserved_stock, 20);
        assert_eq!(reserved.available(), 30);

        let released = ledger.release(&key, 5).await.unwrap();
        assert_eq!(released.reserved_stock, 15);

        let err = ledger.release(&key, 100).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::ReleaseExceedsReserved { .. })
        ));

        let err = ledger.reserve(&key, 0).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::NonPositiveQuantity { .. })
        ));
    }

    #[tokio::test]
    async fn history_of_unknown_item_is_not_found() {
        let ledger = ledger().await;
        let err = ledger
            .history(HistoryQuery::for_item("NOPE"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }
}
