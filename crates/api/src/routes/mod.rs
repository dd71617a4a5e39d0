//! HTTP route handlers and the state they share.

pub mod audit;
pub mod balances;
pub mod feed;
pub mod health;
pub mod metrics;
pub mod movements;
pub mod reservations;

use common::{ItemId, WarehouseId};
use domain::Catalog;
use ledger::MovementLedger;
use movement_store::LedgerStore;
use projections::StockQueries;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: LedgerStore, C: Catalog> {
    pub ledger: MovementLedger<S, C>,
    pub queries: StockQueries<S, C>,
}

impl<S: LedgerStore, C: Catalog> AppState<S, C> {
    /// Resolves the item and warehouse named in a request path.
    pub(crate) async fn require_key_refs(
        &self,
        item_id: &ItemId,
        warehouse_id: &WarehouseId,
    ) -> Result<(), ApiError> {
        let catalog = self.ledger.catalog();
        if catalog.item(item_id).await.is_none() {
            return Err(ApiError::NotFound(format!("item {item_id}")));
        }
        if catalog.warehouse(warehouse_id).await.is_none() {
            return Err(ApiError::NotFound(format!("warehouse {warehouse_id}")));
        }
        Ok(())
    }
}
