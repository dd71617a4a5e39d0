//! Read-side aggregation over balance rows and movement history.
//!
//! Every query reads committed rows only. Nothing here takes a key lock or
//! writes a balance.

use std::collections::BTreeMap;
use std::sync::Arc;

use common::ItemId;
use domain::{
    Catalog, ItemKind, StockStatus, StockableItem, movement_type_label, reason_label,
};
use movement_store::{Balance, HistoryQuery, LedgerStore, Movement, Page};
use serde::Serialize;

use crate::{ProjectionError, Result};

/// Filter for the item totals listing.
#[derive(Debug, Clone, Default)]
pub struct TotalsFilter {
    /// Case-insensitive match on name or SKU.
    pub search: Option<String>,
    pub kind: Option<ItemKind>,
}

/// Stock of one item summed over every warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemTotals {
    #[serde(flatten)]
    pub item: StockableItem,
    pub current_stock: i64,
    pub reserved_stock: i64,
    pub available: i64,
    pub status: StockStatus,
    pub warehouse_count: usize,
}

impl ItemTotals {
    fn from_balances(item: StockableItem, balances: &[Balance]) -> Self {
        // Display figures: clamp at the i64 bounds rather than fail the read.
        let current_stock = balances
            .iter()
            .fold(0i64, |total, b| total.saturating_add(b.current_stock));
        let reserved_stock = balances
            .iter()
            .fold(0i64, |total, b| total.saturating_add(b.reserved_stock));
        let available = current_stock.saturating_sub(reserved_stock);
        Self {
            status: StockStatus::derive(available, item.low_stock_threshold),
            item,
            current_stock,
            reserved_stock,
            available,
            warehouse_count: balances.len(),
        }
    }
}

/// One warehouse's balance with its derived figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarehouseBalance {
    #[serde(flatten)]
    pub balance: Balance,
    pub warehouse_name: Option<String>,
    pub available: i64,
    pub status: StockStatus,
}

/// A movement with display labels attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementView {
    #[serde(flatten)]
    pub movement: Movement,
    pub type_label: &'static str,
    pub reason_label: &'static str,
}

impl From<Movement> for MovementView {
    fn from(movement: Movement) -> Self {
        Self {
            type_label: movement_type_label(movement.movement_type),
            reason_label: reason_label(movement.reason),
            movement,
        }
    }
}

/// Everything the detail screen of one item shows.
#[derive(Debug, Clone, Serialize)]
pub struct ItemDetail {
    pub totals: ItemTotals,
    pub balances: Vec<WarehouseBalance>,
    pub history: Page<MovementView>,
}

/// Aggregation and query layer.
pub struct StockQueries<S: LedgerStore, C: Catalog> {
    store: Arc<S>,
    catalog: Arc<C>,
}

impl<S: LedgerStore, C: Catalog> Clone for StockQueries<S, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            catalog: Arc::clone(&self.catalog),
        }
    }
}

impl<S: LedgerStore, C: Catalog> StockQueries<S, C> {
    pub fn new(store: Arc<S>, catalog: Arc<C>) -> Self {
        Self { store, catalog }
    }

    /// Per-item totals across warehouses, for catalog items matching the filter.
    ///
    /// Items without any balance are listed with zero stock.
    #[tracing::instrument(skip(self))]
    pub async fn list_item_totals(&self, filter: &TotalsFilter) -> Result<Vec<ItemTotals>> {
        let mut by_item: BTreeMap<ItemId, Vec<Balance>> = BTreeMap::new();
        for balance in self.store.all_balances().await? {
            by_item
                .entry(balance.item_id.clone())
                .or_default()
                .push(balance);
        }

        let search = filter.search.as_deref().unwrap_or_default();
        let totals = self
            .catalog
            .items()
            .await
            .into_iter()
            .filter(|item| filter.kind.is_none_or(|kind| item.kind == kind))
            .filter(|item| item.matches_search(search))
            .map(|item| {
                let balances = by_item.get(&item.id).map(Vec::as_slice).unwrap_or_default();
                ItemTotals::from_balances(item, balances)
            })
            .collect();

        Ok(totals)
    }

    /// Every warehouse balance of one item, ordered by warehouse.
    #[tracing::instrument(skip(self), fields(item_id = %item_id))]
    pub async fn item_balances(&self, item_id: &ItemId) -> Result<Vec<WarehouseBalance>> {
        let item = self.require_item(item_id).await?;
        self.warehouse_balances(&item).await
    }

    /// Balances, totals and one page of history for one item.
    #[tracing::instrument(skip(self, query), fields(item_id = %query.item_id))]
    pub async fn item_detail(&self, query: HistoryQuery) -> Result<ItemDetail> {
        let item = self.require_item(&query.item_id).await?;
        let balances = self.warehouse_balances(&item).await?;
        let history = self.store.history(query).await?.map(MovementView::from);

        let raw: Vec<Balance> = balances.iter().map(|b| b.balance.clone()).collect();
        Ok(ItemDetail {
            totals: ItemTotals::from_balances(item, &raw),
            balances,
            history,
        })
    }

    /// One page of an item's history, newest first.
    #[tracing::instrument(skip(self, query), fields(item_id = %query.item_id))]
    pub async fn history(&self, query: HistoryQuery) -> Result<Page<MovementView>> {
        self.require_item(&query.item_id).await?;
        Ok(self.store.history(query).await?.map(MovementView::from))
    }

    async fn require_item(&self, item_id: &ItemId) -> Result<StockableItem> {
        self.catalog
            .item(item_id)
            .await
            .ok_or_else(|| ProjectionError::ItemNotFound(item_id.clone()))
    }

    async fn warehouse_balances(&self, item: &StockableItem) -> Result<Vec<WarehouseBalance>> {
        let mut rows = Vec::new();
        for balance in self.store.balances_for_item(&item.id).await? {
            let warehouse_name = self
                .catalog
                .warehouse(&balance.warehouse_id)
                .await
                .map(|w| w.name);
            let available = balance.available();
            rows.push(WarehouseBalance {
                status: StockStatus::derive(available, item.low_stock_threshold),
                available,
                warehouse_name,
                balance,
            });
        }
        Ok(rows)
    }
}
