//! Balance and history read endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use common::{BalanceKey, CorrelationId, ItemId, WarehouseId};
use domain::{Catalog, ItemKind, StockStatus};
use movement_store::{Balance, HistoryQuery, LedgerStore, MovementType, Page, Reason};
use projections::{ItemDetail, ItemTotals, MovementView, TotalsFilter, WarehouseBalance};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::routes::AppState;
use crate::routes::movements::parse_uuid;

#[derive(Debug, Deserialize)]
pub struct TotalsParams {
    pub search: Option<String>,
    pub kind: Option<ItemKind>,
}

/// Filters and cursor for a history page.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub warehouse_id: Option<String>,
    /// Comma-separated movement types, e.g. `in,transfer_in`.
    #[serde(rename = "type")]
    pub movement_types: Option<String>,
    /// Reason code, e.g. `DIRECT_SALE`.
    pub reason: Option<String>,
    pub correlation_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub cursor: Option<i64>,
    pub limit: Option<usize>,
}

impl HistoryParams {
    fn into_query(self, item_id: ItemId) -> Result<HistoryQuery, ApiError> {
        let mut query = HistoryQuery::for_item(item_id);
        if let Some(warehouse_id) = self.warehouse_id.filter(|w| !w.is_empty()) {
            query = query.warehouse(warehouse_id);
        }
        if let Some(raw) = self.movement_types.filter(|t| !t.is_empty()) {
            let types = raw
                .split(',')
                .map(|t| t.trim().parse::<MovementType>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(ApiError::BadRequest)?;
            query = query.movement_types(types);
        }
        if let Some(raw) = self.reason.filter(|r| !r.is_empty()) {
            let reason = raw.trim().parse::<Reason>().map_err(ApiError::BadRequest)?;
            query = query.reason(reason);
        }
        if let Some(raw) = self.correlation_id.filter(|c| !c.is_empty()) {
            let id = parse_uuid(raw.trim(), "correlation id")?;
            query = query.correlation_id(CorrelationId::from_uuid(id));
        }
        if let Some(from) = self.from {
            query = query.from_timestamp(from);
        }
        if let Some(to) = self.to {
            query = query.to_timestamp(to);
        }
        if let Some(cursor) = self.cursor {
            query = query.cursor(cursor);
        }
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        Ok(query)
    }
}

/// One key's balance with its derived figures.
#[derive(Debug, Serialize)]
pub struct KeyBalanceResponse {
    #[serde(flatten)]
    pub balance: Balance,
    pub available: i64,
    pub status: StockStatus,
    pub status_label: &'static str,
}

/// GET /balances?search=&kind=: per-item totals across warehouses.
#[tracing::instrument(skip(state))]
pub async fn list<S: LedgerStore + 'static, C: Catalog + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Query(params): Query<TotalsParams>,
) -> Result<Json<Vec<ItemTotals>>, ApiError> {
    let filter = TotalsFilter {
        search: params.search,
        kind: params.kind,
    };
    Ok(Json(state.queries.list_item_totals(&filter).await?))
}

/// GET /items/{id}: balances, totals and the first history page of an item.
#[tracing::instrument(skip(state))]
pub async fn item_detail<S: LedgerStore + 'static, C: Catalog + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(item_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<ItemDetail>, ApiError> {
    let query = params.into_query(ItemId::new(item_id))?;
    Ok(Json(state.queries.item_detail(query).await?))
}

/// GET /items/{id}/balances: per-warehouse balance rows of one item.
#[tracing::instrument(skip(state))]
pub async fn item_balances<S: LedgerStore + 'static, C: Catalog + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(item_id): Path<String>,
) -> Result<Json<Vec<WarehouseBalance>>, ApiError> {
    let balances = state.queries.item_balances(&ItemId::new(item_id)).await?;
    Ok(Json(balances))
}

/// GET /items/{id}/movements: paginated history, newest first.
#[tracing::instrument(skip(state))]
pub async fn item_movements<S: LedgerStore + 'static, C: Catalog + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(item_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Page<MovementView>>, ApiError> {
    let query = params.into_query(ItemId::new(item_id))?;
    Ok(Json(state.queries.history(query).await?))
}

/// GET /items/{id}/warehouses/{warehouse_id}/balance: one key's balance.
#[tracing::instrument(skip(state))]
pub async fn key_balance<S: LedgerStore + 'static, C: Catalog + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Path((item_id, warehouse_id)): Path<(String, String)>,
) -> Result<Json<KeyBalanceResponse>, ApiError> {
    let key = BalanceKey::new(ItemId::new(item_id), WarehouseId::new(warehouse_id));
    state.require_key_refs(&key.item_id, &key.warehouse_id).await?;

    let threshold = state
        .ledger
        .catalog()
        .item(&key.item_id)
        .await
        .map_or(0, |item| item.low_stock_threshold);
    let balance = state.ledger.balance(&key).await?;
    let available = balance.available();
    let status = StockStatus::derive(available, threshold);

    Ok(Json(KeyBalanceResponse {
        balance,
        available,
        status,
        status_label: status.label(),
    }))
}
