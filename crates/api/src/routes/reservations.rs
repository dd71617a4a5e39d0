//! Reservation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use common::{BalanceKey, ItemId, WarehouseId};
use domain::Catalog;
use movement_store::{Balance, LedgerStore};
use serde::Deserialize;

use crate::error::ApiError;
use crate::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct ReservationRequest {
    pub item_id: ItemId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
}

impl ReservationRequest {
    fn key(&self) -> BalanceKey {
        BalanceKey::new(self.item_id.clone(), self.warehouse_id.clone())
    }
}

/// POST /reservations: earmark stock for a pending order.
#[tracing::instrument(skip(state))]
pub async fn reserve<S: LedgerStore + 'static, C: Catalog + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Json(req): Json<ReservationRequest>,
) -> Result<Json<Balance>, ApiError> {
    Ok(Json(state.ledger.reserve(&req.key(), req.quantity).await?))
}

/// POST /reservations/release: return reserved stock to available.
#[tracing::instrument(skip(state))]
pub async fn release<S: LedgerStore + 'static, C: Catalog + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Json(req): Json<ReservationRequest>,
) -> Result<Json<Balance>, ApiError> {
    Ok(Json(state.ledger.release(&req.key(), req.quantity).await?))
}
