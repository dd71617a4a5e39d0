//! Drift audit and rebuild endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use common::{BalanceKey, ItemId, WarehouseId};
use domain::Catalog;
use movement_store::LedgerStore;
use projections::{AuditSummary, DriftReport};
use serde::Deserialize;

use crate::error::ApiError;
use crate::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct RebuildParams {
    /// Overwrite the stored balance when it drifted.
    #[serde(default)]
    pub repair: bool,
}

/// GET /audit/drift: replay the whole ledger and list drifted balances.
#[tracing::instrument(skip(state))]
pub async fn drift<S: LedgerStore + 'static, C: Catalog + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
) -> Result<Json<AuditSummary>, ApiError> {
    Ok(Json(state.ledger.projector().verify_all().await?))
}

/// POST /items/{id}/warehouses/{warehouse_id}/rebuild?repair=: replay one key.
#[tracing::instrument(skip(state))]
pub async fn rebuild<S: LedgerStore + 'static, C: Catalog + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Path((item_id, warehouse_id)): Path<(String, String)>,
    Query(params): Query<RebuildParams>,
) -> Result<Json<DriftReport>, ApiError> {
    let key = BalanceKey::new(ItemId::new(item_id), WarehouseId::new(warehouse_id));
    state.require_key_refs(&key.item_id, &key.warehouse_id).await?;

    let projector = state.ledger.projector();
    let report = if params.repair {
        projector.repair(&key).await?
    } else {
        projector.verify(&key).await?
    };
    Ok(Json(report))
}
