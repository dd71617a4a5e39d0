//! Movement submission and lookup endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::{CorrelationId, MovementId};
use domain::{Catalog, MovementRequest};
use ledger::AppendOutcome;
use movement_store::{LedgerStore, Movement};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiError;
use crate::routes::AppState;

/// Header naming the operator or system submitting a movement.
pub const ACTOR_HEADER: &str = "x-user-id";

const DEFAULT_ACTOR: &str = "system";

/// POST /movements: validate and append a movement or a transfer.
///
/// A body with `from_warehouse_id` and no `type` is read as a transfer.
#[tracing::instrument(skip(state, headers, body))]
pub async fn create<S: LedgerStore + 'static, C: Catalog + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<AppendOutcome>), ApiError> {
    let request = parse_request(body)?;
    let actor = actor(&headers);

    let outcome = state.ledger.append(request, actor).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /movements/{id}: one movement by id.
#[tracing::instrument(skip(state))]
pub async fn get<S: LedgerStore + 'static, C: Catalog + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(id): Path<String>,
) -> Result<Json<Movement>, ApiError> {
    let id = MovementId::from_uuid(parse_uuid(&id, "movement id")?);
    Ok(Json(state.ledger.movement(id).await?))
}

/// GET /transfers/{correlation_id}: the legs of one transfer.
#[tracing::instrument(skip(state))]
pub async fn transfer_legs<S: LedgerStore + 'static, C: Catalog + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(correlation_id): Path<String>,
) -> Result<Json<Vec<Movement>>, ApiError> {
    let correlation_id = CorrelationId::from_uuid(parse_uuid(&correlation_id, "correlation id")?);
    Ok(Json(state.ledger.transfer_legs(correlation_id).await?))
}

fn parse_request(mut body: Value) -> Result<MovementRequest, ApiError> {
    if let Some(fields) = body.as_object_mut()
        && !fields.contains_key("type")
        && fields.contains_key("from_warehouse_id")
    {
        fields.insert("type".to_string(), Value::from("transfer"));
    }
    serde_json::from_value(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid movement request: {e}")))
}

fn actor(headers: &HeaderMap) -> &str {
    headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_ACTOR)
}

pub(crate) fn parse_uuid(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|e| ApiError::BadRequest(format!("invalid {what}: {e}")))
}
