//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::ValidationError;
use ledger::LedgerError;
use movement_store::StoreError;
use projections::ProjectionError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Ledger operation error.
    Ledger(LedgerError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                serde_json::json!({ "error": msg, "code": "not_found" }),
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": msg, "code": "validation" }),
            ),
            ApiError::Ledger(err) => ledger_error_to_response(err),
        };

        (status, axum::Json(body)).into_response()
    }
}

fn ledger_error_to_response(err: LedgerError) -> (StatusCode, serde_json::Value) {
    let message = err.to_string();
    let (status, code) = match &err {
        LedgerError::Validation(ValidationError::InsufficientStock { .. }) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_stock")
        }
        LedgerError::Validation(_) | LedgerError::InvalidMovement(_) => {
            (StatusCode::BAD_REQUEST, "validation")
        }
        LedgerError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        LedgerError::ConcurrencyConflict { .. } => (StatusCode::CONFLICT, "concurrency_conflict"),
        LedgerError::DuplicateMovement(_) => (StatusCode::CONFLICT, "duplicate_movement"),
        LedgerError::PartialTransferFailure {
            correlation_id,
            committed_leg,
            compensation_id,
            ..
        } => {
            tracing::warn!(%correlation_id, %committed_leg, ?compensation_id, "partial transfer failure");
            let body = serde_json::json!({
                "error": message,
                "code": "partial_transfer_failure",
                "correlation_id": correlation_id,
                "committed_leg": committed_leg,
                "compensation_id": compensation_id,
            });
            return (StatusCode::BAD_GATEWAY, body);
        }
        LedgerError::Persistence(_) => {
            tracing::error!(error = %message, "persistence failure");
            (StatusCode::SERVICE_UNAVAILABLE, "persistence")
        }
        LedgerError::Timeout { .. } => (StatusCode::SERVICE_UNAVAILABLE, "timeout"),
    };

    let mut body = serde_json::json!({ "error": message, "code": code });
    if err.is_retryable() {
        body["retryable"] = serde_json::Value::Bool(true);
    }
    (status, body)
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl From<ProjectionError> for ApiError {
    fn from(err: ProjectionError) -> Self {
        ApiError::Ledger(err.into())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Ledger(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{BalanceKey, CorrelationId, MovementId};

    fn status_of(err: LedgerError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        let key = BalanceKey::new("FAB-001", "Main");
        assert_eq!(
            status_of(ValidationError::ZeroQuantity.into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(LedgerError::NotFound("item X".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(LedgerError::ConcurrencyConflict {
                key: key.clone(),
                reason: "deadlock".to_string()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(
                ValidationError::InsufficientStock {
                    key: key.clone(),
                    available: 30,
                    requested: 40
                }
                .into()
            ),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(
                ValidationError::QuantityTooLarge {
                    quantity: i64::MAX,
                    max: 1_000_000_000_000
                }
                .into()
            ),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(LedgerError::InvalidMovement(format!(
                "Stock overflow for {key}"
            ))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(LedgerError::PartialTransferFailure {
                correlation_id: CorrelationId::new(),
                committed_leg: MovementId::new(),
                compensation_id: Some(MovementId::new()),
                reason: "lock timeout".to_string(),
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(LedgerError::Persistence("pool closed".to_string())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
