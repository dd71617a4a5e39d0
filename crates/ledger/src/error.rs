//! Ledger error types.

use std::time::Duration;

use common::{BalanceKey, CorrelationId, MovementId};
use domain::ValidationError;
use movement_store::StoreError;
use projections::ProjectionError;
use thiserror::Error;

/// Errors surfaced by ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The request can not succeed as submitted, including an issue the
    /// non-negative guard refuses.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Contention on a key outlasted every retry.
    #[error("Concurrency conflict on {key}: {reason}")]
    ConcurrencyConflict { key: BalanceKey, reason: String },

    #[error("Duplicate movement: {0}")]
    DuplicateMovement(MovementId),

    /// A built movement failed the store's own invariant checks.
    #[error("Invalid movement: {0}")]
    InvalidMovement(String),

    /// The inbound leg of a transfer failed after the outbound leg committed.
    ///
    /// `compensation_id` names the movement that returned the stock to the
    /// source warehouse; `None` means the reversal failed too and the source
    /// needs manual correction.
    #[error("Transfer {correlation_id} failed after leg {committed_leg} committed: {reason}")]
    PartialTransferFailure {
        correlation_id: CorrelationId,
        committed_leg: MovementId,
        compensation_id: Option<MovementId>,
        reason: String,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
}

impl LedgerError {
    /// Returns true when the same request may succeed if sent again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::ConcurrencyConflict { .. }
                | LedgerError::Persistence(_)
                | LedgerError::Timeout { .. }
        )
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConcurrencyConflict { key, reason } => {
                LedgerError::ConcurrencyConflict { key, reason }
            }
            StoreError::InsufficientStock {
                key,
                available,
                requested,
            } => LedgerError::Validation(ValidationError::InsufficientStock {
                key,
                available,
                requested,
            }),
            StoreError::ReservedUnderflow {
                key,
                reserved,
                requested,
            } => LedgerError::Validation(ValidationError::ReleaseExceedsReserved {
                key,
                reserved,
                requested,
            }),
            StoreError::DuplicateMovement(id) => LedgerError::DuplicateMovement(id),
            StoreError::InvalidMovement(msg) => LedgerError::InvalidMovement(msg),
            err @ StoreError::StockOverflow { .. } => LedgerError::InvalidMovement(err.to_string()),
            other => LedgerError::Persistence(other.to_string()),
        }
    }
}

impl From<ProjectionError> for LedgerError {
    fn from(err: ProjectionError) -> Self {
        match err {
            ProjectionError::Store(e) => e.into(),
            ProjectionError::Timeout { operation, timeout } => {
                LedgerError::Timeout { operation, timeout }
            }
            ProjectionError::ItemNotFound(id) => LedgerError::NotFound(format!("item {id}")),
            ProjectionError::Projection(msg) => LedgerError::Persistence(msg),
        }
    }
}

/// Convenience type alias for ledger results.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_taxonomy() {
        let key = BalanceKey::new("FAB-001", "Main");

        let err: LedgerError = StoreError::InsufficientStock {
            key: key.clone(),
            available: 30,
            requested: 40,
        }
        .into();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::InsufficientStock { available: 30, .. })
        ));
        assert!(!err.is_retryable());

        let err: LedgerError = StoreError::StockOverflow {
            key: key.clone(),
            current: i64::MAX,
            op: "+",
            delta: 1,
        }
        .into();
        assert!(matches!(err, LedgerError::InvalidMovement(_)));

        let err: LedgerError = StoreError::ReservedUnderflow {
            key: key.clone(),
            reserved: 2,
            requested: 5,
        }
        .into();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::ReleaseExceedsReserved { .. })
        ));

        let err: LedgerError = ProjectionError::Store(StoreError::ConcurrencyConflict {
            key,
            reason: "lock timeout".to_string(),
        })
        .into();
        assert!(err.is_retryable());
    }

    #[test]
    fn timeouts_are_retryable() {
        let err: LedgerError = ProjectionError::Timeout {
            operation: "commit",
            timeout: Duration::from_secs(5),
        }
        .into();
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "commit timed out after 5s");
    }
}
