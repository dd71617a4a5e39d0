//! Projection error types.

use std::time::Duration;

use common::ItemId;
use movement_store::StoreError;
use thiserror::Error;

/// Errors that can occur in the projector and read-side queries.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// The ledger store rejected or failed the operation.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The operation did not finish within the commit timeout.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// The item is not in the catalog.
    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    /// A projection-specific error.
    #[error("Projection error: {0}")]
    Projection(String),
}

impl ProjectionError {
    /// True for contention and timeouts; a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProjectionError::Store(e) => e.is_retryable(),
            ProjectionError::Timeout { .. } => true,
            _ => false,
        }
    }
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
