use thiserror::Error;

use crate::{BalanceKey, MovementId};

/// Errors that can occur when interacting with the movement store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Lock or transaction contention on a balance row. Safe to retry.
    #[error("Concurrency conflict on balance {key}: {reason}")]
    ConcurrencyConflict { key: BalanceKey, reason: String },

    /// The commit would drive available stock below zero.
    #[error("Insufficient stock for {key}: available {available}, requested {requested}")]
    InsufficientStock {
        key: BalanceKey,
        available: i64,
        requested: i64,
    },

    /// Applying the change would overflow a stock counter.
    #[error("Stock overflow for {key}: {current} {op} {delta} is out of range")]
    StockOverflow {
        key: BalanceKey,
        current: i64,
        op: &'static str,
        delta: i64,
    },

    /// A reservation release would drive reserved stock below zero.
    #[error("Reserved stock underflow for {key}: reserved {reserved}, release {requested}")]
    ReservedUnderflow {
        key: BalanceKey,
        reserved: i64,
        requested: i64,
    },

    /// A movement with this id was already appended.
    #[error("Movement already appended: {0}")]
    DuplicateMovement(MovementId),

    /// The movement batch failed structural validation.
    #[error("Invalid movement: {0}")]
    InvalidMovement(String),

    /// The store was closed; it accepts no further writes.
    #[error("Ledger store is closed")]
    Closed,

    /// A stored row could not be mapped back into a ledger type.
    #[error("Invalid stored row: {0}")]
    InvalidRow(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true for errors caused by contention that a retry may clear.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::ConcurrencyConflict { .. })
    }
}

/// Result type for movement store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
