use std::collections::HashSet;
use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{
    Balance, BalanceKey, CorrelationId, HistoryQuery, ItemId, Movement, MovementId, Page, Result,
    StoreError,
};

/// Options for committing movements to the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitOptions {
    /// When false, a commit that would take `current_stock` below zero is
    /// rejected as a whole with `InsufficientStock`.
    pub allow_negative_stock: bool,
}

impl CommitOptions {
    /// Creates options with the non-negative stock guard enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options that let stock go negative (backorders).
    pub fn allow_negative() -> Self {
        Self {
            allow_negative_stock: true,
        }
    }
}

/// Movements as they were appended, with the balances they produced.
#[derive(Debug, Clone)]
pub struct Committed {
    /// The movements with their assigned `sequence` and `created_at`.
    pub movements: Vec<Movement>,

    /// One balance per distinct key touched, in key order.
    pub balances: Vec<Balance>,
}

impl Committed {
    /// Returns the resulting balance for a key touched by the commit.
    pub fn balance_for(&self, key: &BalanceKey) -> Option<&Balance> {
        self.balances.iter().find(|b| &b.key() == key)
    }
}

/// A stream of movements.
pub type MovementStream = Pin<Box<dyn Stream<Item = Result<Movement>> + Send>>;

/// Core trait for movement ledger storage.
///
/// A store owns both the append-only movement log and the balance rows
/// derived from it. Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Appends movements and applies their deltas to the balances of their
    /// keys in one transaction.
    ///
    /// Keys are locked in ascending `BalanceKey` order. Either every movement
    /// and balance change becomes visible, or none does.
    async fn commit(&self, movements: Vec<Movement>, options: CommitOptions) -> Result<Committed>;

    /// Adds `delta` to the reserved stock of a key, creating the balance if needed.
    async fn adjust_reserved(
        &self,
        key: &BalanceKey,
        delta: i64,
        options: CommitOptions,
    ) -> Result<Balance>;

    /// Replays a key's movements under its lock and overwrites the stored
    /// balance with the result. Reserved stock is kept as stored.
    ///
    /// A key with no movements and no stored balance is left absent.
    async fn rebuild_balance(&self, key: &BalanceKey) -> Result<Balance>;

    /// Overwrites the stored balance of a key without replaying.
    ///
    /// Administrative path for imports and fault injection; business writes
    /// go through `commit` and `adjust_reserved`.
    async fn restore_balance(&self, balance: Balance) -> Result<()>;

    /// Gets the balance of a key. Returns None before its first movement.
    async fn balance(&self, key: &BalanceKey) -> Result<Option<Balance>>;

    /// Gets every balance of an item, ordered by warehouse.
    async fn balances_for_item(&self, item_id: &ItemId) -> Result<Vec<Balance>>;

    /// Gets every balance in the store, in key order.
    async fn all_balances(&self) -> Result<Vec<Balance>>;

    /// Reads one page of an item's movement history, newest first.
    async fn history(&self, query: HistoryQuery) -> Result<Page<Movement>>;

    /// Retrieves every movement of a key in append order (oldest first).
    async fn movements_for_key(&self, key: &BalanceKey) -> Result<Vec<Movement>>;

    /// Retrieves the movements sharing a correlation id, in append order.
    async fn movements_by_correlation(
        &self,
        correlation_id: CorrelationId,
    ) -> Result<Vec<Movement>>;

    /// Retrieves a single movement.
    async fn movement(&self, id: MovementId) -> Result<Option<Movement>>;

    /// Streams every movement in append order.
    async fn stream_all(&self) -> Result<MovementStream>;

    /// Reports whether a multi-key commit is a single atomic transaction.
    fn atomic_batches(&self) -> bool {
        true
    }

    /// Releases the store's resources once the owner is done with it.
    ///
    /// Writes issued after `close` fail with `StoreError::Closed`.
    async fn close(&self) {}
}

/// Extension trait providing convenience methods for ledger stores.
#[async_trait]
pub trait LedgerStoreExt: LedgerStore {
    /// Commits a single movement.
    async fn commit_one(&self, movement: Movement, options: CommitOptions) -> Result<Committed> {
        self.commit(vec![movement], options).await
    }

    /// Gets the balance of a key, or the zero balance if it has no movements.
    async fn balance_or_empty(&self, key: &BalanceKey) -> Result<Balance> {
        Ok(self
            .balance(key)
            .await?
            .unwrap_or_else(|| Balance::empty(key.clone())))
    }

    /// Sums current stock of an item over every warehouse.
    async fn total_stock(&self, item_id: &ItemId) -> Result<i64> {
        self.balances_for_item(item_id)
            .await?
            .iter()
            .try_fold(0i64, |total, b| {
                total
                    .checked_add(b.current_stock)
                    .ok_or_else(|| StoreError::StockOverflow {
                        key: b.key(),
                        current: total,
                        op: "+",
                        delta: b.current_stock,
                    })
            })
    }
}

// Blanket implementation for all LedgerStore implementations
impl<T: LedgerStore + ?Sized> LedgerStoreExt for T {}

/// Validates a batch before committing.
pub fn validate_batch(movements: &[Movement]) -> Result<()> {
    if movements.is_empty() {
        return Err(StoreError::InvalidMovement(
            "cannot commit an empty movement batch".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(movements.len());
    for movement in movements {
        movement.validate().map_err(StoreError::InvalidMovement)?;
        if !seen.insert(movement.id) {
            return Err(StoreError::DuplicateMovement(movement.id));
        }
    }

    Ok(())
}

/// Applies a movement to a balance, enforcing the non-negative guard.
///
/// The guard protects available stock: an issue may not consume units
/// that are reserved.
pub(crate) fn apply_guarded(
    balance: &mut Balance,
    movement: &Movement,
    options: CommitOptions,
) -> Result<()> {
    if movement.delta < 0 && !options.allow_negative_stock {
        let available = balance.available();
        if available
            .checked_add(movement.delta)
            .is_none_or(|left| left < 0)
        {
            return Err(StoreError::InsufficientStock {
                key: balance.key(),
                available,
                requested: movement.delta.saturating_neg(),
            });
        }
    }
    balance.apply(movement)
}

/// Adds to reserved stock, enforcing the reservation bounds.
pub(crate) fn reserve_guarded(
    balance: &mut Balance,
    delta: i64,
    options: CommitOptions,
) -> Result<()> {
    let reserved =
        balance
            .reserved_stock
            .checked_add(delta)
            .ok_or_else(|| StoreError::StockOverflow {
                key: balance.key(),
                current: balance.reserved_stock,
                op: "+",
                delta,
            })?;
    if reserved < 0 {
        return Err(StoreError::ReservedUnderflow {
            key: balance.key(),
            reserved: balance.reserved_stock,
            requested: delta.saturating_neg(),
        });
    }
    if delta > 0 && !options.allow_negative_stock && reserved > balance.current_stock {
        return Err(StoreError::InsufficientStock {
            key: balance.key(),
            available: balance.available(),
            requested: delta,
        });
    }
    balance.reserved_stock = reserved;
    Ok(())
}
