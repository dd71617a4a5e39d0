use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    Balance, BalanceKey, CorrelationId, HistoryQuery, ItemId, Movement, MovementId, Page, Result,
    StoreError,
    store::{
        CommitOptions, Committed, LedgerStore, MovementStream, apply_guarded, reserve_guarded,
        validate_batch,
    },
};

#[derive(Default)]
struct LedgerState {
    movements: Vec<Movement>,
    ids: HashSet<MovementId>,
    balances: BTreeMap<BalanceKey, Balance>,
}

/// In-memory ledger store for tests and local runs.
///
/// Writers serialize per key on an async mutex, taken in ascending key
/// order. The shared state lock is held only while a finished commit is
/// published, so readers always see movements and balances together.
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<RwLock<LedgerState>>,
    key_locks: Arc<Mutex<HashMap<BalanceKey, Arc<Mutex<()>>>>>,
    closed: Arc<AtomicBool>,
}

impl InMemoryLedgerStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of movements stored.
    pub async fn movement_count(&self) -> usize {
        self.state.read().await.movements.len()
    }

    /// Clears all movements and balances.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.movements.clear();
        state.ids.clear();
        state.balances.clear();
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    /// Locks the given keys. Callers must pass them in ascending order.
    async fn lock_keys<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a BalanceKey>,
    ) -> Vec<OwnedMutexGuard<()>> {
        let mut guards = Vec::new();
        for key in keys {
            let lock = {
                let mut locks = self.key_locks.lock().await;
                Arc::clone(locks.entry(key.clone()).or_default())
            };
            guards.push(lock.lock_owned().await);
        }
        guards
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn commit(&self, movements: Vec<Movement>, options: CommitOptions) -> Result<Committed> {
        self.ensure_open()?;
        validate_batch(&movements)?;

        let keys: BTreeSet<BalanceKey> = movements.iter().map(Movement::key).collect();
        let _guards = self.lock_keys(&keys).await;

        // Dry run against the current balances. Nobody else can move these
        // keys while we hold their locks, so the outcome cannot change
        // before publication.
        {
            let state = self.state.read().await;
            if let Some(dup) = movements.iter().find(|m| state.ids.contains(&m.id)) {
                return Err(StoreError::DuplicateMovement(dup.id));
            }
            let mut scratch: BTreeMap<BalanceKey, Balance> = BTreeMap::new();
            for movement in &movements {
                let key = movement.key();
                let balance = scratch.entry(key.clone()).or_insert_with(|| {
                    state
                        .balances
                        .get(&key)
                        .cloned()
                        .unwrap_or_else(|| Balance::empty(key))
                });
                apply_guarded(balance, movement, options)?;
            }
        }

        let mut state = self.state.write().await;
        if let Some(dup) = movements.iter().find(|m| state.ids.contains(&m.id)) {
            return Err(StoreError::DuplicateMovement(dup.id));
        }

        let now = Utc::now();
        let mut sequence = state.movements.len() as i64;
        let mut touched: BTreeMap<BalanceKey, Balance> = BTreeMap::new();
        let mut appended = Vec::with_capacity(movements.len());

        for mut movement in movements {
            sequence += 1;
            movement.sequence = sequence;
            movement.created_at = now;

            let key = movement.key();
            let balance = touched.entry(key.clone()).or_insert_with(|| {
                state
                    .balances
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(|| Balance::empty(key))
            });
            balance.apply(&movement)?;
            appended.push(movement);
        }

        for movement in &appended {
            state.ids.insert(movement.id);
        }
        state.movements.extend(appended.iter().cloned());
        for (key, balance) in &touched {
            state.balances.insert(key.clone(), balance.clone());
        }

        Ok(Committed {
            movements: appended,
            balances: touched.into_values().collect(),
        })
    }

    async fn adjust_reserved(
        &self,
        key: &BalanceKey,
        delta: i64,
        options: CommitOptions,
    ) -> Result<Balance> {
        self.ensure_open()?;
        let _guards = self.lock_keys([key]).await;

        let mut state = self.state.write().await;
        let mut balance = state
            .balances
            .get(key)
            .cloned()
            .unwrap_or_else(|| Balance::empty(key.clone()));
        reserve_guarded(&mut balance, delta, options)?;
        balance.updated_at = Utc::now();
        state.balances.insert(key.clone(), balance.clone());

        Ok(balance)
    }

    async fn rebuild_balance(&self, key: &BalanceKey) -> Result<Balance> {
        self.ensure_open()?;
        let _guards = self.lock_keys([key]).await;

        let mut state = self.state.write().await;
        let mut rebuilt = Balance::replay(
            key.clone(),
            state
                .movements
                .iter()
                .filter(|m| m.item_id == key.item_id && m.warehouse_id == key.warehouse_id),
        )?;

        match state.balances.get(key) {
            Some(stored) => rebuilt.reserved_stock = stored.reserved_stock,
            None if rebuilt.version == 0 => return Ok(rebuilt),
            None => {}
        }
        state.balances.insert(key.clone(), rebuilt.clone());

        Ok(rebuilt)
    }

    async fn restore_balance(&self, balance: Balance) -> Result<()> {
        self.ensure_open()?;
        let key = balance.key();
        let _guards = self.lock_keys([&key]).await;

        self.state.write().await.balances.insert(key, balance);
        Ok(())
    }

    async fn balance(&self, key: &BalanceKey) -> Result<Option<Balance>> {
        Ok(self.state.read().await.balances.get(key).cloned())
    }

    async fn balances_for_item(&self, item_id: &ItemId) -> Result<Vec<Balance>> {
        let state = self.state.read().await;
        Ok(state
            .balances
            .values()
            .filter(|b| &b.item_id == item_id)
            .cloned()
            .collect())
    }

    async fn all_balances(&self) -> Result<Vec<Balance>> {
        Ok(self.state.read().await.balances.values().cloned().collect())
    }

    async fn history(&self, query: HistoryQuery) -> Result<Page<Movement>> {
        let limit = query.effective_limit();
        let state = self.state.read().await;

        let rows: Vec<Movement> = state
            .movements
            .iter()
            .rev()
            .filter(|m| query.cursor.is_none_or(|cursor| m.sequence < cursor))
            .filter(|m| query.matches(m))
            .take(limit + 1)
            .cloned()
            .collect();

        Ok(Page::from_lookahead(rows, limit))
    }

    async fn movements_for_key(&self, key: &BalanceKey) -> Result<Vec<Movement>> {
        let state = self.state.read().await;
        Ok(state
            .movements
            .iter()
            .filter(|m| m.item_id == key.item_id && m.warehouse_id == key.warehouse_id)
            .cloned()
            .collect())
    }

    async fn movements_by_correlation(
        &self,
        correlation_id: CorrelationId,
    ) -> Result<Vec<Movement>> {
        let state = self.state.read().await;
        Ok(state
            .movements
            .iter()
            .filter(|m| m.correlation_id == Some(correlation_id))
            .cloned()
            .collect())
    }

    async fn movement(&self, id: MovementId) -> Result<Option<Movement>> {
        let state = self.state.read().await;
        Ok(state.movements.iter().find(|m| m.id == id).cloned())
    }

    async fn stream_all(&self) -> Result<MovementStream> {
        use futures_util::stream;

        let movements = self.state.read().await.movements.clone();
        let stream = stream::iter(movements.into_iter().map(Ok));
        Ok(Box::pin(stream))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
