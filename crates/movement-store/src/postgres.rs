use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::{
    PgPool, Postgres, Row, Transaction,
    postgres::{PgPoolOptions, PgRow},
};
use uuid::Uuid;

use crate::{
    Balance, BalanceKey, CorrelationId, HistoryQuery, ItemId, Movement, MovementId, Page, Result,
    StoreError,
    store::{
        CommitOptions, Committed, LedgerStore, MovementStream, apply_guarded, reserve_guarded,
        validate_batch,
    },
};

const MOVEMENT_COLUMNS: &str = "sequence, id, item_id, warehouse_id, movement_type, delta, \
     reason, reference, notes, created_at, created_by, correlation_id";

const BALANCE_COLUMNS: &str = "item_id, warehouse_id, current_stock, reserved_stock, \
     last_applied_movement_id, version, updated_at";

/// Rows fetched per round trip by `stream_all`.
const STREAM_PAGE_SIZE: i64 = 500;

/// SQLSTATE codes raised by lock contention: serialization failure,
/// deadlock detected, and lock not available.
const CONTENTION_CODES: [&str; 3] = ["40001", "40P01", "55P03"];

/// PostgreSQL-backed ledger store.
///
/// A commit locks the balance rows of its keys with `SELECT ... FOR UPDATE`
/// in ascending key order, appends the movements and updates the balances
/// in the same transaction.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
    lock_timeout: Option<Duration>,
}

impl PostgresLedgerStore {
    /// Creates a new PostgreSQL ledger store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: None,
        }
    }

    /// Connects a pool of at most `max_connections` to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Bounds how long a commit waits for a balance row lock.
    ///
    /// A commit that times out fails with `ConcurrencyConflict`.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await.map_err(|e| match e {
            sqlx::Error::PoolClosed => StoreError::Closed,
            other => StoreError::Database(other),
        })?;
        if let Some(timeout) = self.lock_timeout {
            // SET does not accept bind parameters.
            let sql = format!("SET LOCAL lock_timeout = '{}ms'", timeout.as_millis());
            sqlx::query(&sql).execute(&mut *tx).await?;
        }
        Ok(tx)
    }

    /// Ensures a balance row exists for the key and locks it.
    async fn lock_balance(
        tx: &mut Transaction<'static, Postgres>,
        key: &BalanceKey,
    ) -> Result<Balance> {
        sqlx::query(
            "INSERT INTO balances (item_id, warehouse_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(key.item_id.as_str())
        .bind(key.warehouse_id.as_str())
        .execute(&mut **tx)
        .await
        .map_err(|e| classify(e, key))?;

        let sql = format!(
            "SELECT {BALANCE_COLUMNS} FROM balances \
             WHERE item_id = $1 AND warehouse_id = $2 FOR UPDATE"
        );
        let row = sqlx::query(&sql)
            .bind(key.item_id.as_str())
            .bind(key.warehouse_id.as_str())
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| classify(e, key))?;

        Self::row_to_balance(&row)
    }

    async fn write_balance(
        tx: &mut Transaction<'static, Postgres>,
        balance: &Balance,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE balances
            SET current_stock = $3,
                reserved_stock = $4,
                last_applied_movement_id = $5,
                version = $6,
                updated_at = $7
            WHERE item_id = $1 AND warehouse_id = $2
            "#,
        )
        .bind(balance.item_id.as_str())
        .bind(balance.warehouse_id.as_str())
        .bind(balance.current_stock)
        .bind(balance.reserved_stock)
        .bind(balance.last_applied_movement_id.map(|id| id.as_uuid()))
        .bind(balance.version)
        .bind(balance.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| classify(e, &balance.key()))?;

        Ok(())
    }

    fn row_to_movement(row: &PgRow) -> Result<Movement> {
        let movement_type: String = row.try_get("movement_type")?;
        let reason: String = row.try_get("reason")?;

        Ok(Movement {
            id: MovementId::from_uuid(row.try_get::<Uuid, _>("id")?),
            sequence: row.try_get("sequence")?,
            item_id: ItemId::new(row.try_get::<String, _>("item_id")?),
            warehouse_id: row.try_get::<String, _>("warehouse_id")?.into(),
            movement_type: movement_type.parse().map_err(StoreError::InvalidRow)?,
            delta: row.try_get("delta")?,
            reason: reason.parse().map_err(StoreError::InvalidRow)?,
            reference: row.try_get("reference")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            created_by: row.try_get("created_by")?,
            correlation_id: row
                .try_get::<Option<Uuid>, _>("correlation_id")?
                .map(CorrelationId::from_uuid),
        })
    }

    fn row_to_balance(row: &PgRow) -> Result<Balance> {
        Ok(Balance {
            item_id: ItemId::new(row.try_get::<String, _>("item_id")?),
            warehouse_id: row.try_get::<String, _>("warehouse_id")?.into(),
            current_stock: row.try_get("current_stock")?,
            reserved_stock: row.try_get("reserved_stock")?,
            last_applied_movement_id: row
                .try_get::<Option<Uuid>, _>("last_applied_movement_id")?
                .map(MovementId::from_uuid),
            version: row.try_get("version")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Maps lock contention to `ConcurrencyConflict`; everything else stays a database error.
fn classify(err: sqlx::Error, key: &BalanceKey) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err
        && let Some(code) = db_err.code()
        && CONTENTION_CODES.contains(&code.as_ref())
    {
        return StoreError::ConcurrencyConflict {
            key: key.clone(),
            reason: db_err.message().to_string(),
        };
    }
    StoreError::Database(err)
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[tracing::instrument(skip(self, movements, options), fields(count = movements.len()))]
    async fn commit(&self, movements: Vec<Movement>, options: CommitOptions) -> Result<Committed> {
        validate_batch(&movements)?;

        let keys: BTreeSet<BalanceKey> = movements.iter().map(Movement::key).collect();
        let mut tx = self.begin().await?;

        let mut balances = BTreeMap::new();
        for key in &keys {
            let balance = Self::lock_balance(&mut tx, key).await?;
            balances.insert(key.clone(), balance);
        }

        let insert_sql = format!(
            r#"
            INSERT INTO movements (id, item_id, warehouse_id, movement_type, delta, reason,
                                   reference, notes, created_by, correlation_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {MOVEMENT_COLUMNS}
            "#
        );

        let mut appended = Vec::with_capacity(movements.len());
        for movement in &movements {
            let key = movement.key();
            let row = sqlx::query(&insert_sql)
                .bind(movement.id.as_uuid())
                .bind(movement.item_id.as_str())
                .bind(movement.warehouse_id.as_str())
                .bind(movement.movement_type.as_str())
                .bind(movement.delta)
                .bind(movement.reason.as_str())
                .bind(&movement.reference)
                .bind(&movement.notes)
                .bind(&movement.created_by)
                .bind(movement.correlation_id.map(|id| id.as_uuid()))
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| {
                    if let sqlx::Error::Database(ref db_err) = e
                        && db_err.constraint() == Some("movements_id_unique")
                    {
                        return StoreError::DuplicateMovement(movement.id);
                    }
                    classify(e, &key)
                })?;

            let stored = Self::row_to_movement(&row)?;
            let balance = balances
                .entry(key.clone())
                .or_insert_with(|| Balance::empty(key));
            apply_guarded(balance, &stored, options)?;
            appended.push(stored);
        }

        for balance in balances.values() {
            Self::write_balance(&mut tx, balance).await?;
        }

        let first_key = keys.iter().next().cloned();
        tx.commit().await.map_err(|e| match first_key {
            Some(ref key) => classify(e, key),
            None => StoreError::Database(e),
        })?;

        Ok(Committed {
            movements: appended,
            balances: balances.into_values().collect(),
        })
    }

    async fn adjust_reserved(
        &self,
        key: &BalanceKey,
        delta: i64,
        options: CommitOptions,
    ) -> Result<Balance> {
        let mut tx = self.begin().await?;
        let mut balance = Self::lock_balance(&mut tx, key).await?;

        reserve_guarded(&mut balance, delta, options)?;
        // Postgres keeps microseconds.
        balance.updated_at = Utc::now().trunc_subsecs(6);

        Self::write_balance(&mut tx, &balance).await?;
        tx.commit().await.map_err(|e| classify(e, key))?;

        Ok(balance)
    }

    async fn rebuild_balance(&self, key: &BalanceKey) -> Result<Balance> {
        let exists = self.balance(key).await?.is_some();

        let mut tx = self.begin().await?;
        let stored = Self::lock_balance(&mut tx, key).await?;

        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM movements \
             WHERE item_id = $1 AND warehouse_id = $2 ORDER BY sequence ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(key.item_id.as_str())
            .bind(key.warehouse_id.as_str())
            .fetch_all(&mut *tx)
            .await?;
        let movements = rows
            .iter()
            .map(Self::row_to_movement)
            .collect::<Result<Vec<_>>>()?;

        let mut rebuilt = Balance::replay(key.clone(), &movements)?;
        if !exists && rebuilt.version == 0 {
            // Dropping the transaction discards the placeholder row.
            return Ok(rebuilt);
        }
        rebuilt.reserved_stock = stored.reserved_stock;

        Self::write_balance(&mut tx, &rebuilt).await?;
        tx.commit().await.map_err(|e| classify(e, key))?;

        Ok(rebuilt)
    }

    async fn restore_balance(&self, balance: Balance) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO balances (item_id, warehouse_id, current_stock, reserved_stock,
                                  last_applied_movement_id, version, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (item_id, warehouse_id) DO UPDATE SET
                current_stock = EXCLUDED.current_stock,
                reserved_stock = EXCLUDED.reserved_stock,
                last_applied_movement_id = EXCLUDED.last_applied_movement_id,
                version = EXCLUDED.version,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(balance.item_id.as_str())
        .bind(balance.warehouse_id.as_str())
        .bind(balance.current_stock)
        .bind(balance.reserved_stock)
        .bind(balance.last_applied_movement_id.map(|id| id.as_uuid()))
        .bind(balance.version)
        .bind(balance.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, &balance.key()))?;

        Ok(())
    }

    async fn balance(&self, key: &BalanceKey) -> Result<Option<Balance>> {
        let sql =
            format!("SELECT {BALANCE_COLUMNS} FROM balances WHERE item_id = $1 AND warehouse_id = $2");
        let row = sqlx::query(&sql)
            .bind(key.item_id.as_str())
            .bind(key.warehouse_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_balance).transpose()
    }

    async fn balances_for_item(&self, item_id: &ItemId) -> Result<Vec<Balance>> {
        let sql = format!(
            "SELECT {BALANCE_COLUMNS} FROM balances WHERE item_id = $1 ORDER BY warehouse_id"
        );
        let rows = sqlx::query(&sql)
            .bind(item_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_balance).collect()
    }

    async fn all_balances(&self) -> Result<Vec<Balance>> {
        let sql = format!("SELECT {BALANCE_COLUMNS} FROM balances ORDER BY item_id, warehouse_id");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.iter().map(Self::row_to_balance).collect()
    }

    async fn history(&self, query: HistoryQuery) -> Result<Page<Movement>> {
        let limit = query.effective_limit();

        let mut sql = format!("SELECT {MOVEMENT_COLUMNS} FROM movements WHERE item_id = $1");
        let mut param_count = 1;

        if query.warehouse_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND warehouse_id = ${param_count}"));
        }
        if query.movement_types.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND movement_type = ANY(${param_count})"));
        }
        if query.reason.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND reason = ${param_count}"));
        }
        if query.correlation_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND correlation_id = ${param_count}"));
        }
        if query.from_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND created_at >= ${param_count}"));
        }
        if query.to_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND created_at <= ${param_count}"));
        }
        if query.cursor.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND sequence < ${param_count}"));
        }
        param_count += 1;
        sql.push_str(&format!(" ORDER BY sequence DESC LIMIT ${param_count}"));

        let mut sqlx_query = sqlx::query(&sql).bind(query.item_id.as_str());

        if let Some(ref warehouse_id) = query.warehouse_id {
            sqlx_query = sqlx_query.bind(warehouse_id.as_str());
        }
        if let Some(ref types) = query.movement_types {
            let types: Vec<String> = types.iter().map(|t| t.as_str().to_string()).collect();
            sqlx_query = sqlx_query.bind(types);
        }
        if let Some(reason) = query.reason {
            sqlx_query = sqlx_query.bind(reason.as_str());
        }
        if let Some(correlation_id) = query.correlation_id {
            sqlx_query = sqlx_query.bind(correlation_id.as_uuid());
        }
        if let Some(from) = query.from_timestamp {
            sqlx_query = sqlx_query.bind(from);
        }
        if let Some(to) = query.to_timestamp {
            sqlx_query = sqlx_query.bind(to);
        }
        if let Some(cursor) = query.cursor {
            sqlx_query = sqlx_query.bind(cursor);
        }
        sqlx_query = sqlx_query.bind((limit + 1) as i64);

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        let movements = rows
            .iter()
            .map(Self::row_to_movement)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page::from_lookahead(movements, limit))
    }

    async fn movements_for_key(&self, key: &BalanceKey) -> Result<Vec<Movement>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM movements \
             WHERE item_id = $1 AND warehouse_id = $2 ORDER BY sequence ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(key.item_id.as_str())
            .bind(key.warehouse_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_movement).collect()
    }

    async fn movements_by_correlation(
        &self,
        correlation_id: CorrelationId,
    ) -> Result<Vec<Movement>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM movements WHERE correlation_id = $1 ORDER BY sequence ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(correlation_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_movement).collect()
    }

    async fn movement(&self, id: MovementId) -> Result<Option<Movement>> {
        let sql = format!("SELECT {MOVEMENT_COLUMNS} FROM movements WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_movement).transpose()
    }

    async fn stream_all(&self) -> Result<MovementStream> {
        use futures_util::{TryStreamExt, stream};

        let pool = self.pool.clone();

        // Pages through the log by sequence so the stream owns its pool handle.
        let pages = stream::try_unfold(Some((pool, 0_i64)), |state| async move {
            let Some((pool, after)) = state else {
                return Ok::<_, StoreError>(None);
            };

            let sql = format!(
                "SELECT {MOVEMENT_COLUMNS} FROM movements \
                 WHERE sequence > $1 ORDER BY sequence ASC LIMIT $2"
            );
            let rows = sqlx::query(&sql)
                .bind(after)
                .bind(STREAM_PAGE_SIZE)
                .fetch_all(&pool)
                .await?;
            if rows.is_empty() {
                return Ok(None);
            }

            let movements = rows
                .iter()
                .map(Self::row_to_movement)
                .collect::<Result<Vec<_>>>()?;
            let last = movements.last().map_or(after, |m| m.sequence);
            let next = ((movements.len() as i64) == STREAM_PAGE_SIZE).then_some((pool, last));

            Ok(Some((stream::iter(movements.into_iter().map(Ok)), next)))
        });

        Ok(Box::pin(pages.try_flatten()))
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!("PostgreSQL pool closed");
    }
}
