pub mod balance;
pub mod error;
pub mod memory;
pub mod movement;
pub mod postgres;
pub mod query;
pub mod reason;
pub mod store;

pub use balance::Balance;
pub use common::{BalanceKey, CorrelationId, ItemId, MovementId, WarehouseId};
pub use error::{Result, StoreError};
pub use memory::InMemoryLedgerStore;
pub use movement::{MAX_QUANTITY, Movement, MovementType};
pub use postgres::PostgresLedgerStore;
pub use query::{DEFAULT_PAGE_SIZE, HistoryQuery, MAX_PAGE_SIZE, Page};
pub use reason::Reason;
pub use store::{CommitOptions, Committed, LedgerStore, LedgerStoreExt, MovementStream};
