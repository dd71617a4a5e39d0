//! Balance projection and the read side of the inventory ledger.
//!
//! This crate provides:
//! - [`BalanceProjector`], the only writer of balance rows, with retry,
//!   timeout, rebuild and drift repair
//! - [`Projection`] and [`ProjectionProcessor`] for replaying the ledger
//! - [`ChangeFeed`] for publishing committed changes
//! - [`StockQueries`] for totals, per-warehouse balances and history

pub mod error;
pub mod feed;
pub mod processor;
pub mod projection;
pub mod projector;
pub mod queries;
pub mod views;

pub use error::{ProjectionError, Result};
pub use feed::{ChangeFeed, DEFAULT_FEED_CAPACITY, FeedEvent, FeedSubscription, StockChange};
pub use processor::ProjectionProcessor;
pub use projection::{Projection, ProjectionPosition};
pub use projector::{AuditSummary, BalanceProjector, CommitPolicy, DriftReport};
pub use queries::{
    ItemDetail, ItemTotals, MovementView, StockQueries, TotalsFilter, WarehouseBalance,
};
pub use views::ReplayedBalancesView;
