//! Read model views built by replaying the ledger.

pub mod replayed_balances;

pub use replayed_balances::ReplayedBalancesView;
