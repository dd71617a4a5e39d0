//! Write-side entry point of the inventory ledger.
//!
//! Every stock change enters through [`MovementLedger::append`]: the request
//! is validated against the reason taxonomy and the catalog, committed through
//! the balance projector, and published on the change feed. Transfers are
//! delegated to the [`TransferCoordinator`], which commits both legs as one
//! unit or, on stores without atomic batches, reverses a stranded first leg.

pub mod error;
pub mod service;
pub mod transfer;

pub use error::{LedgerError, Result};
pub use service::{AppendOutcome, MovementLedger};
pub use transfer::{TransferCoordinator, TransferReceipt};
