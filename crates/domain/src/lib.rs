//! Domain layer for the inventory ledger.
//!
//! This crate provides:
//! - Catalog collaborator types and the `Catalog` lookup trait
//! - The closed `MovementRequest` union and its validation
//! - Reason display labels and stock status derivation

pub mod catalog;
pub mod error;
pub mod labels;
pub mod request;
pub mod status;
pub mod validation;

pub use catalog::{Catalog, CatalogSeed, InMemoryCatalog, ItemKind, StockableItem, Warehouse};
pub use error::{DomainError, ValidationError};
pub use labels::{movement_type_label, reason_label};
pub use request::{MovementPlan, MovementRequest, TransferOrder};
pub use status::StockStatus;
pub use validation::{validate_key_references, validate_references};
