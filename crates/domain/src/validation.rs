//! Catalog reference checks for movement requests.

use common::{ItemId, WarehouseId};

use crate::catalog::{Catalog, StockableItem};
use crate::error::ValidationError;
use crate::request::MovementRequest;

/// Resolves the item and warehouses a request refers to.
///
/// Returns the catalog item so callers can use its attributes without a
/// second lookup.
pub async fn validate_references<C>(
    catalog: &C,
    request: &MovementRequest,
) -> Result<StockableItem, ValidationError>
where
    C: Catalog + ?Sized,
{
    request.check()?;
    validate_key_references(catalog, request.item_id(), &request.warehouse_ids()).await
}

/// Checks that an item and every listed warehouse exist in the catalog.
pub async fn validate_key_references<C>(
    catalog: &C,
    item_id: &ItemId,
    warehouse_ids: &[&WarehouseId],
) -> Result<StockableItem, ValidationError>
where
    C: Catalog + ?Sized,
{
    let item = catalog
        .item(item_id)
        .await
        .ok_or_else(|| ValidationError::UnknownItem(item_id.clone()))?;

    for warehouse_id in warehouse_ids {
        if catalog.warehouse(warehouse_id).await.is_none() {
            return Err(ValidationError::UnknownWarehouse((*warehouse_id).clone()));
        }
    }

    Ok(item)
}
