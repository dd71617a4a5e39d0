//! Catalog collaborator: the items and warehouses movements may reference.
//!
//! The ledger never owns catalog identity. It only asks whether an id exists
//! and reads the attributes it needs for queries (kind, threshold, search text).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{ItemId, WarehouseId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::DomainError;

/// What kind of stockable thing an item is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// Raw material consumed by production.
    Material,
    /// Finished-good variant.
    Variant,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Material => "material",
            ItemKind::Variant => "variant",
        }
    }
}

impl std::str::FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "material" => Ok(ItemKind::Material),
            "variant" => Ok(ItemKind::Variant),
            other => Err(format!("unknown item kind: {other}")),
        }
    }
}

/// An item whose stock is tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockableItem {
    pub id: ItemId,
    pub sku: String,
    pub name: String,
    pub unit: String,
    pub kind: ItemKind,
    #[serde(default)]
    pub low_stock_threshold: i64,
}

impl StockableItem {
    /// Case-insensitive substring match on name or SKU. Blank text matches everything.
    pub fn matches_search(&self, text: &str) -> bool {
        let needle = text.trim().to_lowercase();
        needle.is_empty()
            || self.name.to_lowercase().contains(&needle)
            || self.sku.to_lowercase().contains(&needle)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub name: String,
}

/// Read access to the catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn item(&self, id: &ItemId) -> Option<StockableItem>;

    async fn warehouse(&self, id: &WarehouseId) -> Option<Warehouse>;

    /// Every item, ordered by id.
    async fn items(&self) -> Vec<StockableItem>;

    /// Every warehouse, ordered by id.
    async fn warehouses(&self) -> Vec<Warehouse>;
}

/// JSON shape of a catalog seed file.
#[derive(Debug, Default, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub items: Vec<StockableItem>,
    #[serde(default)]
    pub warehouses: Vec<Warehouse>,
}

#[derive(Default)]
struct CatalogState {
    items: BTreeMap<ItemId, StockableItem>,
    warehouses: BTreeMap<WarehouseId, Warehouse>,
}

/// In-memory catalog, seeded at startup.
#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<RwLock<CatalogState>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from a seed.
    pub fn from_seed(seed: CatalogSeed) -> Self {
        let state = CatalogState {
            items: seed
                .items
                .into_iter()
                .map(|item| (item.id.clone(), item))
                .collect(),
            warehouses: seed
                .warehouses
                .into_iter()
                .map(|warehouse| (warehouse.id.clone(), warehouse))
                .collect(),
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Parses a JSON seed (`{"items": [...], "warehouses": [...]}`).
    pub fn from_json(json: &str) -> Result<Self, DomainError> {
        let seed: CatalogSeed = serde_json::from_str(json)?;
        Ok(Self::from_seed(seed))
    }

    /// Reads a JSON seed file.
    pub async fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, DomainError> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }

    pub async fn add_item(&self, item: StockableItem) {
        self.state
            .write()
            .await
            .items
            .insert(item.id.clone(), item);
    }

    pub async fn add_warehouse(&self, warehouse: Warehouse) {
        self.state
            .write()
            .await
            .warehouses
            .insert(warehouse.id.clone(), warehouse);
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn item(&self, id: &ItemId) -> Option<StockableItem> {
        self.state.read().await.items.get(id).cloned()
    }

    async fn warehouse(&self, id: &WarehouseId) -> Option<Warehouse> {
        self.state.read().await.warehouses.get(id).cloned()
    }

    async fn items(&self) -> Vec<StockableItem> {
        self.state.read().await.items.values().cloned().collect()
    }

    async fn warehouses(&self) -> Vec<Warehouse> {
        self.state.read().await.warehouses.values().cloned().collect()
    }
}
