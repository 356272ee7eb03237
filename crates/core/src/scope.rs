//! Scan scope: which slice of the data a recompute covers.

use serde::{Deserialize, Serialize};

use crate::id::{BusinessId, WarehouseId};

/// Optional business and warehouse filter. `None` means "all".
///
/// The warehouse filter only narrows inventory-shaped data (stock levels,
/// movements, reorder items); store, invoice and agent passes ignore it.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanScope {
    pub business_id: Option<BusinessId>,
    pub warehouse_id: Option<WarehouseId>,
}

impl ScanScope {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_business(business_id: BusinessId) -> Self {
        Self {
            business_id: Some(business_id),
            warehouse_id: None,
        }
    }

    pub fn with_warehouse(mut self, warehouse_id: WarehouseId) -> Self {
        self.warehouse_id = Some(warehouse_id);
        self
    }

    pub fn includes_business(&self, business_id: BusinessId) -> bool {
        self.business_id.is_none_or(|b| b == business_id)
    }

    pub fn includes_warehouse(&self, warehouse_id: WarehouseId) -> bool {
        self.warehouse_id.is_none_or(|w| w == warehouse_id)
    }

    /// Inventory rows need both filters to match.
    pub fn includes_stock(&self, business_id: BusinessId, warehouse_id: WarehouseId) -> bool {
        self.includes_business(business_id) && self.includes_warehouse(warehouse_id)
    }

    /// The KPI snapshot bucket this scope rolls up into.
    pub fn snapshot_scope(&self) -> SnapshotScope {
        match self.business_id {
            Some(b) => SnapshotScope::Business(b),
            None => SnapshotScope::Global,
        }
    }
}

/// Key of the one-per-day KPI snapshot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "business_id")]
pub enum SnapshotScope {
    Global,
    Business(BusinessId),
}

impl SnapshotScope {
    /// Stable text key (`global` or `business:<uuid>`) used for storage.
    pub fn key(&self) -> String {
        match self {
            SnapshotScope::Global => "global".to_string(),
            SnapshotScope::Business(b) => format!("business:{b}"),
        }
    }

    pub fn business_id(&self) -> Option<BusinessId> {
        match self {
            SnapshotScope::Global => None,
            SnapshotScope::Business(b) => Some(*b),
        }
    }
}
