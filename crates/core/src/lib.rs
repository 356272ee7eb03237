//! `opsradar-core`: shared building blocks for the risk engine.
//!
//! Pure primitives only: identifiers, errors, scan scope and time helpers.

pub mod error;
pub mod id;
pub mod scope;
pub mod time;

pub use error::{DomainError, DomainResult};
pub use id::{
    ActionItemId, AgentId, BusinessId, InsightId, InventoryItemId, InvoiceId, ProductId,
    SnapshotId, StoreId, WarehouseId,
};
pub use scope::{ScanScope, SnapshotScope};
