//! Data-store boundary for the risk engine.
//!
//! The engine reads operational rows (stock, movements, stores, invoices,
//! reorder items, agents) and writes the rows it owns (forecasts, flags,
//! insights, action items, KPI snapshots). `OpsStore` is the one seam between
//! the two; `InMemoryOpsStore` backs tests and dev, `PostgresOpsStore` backs
//! deployments.

mod in_memory;
mod postgres;

use chrono::{DateTime, Utc};

use opsradar_core::ScanScope;
use opsradar_risk::{
    ActionQueueItem, AgentActivity, InsightKey, InventoryForecast, InventoryRiskFlag,
    InvoiceCounts, KpiSnapshot, MovementRecord, OutstandingInvoice, ReorderItem, RiskInsight,
    SnapshotWrite, StockLevel, StoreCounts, StoreVisit,
};

pub use in_memory::InMemoryOpsStore;
pub use postgres::PostgresOpsStore;

/// Data-access failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("query failed: {0}")]
    Query(String),
    /// Unique violation on an open insight key, or the row changed underneath
    /// an update.
    #[error("write conflict: {0}")]
    Conflict(String),
    #[error("malformed row: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Names every store call; used in error messages, spans and fault injection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    LoadStockLevels,
    LoadMovements,
    ReplaceInventoryOutputs,
    LoadStoreVisits,
    LoadOutstandingInvoices,
    LoadReorderItems,
    LoadAgentActivity,
    FindOpenInsight,
    InsertInsight,
    UpdateInsight,
    EnqueueAction,
    CountStores,
    CountInvoices,
    UpsertKpiSnapshot,
    ExpireResolvedInsights,
}

impl StoreOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOperation::LoadStockLevels => "load_stock_levels",
            StoreOperation::LoadMovements => "load_movements",
            StoreOperation::ReplaceInventoryOutputs => "replace_inventory_outputs",
            StoreOperation::LoadStoreVisits => "load_store_visits",
            StoreOperation::LoadOutstandingInvoices => "load_outstanding_invoices",
            StoreOperation::LoadReorderItems => "load_reorder_items",
            StoreOperation::LoadAgentActivity => "load_agent_activity",
            StoreOperation::FindOpenInsight => "find_open_insight",
            StoreOperation::InsertInsight => "insert_insight",
            StoreOperation::UpdateInsight => "update_insight",
            StoreOperation::EnqueueAction => "enqueue_action",
            StoreOperation::CountStores => "count_stores",
            StoreOperation::CountInvoices => "count_invoices",
            StoreOperation::UpsertKpiSnapshot => "upsert_kpi_snapshot",
            StoreOperation::ExpireResolvedInsights => "expire_resolved_insights",
        }
    }
}

impl core::fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Async store abstraction used by every scan pass.
///
/// Reads honour [`ScanScope`]: the business filter applies everywhere, the
/// warehouse filter only to inventory-shaped rows.
#[async_trait::async_trait]
pub trait OpsStore: Send + Sync {
    /// Stock positions in scope, joined to product and warehouse display fields.
    async fn load_stock_levels(&self, scope: ScanScope) -> Result<Vec<StockLevel>, StoreError>;

    /// Movements in scope with `occurred_at >= since`. A movement is in a
    /// warehouse scope when it leaves or enters that warehouse.
    async fn load_movements(
        &self,
        scope: ScanScope,
        since: DateTime<Utc>,
    ) -> Result<Vec<MovementRecord>, StoreError>;

    /// Atomically delete every forecast and flag in scope and insert the given
    /// rows. Either all of it lands or none of it does.
    ///
    /// Overlapping scans on the same scope are not serialized here: the last
    /// commit wins.
    async fn replace_inventory_outputs(
        &self,
        scope: ScanScope,
        forecasts: &[InventoryForecast],
        flags: &[InventoryRiskFlag],
    ) -> Result<(), StoreError>;

    async fn load_store_visits(&self, scope: ScanScope) -> Result<Vec<StoreVisit>, StoreError>;

    /// Unpaid invoices in scope.
    async fn load_outstanding_invoices(
        &self,
        scope: ScanScope,
    ) -> Result<Vec<OutstandingInvoice>, StoreError>;

    async fn load_reorder_items(&self, scope: ScanScope) -> Result<Vec<ReorderItem>, StoreError>;

    async fn load_agent_activity(&self, scope: ScanScope) -> Result<Vec<AgentActivity>, StoreError>;

    async fn find_open_insight(&self, key: InsightKey) -> Result<Option<RiskInsight>, StoreError>;

    /// Insert a new open insight together with its action item, if any, as one
    /// unit: on error neither row is stored. Fails with
    /// [`StoreError::Conflict`] when an open insight with the same key already
    /// exists.
    async fn insert_insight(
        &self,
        insight: &RiskInsight,
        action: Option<&ActionQueueItem>,
    ) -> Result<(), StoreError>;

    /// Overwrite an open insight by id. Fails with [`StoreError::Conflict`]
    /// when the row is no longer open.
    async fn update_insight(&self, insight: &RiskInsight) -> Result<(), StoreError>;

    async fn count_stores(&self, scope: ScanScope) -> Result<StoreCounts, StoreError>;

    async fn count_invoices(&self, scope: ScanScope) -> Result<InvoiceCounts, StoreError>;

    /// Insert or overwrite the snapshot for `(snapshot_date, scope)`.
    async fn upsert_kpi_snapshot(&self, snapshot: &KpiSnapshot) -> Result<SnapshotWrite, StoreError>;

    /// Stamp `expires_at = now` on resolved insights in scope created before
    /// `created_before` that carry no expiry yet. Returns the number stamped.
    async fn expire_resolved_insights(
        &self,
        scope: ScanScope,
        created_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}
