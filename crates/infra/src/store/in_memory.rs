use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use opsradar_core::{BusinessId, InsightId, ProductId, ScanScope, StoreId, WarehouseId};
use opsradar_risk::{
    ActionQueueItem, AgentActivity, InsightKey, InsightStatus, InventoryForecast,
    InventoryRiskFlag, InvoiceCounts, KpiSnapshot, MovementRecord, OutstandingInvoice,
    ReorderItem, RiskInsight, SnapshotWrite, StockLevel, StoreCounts, StoreVisit,
};

use super::{OpsStore, StoreError, StoreOperation};

#[derive(Debug, Default)]
struct Tables {
    stock_levels: Vec<StockLevel>,
    movements: Vec<(BusinessId, MovementRecord)>,
    forecasts: Vec<InventoryForecast>,
    flags: Vec<InventoryRiskFlag>,
    stores: Vec<StoreVisit>,
    /// `(invoice, paid)`
    invoices: Vec<(OutstandingInvoice, bool)>,
    reorder_items: Vec<ReorderItem>,
    agents: Vec<AgentActivity>,
    insights: Vec<RiskInsight>,
    actions: Vec<ActionQueueItem>,
    snapshots: Vec<KpiSnapshot>,
}

/// In-memory store for tests/dev.
///
/// Enforces the same open-insight uniqueness as the Postgres schema and lets
/// tests inject a failure on any [`StoreOperation`].
#[derive(Debug, Default)]
pub struct InMemoryOpsStore {
    tables: RwLock<Tables>,
    failing: RwLock<HashSet<StoreOperation>>,
}

impl InMemoryOpsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Make every subsequent call of `op` fail with [`StoreError::Unavailable`].
    pub fn fail_on(&self, op: StoreOperation) {
        if let Ok(mut failing) = self.failing.write() {
            failing.insert(op);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failing) = self.failing.write() {
            failing.clear();
        }
    }

    pub fn seed_stock_level(&self, stock: StockLevel) {
        if let Ok(mut t) = self.tables.write() {
            t.stock_levels.push(stock);
        }
    }

    pub fn remove_stock_level(&self, business_id: BusinessId, product_id: ProductId, warehouse_id: WarehouseId) {
        if let Ok(mut t) = self.tables.write() {
            t.stock_levels.retain(|s| {
                !(s.business_id == business_id && s.product_id == product_id && s.warehouse_id == warehouse_id)
            });
        }
    }

    pub fn seed_movement(&self, business_id: BusinessId, movement: MovementRecord) {
        if let Ok(mut t) = self.tables.write() {
            t.movements.push((business_id, movement));
        }
    }

    pub fn seed_store(&self, store: StoreVisit) {
        if let Ok(mut t) = self.tables.write() {
            t.stores.push(store);
        }
    }

    /// Record a visit on an existing store.
    pub fn record_visit(&self, store_id: StoreId, at: DateTime<Utc>) {
        if let Ok(mut t) = self.tables.write() {
            for store in t.stores.iter_mut().filter(|s| s.store_id == store_id) {
                store.last_visit_at = Some(at);
            }
        }
    }

    pub fn seed_invoice(&self, invoice: OutstandingInvoice) {
        if let Ok(mut t) = self.tables.write() {
            t.invoices.push((invoice, false));
        }
    }

    pub fn seed_paid_invoice(&self, invoice: OutstandingInvoice) {
        if let Ok(mut t) = self.tables.write() {
            t.invoices.push((invoice, true));
        }
    }

    pub fn seed_reorder_item(&self, item: ReorderItem) {
        if let Ok(mut t) = self.tables.write() {
            t.reorder_items.push(item);
        }
    }

    pub fn seed_agent(&self, agent: AgentActivity) {
        if let Ok(mut t) = self.tables.write() {
            t.agents.push(agent);
        }
    }

    pub fn seed_insight(&self, insight: RiskInsight) {
        if let Ok(mut t) = self.tables.write() {
            t.insights.push(insight);
        }
    }

    /// Operator action: move an insight to another status.
    pub fn set_insight_status(&self, id: InsightId, status: InsightStatus) {
        if let Ok(mut t) = self.tables.write() {
            for insight in t.insights.iter_mut().filter(|i| i.id == id) {
                insight.status = status;
            }
        }
    }

    pub fn forecasts(&self) -> Vec<InventoryForecast> {
        self.tables.read().map(|t| t.forecasts.clone()).unwrap_or_default()
    }

    pub fn flags(&self) -> Vec<InventoryRiskFlag> {
        self.tables.read().map(|t| t.flags.clone()).unwrap_or_default()
    }

    pub fn insights(&self) -> Vec<RiskInsight> {
        self.tables.read().map(|t| t.insights.clone()).unwrap_or_default()
    }

    pub fn action_items(&self) -> Vec<ActionQueueItem> {
        self.tables.read().map(|t| t.actions.clone()).unwrap_or_default()
    }

    pub fn snapshots(&self) -> Vec<KpiSnapshot> {
        self.tables.read().map(|t| t.snapshots.clone()).unwrap_or_default()
    }

    fn check(&self, op: StoreOperation) -> Result<(), StoreError> {
        let failing = self
            .failing
            .read()
            .map_err(|_| StoreError::Unavailable(format!("fault table poisoned in {op}")))?;
        if failing.contains(&op) {
            return Err(StoreError::Unavailable(format!("injected failure in {op}")));
        }
        Ok(())
    }

    fn read(&self, op: StoreOperation) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.check(op)?;
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable(format!("lock poisoned in {op}")))
    }

    fn write(&self, op: StoreOperation) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.check(op)?;
        self.tables
            .write()
            .map_err(|_| StoreError::Unavailable(format!("lock poisoned in {op}")))
    }
}

fn forecast_in_scope(scope: &ScanScope, f: &InventoryForecast) -> bool {
    scope.includes_stock(f.business_id, f.warehouse_id)
}

fn flag_in_scope(scope: &ScanScope, f: &InventoryRiskFlag) -> bool {
    scope.includes_stock(f.business_id, f.warehouse_id)
}

#[async_trait::async_trait]
impl OpsStore for InMemoryOpsStore {
    async fn load_stock_levels(&self, scope: ScanScope) -> Result<Vec<StockLevel>, StoreError> {
        let t = self.read(StoreOperation::LoadStockLevels)?;
        Ok(t.stock_levels
            .iter()
            .filter(|s| scope.includes_stock(s.business_id, s.warehouse_id))
            .cloned()
            .collect())
    }

    async fn load_movements(
        &self,
        scope: ScanScope,
        since: DateTime<Utc>,
    ) -> Result<Vec<MovementRecord>, StoreError> {
        let t = self.read(StoreOperation::LoadMovements)?;
        Ok(t.movements
            .iter()
            .filter(|(business_id, m)| {
                let touches_warehouse = match scope.warehouse_id {
                    Some(w) => m.from_warehouse_id == Some(w) || m.to_warehouse_id == Some(w),
                    None => true,
                };
                scope.includes_business(*business_id) && touches_warehouse && m.occurred_at >= since
            })
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn replace_inventory_outputs(
        &self,
        scope: ScanScope,
        forecasts: &[InventoryForecast],
        flags: &[InventoryRiskFlag],
    ) -> Result<(), StoreError> {
        let mut t = self.write(StoreOperation::ReplaceInventoryOutputs)?;
        t.forecasts.retain(|f| !forecast_in_scope(&scope, f));
        t.flags.retain(|f| !flag_in_scope(&scope, f));
        t.forecasts.extend_from_slice(forecasts);
        t.flags.extend_from_slice(flags);
        Ok(())
    }

    async fn load_store_visits(&self, scope: ScanScope) -> Result<Vec<StoreVisit>, StoreError> {
        let t = self.read(StoreOperation::LoadStoreVisits)?;
        Ok(t.stores
            .iter()
            .filter(|s| scope.includes_business(s.business_id))
            .cloned()
            .collect())
    }

    async fn load_outstanding_invoices(
        &self,
        scope: ScanScope,
    ) -> Result<Vec<OutstandingInvoice>, StoreError> {
        let t = self.read(StoreOperation::LoadOutstandingInvoices)?;
        Ok(t.invoices
            .iter()
            .filter(|(i, paid)| !paid && scope.includes_business(i.business_id))
            .map(|(i, _)| i.clone())
            .collect())
    }

    async fn load_reorder_items(&self, scope: ScanScope) -> Result<Vec<ReorderItem>, StoreError> {
        let t = self.read(StoreOperation::LoadReorderItems)?;
        Ok(t.reorder_items
            .iter()
            .filter(|i| {
                let in_warehouse = match scope.warehouse_id {
                    Some(w) => i.warehouse_id == Some(w),
                    None => true,
                };
                scope.includes_business(i.business_id) && in_warehouse
            })
            .cloned()
            .collect())
    }

    async fn load_agent_activity(&self, scope: ScanScope) -> Result<Vec<AgentActivity>, StoreError> {
        let t = self.read(StoreOperation::LoadAgentActivity)?;
        Ok(t.agents
            .iter()
            .filter(|a| scope.includes_business(a.business_id))
            .cloned()
            .collect())
    }

    async fn find_open_insight(&self, key: InsightKey) -> Result<Option<RiskInsight>, StoreError> {
        let t = self.read(StoreOperation::FindOpenInsight)?;
        Ok(t.insights
            .iter()
            .find(|i| i.status == InsightStatus::Open && i.key() == key)
            .cloned())
    }

    async fn insert_insight(
        &self,
        insight: &RiskInsight,
        action: Option<&ActionQueueItem>,
    ) -> Result<(), StoreError> {
        if action.is_some() {
            self.check(StoreOperation::EnqueueAction)?;
        }
        let mut t = self.write(StoreOperation::InsertInsight)?;
        let key = insight.key();
        if insight.status == InsightStatus::Open
            && t.insights.iter().any(|i| i.status == InsightStatus::Open && i.key() == key)
        {
            return Err(StoreError::Conflict(format!("open insight already exists for {key}")));
        }
        t.insights.push(insight.clone());
        if let Some(item) = action {
            t.actions.push(item.clone());
        }
        Ok(())
    }

    async fn update_insight(&self, insight: &RiskInsight) -> Result<(), StoreError> {
        let mut t = self.write(StoreOperation::UpdateInsight)?;
        match t
            .insights
            .iter_mut()
            .find(|i| i.id == insight.id && i.status == InsightStatus::Open)
        {
            Some(existing) => {
                *existing = insight.clone();
                Ok(())
            }
            None => Err(StoreError::Conflict(format!("insight {} is no longer open", insight.id))),
        }
    }

    async fn count_stores(&self, scope: ScanScope) -> Result<StoreCounts, StoreError> {
        let t = self.read(StoreOperation::CountStores)?;
        let mut counts = StoreCounts::default();
        for store in t.stores.iter().filter(|s| scope.includes_business(s.business_id)) {
            counts.total += 1;
            if store.is_active() {
                counts.active += 1;
            } else {
                counts.inactive += 1;
            }
        }
        Ok(counts)
    }

    async fn count_invoices(&self, scope: ScanScope) -> Result<InvoiceCounts, StoreError> {
        let t = self.read(StoreOperation::CountInvoices)?;
        let mut counts = InvoiceCounts::default();
        for (_, paid) in t.invoices.iter().filter(|(i, _)| scope.includes_business(i.business_id)) {
            counts.total += 1;
            if !paid {
                counts.unpaid += 1;
            }
        }
        Ok(counts)
    }

    async fn upsert_kpi_snapshot(&self, snapshot: &KpiSnapshot) -> Result<SnapshotWrite, StoreError> {
        let mut t = self.write(StoreOperation::UpsertKpiSnapshot)?;
        match t
            .snapshots
            .iter_mut()
            .find(|s| s.snapshot_date == snapshot.snapshot_date && s.scope == snapshot.scope)
        {
            Some(existing) => {
                existing.overwrite_counts(snapshot);
                Ok(SnapshotWrite::Updated)
            }
            None => {
                t.snapshots.push(snapshot.clone());
                Ok(SnapshotWrite::Inserted)
            }
        }
    }

    async fn expire_resolved_insights(
        &self,
        scope: ScanScope,
        created_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut t = self.write(StoreOperation::ExpireResolvedInsights)?;
        let mut stamped = 0;
        for insight in t.insights.iter_mut().filter(|i| {
            i.status == InsightStatus::Resolved
                && i.expires_at.is_none()
                && i.created_at < created_before
                && scope.includes_business(i.business_id)
        }) {
            insight.expires_at = Some(now);
            stamped += 1;
        }
        Ok(stamped)
    }
}
