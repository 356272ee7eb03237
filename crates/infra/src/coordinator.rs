//! Full or scoped recompute of every derived risk record.
//!
//! Order of a run:
//! 1. inventory forecasts + flags (scoped replace)
//! 2. the four entity passes, concurrently
//! 3. the daily KPI snapshot
//! 4. housekeeping: expiry stamp on old resolved insights
//!
//! Nothing is transactional across steps. A failing step is recorded in
//! [`ScanStats::failures`] and contributes zero counts; the others still run.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use opsradar_core::time::window_start;
use opsradar_core::{BusinessId, ScanScope, WarehouseId};
use opsradar_risk::{ForecastParams, RiskError, SnapshotWrite};

use crate::config::EngineConfig;
use crate::error::ScanError;
use crate::forecasting::{ForecastRun, recompute_inventory_forecasts};
use crate::scanner::{
    PassStats, scan_agent_inactivity, scan_inventory_shortage, scan_invoice_non_payment,
    scan_store_churn,
};
use crate::snapshot::write_kpi_snapshot;
use crate::store::OpsStore;

/// Trigger payload. Every field is optional; an empty request scans everything
/// with the configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    pub business_id: Option<BusinessId>,
    #[serde(default)]
    pub warehouse_id: Option<WarehouseId>,
    #[serde(default)]
    pub horizon_days: Option<i64>,
    #[serde(default)]
    pub history_days: Option<i64>,
}

impl ScanRequest {
    pub fn full() -> Self {
        Self::default()
    }

    /// Validate against `defaults` and resolve into a runnable plan.
    pub fn plan(&self, defaults: ForecastParams) -> Result<ScanPlan, RiskError> {
        let params = ForecastParams {
            horizon_days: days("horizon_days", self.horizon_days, defaults.horizon_days)?,
            history_days: days("history_days", self.history_days, defaults.history_days)?,
            lead_time_days: defaults.lead_time_days,
        };
        params.validate()?;

        let scope = ScanScope {
            business_id: self.business_id,
            warehouse_id: self.warehouse_id,
        };
        Ok(ScanPlan { scope, params })
    }
}

fn days(name: &str, value: Option<i64>, default: u32) -> Result<u32, RiskError> {
    match value {
        None => Ok(default),
        Some(v) if v > 0 => {
            u32::try_from(v).map_err(|_| RiskError::InvalidInput(format!("{name} out of range: {v}")))
        }
        Some(v) => Err(RiskError::InvalidInput(format!("{name} must be positive, got {v}"))),
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ScanPlan {
    pub scope: ScanScope,
    pub params: ForecastParams,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPass {
    Forecast,
    StoreChurn,
    InvoiceNonPayment,
    InventoryShortage,
    AgentInactivity,
    Snapshot,
    Housekeeping,
}

impl ScanPass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanPass::Forecast => "forecast",
            ScanPass::StoreChurn => "store_churn",
            ScanPass::InvoiceNonPayment => "invoice_non_payment",
            ScanPass::InventoryShortage => "inventory_shortage",
            ScanPass::AgentInactivity => "agent_inactivity",
            ScanPass::Snapshot => "snapshot",
            ScanPass::Housekeeping => "housekeeping",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassFailure {
    pub pass: ScanPass,
    pub message: String,
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanStats {
    /// `false` when the request was invalid or every scan pass failed.
    pub success: bool,
    pub message: Option<String>,
    pub scope: ScanScope,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub forecast: ForecastRun,
    pub store_churn: PassStats,
    pub invoice_non_payment: PassStats,
    pub inventory_shortage: PassStats,
    pub agent_inactivity: PassStats,
    /// `None` when the snapshot was skipped or failed.
    pub snapshot: Option<SnapshotWrite>,
    pub insights_expired: u64,
    pub failures: Vec<PassFailure>,
}

impl ScanStats {
    fn empty(scope: ScanScope, now: DateTime<Utc>) -> Self {
        Self {
            success: true,
            message: None,
            scope,
            started_at: now,
            elapsed_ms: 0,
            forecast: ForecastRun::default(),
            store_churn: PassStats::default(),
            invoice_non_payment: PassStats::default(),
            inventory_shortage: PassStats::default(),
            agent_inactivity: PassStats::default(),
            snapshot: None,
            insights_expired: 0,
            failures: Vec::new(),
        }
    }

    /// Stats for a request that failed validation; nothing was read or written.
    pub fn rejected(request: &ScanRequest, error: &RiskError, now: DateTime<Utc>) -> Self {
        let scope = ScanScope {
            business_id: request.business_id,
            warehouse_id: request.warehouse_id,
        };
        Self {
            success: false,
            message: Some(error.to_string()),
            ..Self::empty(scope, now)
        }
    }

    fn entity_passes(&self) -> [&PassStats; 4] {
        [
            &self.store_churn,
            &self.invoice_non_payment,
            &self.inventory_shortage,
            &self.agent_inactivity,
        ]
    }

    pub fn analyzed(&self) -> u64 {
        self.entity_passes().iter().map(|p| p.analyzed).sum()
    }

    pub fn new_risks(&self) -> u64 {
        self.entity_passes().iter().map(|p| p.new_risks).sum()
    }

    pub fn updated_risks(&self) -> u64 {
        self.entity_passes().iter().map(|p| p.updated_risks).sum()
    }

    pub fn actions_queued(&self) -> u64 {
        self.entity_passes().iter().map(|p| p.actions_queued).sum()
    }

    pub fn failed(&self, pass: ScanPass) -> bool {
        self.failures.iter().any(|f| f.pass == pass)
    }
}

/// Runs scans against a shared store.
#[derive(Debug)]
pub struct RecomputeCoordinator<S: ?Sized> {
    store: Arc<S>,
    config: EngineConfig,
}

impl<S> RecomputeCoordinator<S>
where
    S: OpsStore + ?Sized,
{
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn plan(&self, request: &ScanRequest) -> Result<ScanPlan, RiskError> {
        request.plan(self.config.forecast)
    }

    pub async fn run_scan(&self, request: ScanRequest) -> ScanStats {
        self.run_scan_at(request, Utc::now()).await
    }

    /// Same as [`run_scan`](Self::run_scan) with an explicit clock.
    pub async fn run_scan_at(&self, request: ScanRequest, now: DateTime<Utc>) -> ScanStats {
        match self.plan(&request) {
            Ok(plan) => self.run_plan(plan, now).await,
            Err(e) => {
                warn!(error = %e, "scan request rejected");
                ScanStats::rejected(&request, &e, now)
            }
        }
    }

    #[instrument(
        skip(self, plan),
        fields(
            business_id = ?plan.scope.business_id,
            warehouse_id = ?plan.scope.warehouse_id,
            horizon_days = plan.params.horizon_days,
            history_days = plan.params.history_days
        )
    )]
    pub async fn run_plan(&self, plan: ScanPlan, now: DateTime<Utc>) -> ScanStats {
        let started = Instant::now();
        let store = &*self.store;
        let scope = plan.scope;
        let mut stats = ScanStats::empty(scope, now);

        let forecast = recompute_inventory_forecasts(store, scope, plan.params, now).await;
        stats.forecast = settle(&mut stats.failures, ScanPass::Forecast, forecast).unwrap_or_default();

        let (churn, invoices, shortage, agents) = tokio::join!(
            scan_store_churn(store, scope, now),
            scan_invoice_non_payment(store, scope, now),
            scan_inventory_shortage(store, scope, now),
            scan_agent_inactivity(store, scope, now),
        );
        stats.store_churn = settle(&mut stats.failures, ScanPass::StoreChurn, churn).unwrap_or_default();
        stats.invoice_non_payment =
            settle(&mut stats.failures, ScanPass::InvoiceNonPayment, invoices).unwrap_or_default();
        let shortage = settle(&mut stats.failures, ScanPass::InventoryShortage, shortage);
        stats.inventory_shortage = shortage.unwrap_or_default();
        stats.agent_inactivity = settle(&mut stats.failures, ScanPass::AgentInactivity, agents).unwrap_or_default();

        stats.snapshot = match shortage {
            // A single warehouse's low-stock count would misstate the business rollup.
            _ if scope.warehouse_id.is_some() => None,
            Some(pass) => {
                let written = write_kpi_snapshot(store, scope, pass.findings, now).await;
                settle(&mut stats.failures, ScanPass::Snapshot, written)
            }
            None => {
                stats.failures.push(PassFailure {
                    pass: ScanPass::Snapshot,
                    message: "skipped: inventory shortage pass failed".to_string(),
                });
                None
            }
        };

        let cutoff = window_start(now, self.config.resolved_expiry_days);
        let expired = store
            .expire_resolved_insights(scope, cutoff, now)
            .await
            .map_err(ScanError::from);
        stats.insights_expired = settle(&mut stats.failures, ScanPass::Housekeeping, expired).unwrap_or_default();

        let scan_passes = [
            ScanPass::Forecast,
            ScanPass::StoreChurn,
            ScanPass::InvoiceNonPayment,
            ScanPass::InventoryShortage,
            ScanPass::AgentInactivity,
        ];
        stats.success = !scan_passes.iter().all(|p| stats.failed(*p));
        stats.message = if !stats.success {
            Some("all scan passes failed".to_string())
        } else if stats.failures.is_empty() {
            None
        } else {
            let failed: Vec<&str> = stats.failures.iter().map(|f| f.pass.as_str()).collect();
            Some(format!("partial failure: {}", failed.join(", ")))
        };
        stats.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!(
            success = stats.success,
            forecasts = stats.forecast.forecasts,
            flags = stats.forecast.flags,
            analyzed = stats.analyzed(),
            new_risks = stats.new_risks(),
            updated_risks = stats.updated_risks(),
            actions_queued = stats.actions_queued(),
            insights_expired = stats.insights_expired,
            failures = stats.failures.len(),
            "scan finished"
        );
        stats
    }
}

fn settle<T>(failures: &mut Vec<PassFailure>, pass: ScanPass, result: Result<T, ScanError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(pass = pass.as_str(), error = %e, "scan pass failed");
            failures.push(PassFailure {
                pass,
                message: e.to_string(),
            });
            None
        }
    }
}
