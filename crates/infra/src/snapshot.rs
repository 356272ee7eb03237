use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use opsradar_core::ScanScope;
use opsradar_risk::{KpiSnapshot, SnapshotWrite};

use crate::error::ScanError;
use crate::store::OpsStore;

/// Roll today's KPI counts for `scope` into its daily snapshot row.
///
/// `low_stock_items` comes from the inventory shortage pass of the same run.
#[instrument(skip(store), fields(business_id = ?scope.business_id), err)]
pub async fn write_kpi_snapshot<S>(
    store: &S,
    scope: ScanScope,
    low_stock_items: u64,
    now: DateTime<Utc>,
) -> Result<SnapshotWrite, ScanError>
where
    S: OpsStore + ?Sized,
{
    let stores = store.count_stores(scope).await?;
    let invoices = store.count_invoices(scope).await?;

    let snapshot = KpiSnapshot::new(scope.snapshot_scope(), stores, invoices, low_stock_items, now);
    let write = store.upsert_kpi_snapshot(&snapshot).await?;

    info!(
        scope = %snapshot.scope.key(),
        snapshot_date = %snapshot.snapshot_date,
        write = ?write,
        "kpi snapshot written"
    );
    Ok(write)
}
