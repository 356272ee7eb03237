//! Daily KPI snapshot rows.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use opsradar_core::{SnapshotId, SnapshotScope};

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCounts {
    pub total: u64,
    pub active: u64,
    pub inactive: u64,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCounts {
    pub total: u64,
    pub unpaid: u64,
}

/// One row per (snapshot_date, scope). Counts are overwritten in place on re-run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KpiSnapshot {
    pub id: SnapshotId,
    pub scope: SnapshotScope,
    pub snapshot_date: NaiveDate,
    pub stores: StoreCounts,
    pub invoices: InvoiceCounts,
    pub low_stock_items: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KpiSnapshot {
    pub fn new(
        scope: SnapshotScope,
        stores: StoreCounts,
        invoices: InvoiceCounts,
        low_stock_items: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SnapshotId::new(),
            scope,
            snapshot_date: now.date_naive(),
            stores,
            invoices,
            low_stock_items,
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy counts from a fresh computation, keeping identity and `created_at`.
    pub fn overwrite_counts(&mut self, other: &KpiSnapshot) {
        self.stores = other.stores;
        self.invoices = other.invoices;
        self.low_stock_items = other.low_stock_items;
        self.updated_at = other.updated_at;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotWrite {
    Inserted,
    Updated,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use opsradar_core::BusinessId;

    #[test]
    fn overwrite_keeps_identity() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let scope = SnapshotScope::Business(BusinessId::new());
        let mut first = KpiSnapshot::new(scope, StoreCounts::default(), InvoiceCounts::default(), 0, now);

        let later = now + Duration::hours(3);
        let second = KpiSnapshot::new(
            scope,
            StoreCounts { total: 4, active: 3, inactive: 1 },
            InvoiceCounts { total: 9, unpaid: 2 },
            5,
            later,
        );
        let id = first.id;
        first.overwrite_counts(&second);

        assert_eq!(first.id, id);
        assert_eq!(first.created_at, now);
        assert_eq!(first.updated_at, later);
        assert_eq!(first.stores.active, 3);
        assert_eq!(first.low_stock_items, 5);
        assert_eq!(first.snapshot_date, second.snapshot_date);
    }
}
