use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use opsradar_core::ScanScope;
use opsradar_core::time::window_start;
use opsradar_risk::{ForecastInput, ForecastParams, InventoryForecastJob};

use crate::error::ScanError;
use crate::store::OpsStore;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ForecastRun {
    pub forecasts: u64,
    pub flags: u64,
}

/// Recompute every forecast and risk flag in `scope`.
///
/// All reads happen before the replace; a failed read leaves the existing rows
/// untouched and the call can simply be retried.
#[instrument(skip(store), fields(business_id = ?scope.business_id, warehouse_id = ?scope.warehouse_id), err)]
pub async fn recompute_inventory_forecasts<S>(
    store: &S,
    scope: ScanScope,
    params: ForecastParams,
    now: DateTime<Utc>,
) -> Result<ForecastRun, ScanError>
where
    S: OpsStore + ?Sized,
{
    params.validate()?;

    let stock_levels = store.load_stock_levels(scope).await?;
    let since = window_start(now, params.movement_lookback_days());
    let movements = store.load_movements(scope, since).await?;

    let outcome = InventoryForecastJob::new(ForecastInput { stock_levels, movements })
        .with_params(params)
        .run(now)?;

    store
        .replace_inventory_outputs(scope, &outcome.forecasts, &outcome.flags)
        .await?;

    let run = ForecastRun {
        forecasts: outcome.forecasts.len() as u64,
        flags: outcome.flags.len() as u64,
    };
    info!(forecasts = run.forecasts, flags = run.flags, "inventory forecasts replaced");
    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use opsradar_core::{BusinessId, ProductId, WarehouseId};
    use opsradar_risk::{FlagType, MovementRecord, RiskLevel, StockLevel};

    use crate::store::{InMemoryOpsStore, StoreError, StoreOperation};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    fn stock(business_id: BusinessId, warehouse_id: WarehouseId, on_hand: i64) -> StockLevel {
        StockLevel {
            business_id,
            product_id: ProductId::new(),
            warehouse_id,
            quantity_on_hand: on_hand,
            quantity_reserved: 0,
            reorder_point: 10,
            product_name: Some("Arabica 1kg".to_string()),
            product_sku: Some("ARA-1".to_string()),
            warehouse_name: Some("Main".to_string()),
        }
    }

    fn outbound(s: &StockLevel, quantity: i64, days_ago: i64) -> MovementRecord {
        MovementRecord {
            product_id: s.product_id,
            from_warehouse_id: Some(s.warehouse_id),
            to_warehouse_id: None,
            quantity,
            occurred_at: now() - Duration::days(days_ago),
        }
    }

    #[tokio::test]
    async fn steady_usage_and_fast_runout() {
        let store = InMemoryOpsStore::new();
        let business = BusinessId::new();
        let warehouse = WarehouseId::new();

        let steady = stock(business, warehouse, 100);
        let busy = stock(business, warehouse, 100);
        store.seed_stock_level(steady.clone());
        store.seed_stock_level(busy.clone());
        store.seed_movement(business, outbound(&steady, 60, 3));
        store.seed_movement(business, outbound(&busy, 1_200, 3));

        let run = recompute_inventory_forecasts(&store, ScanScope::all(), ForecastParams::default(), now())
            .await
            .unwrap();
        assert_eq!(run.forecasts, 2);

        let forecasts = store.forecasts();
        let f = forecasts.iter().find(|f| f.product_id == steady.product_id).unwrap();
        assert_eq!(f.avg_daily_usage, 1.0);
        assert_eq!(f.forecast_demand, 30.0);
        assert_eq!(f.days_until_runout, Some(100));
        assert_eq!(f.risk_level, RiskLevel::Low);

        let f = forecasts.iter().find(|f| f.product_id == busy.product_id).unwrap();
        assert_eq!(f.avg_daily_usage, 20.0);
        assert_eq!(f.days_until_runout, Some(5));
        assert_eq!(f.risk_level, RiskLevel::Critical);
    }

    #[tokio::test]
    async fn rerun_with_same_clock_is_identical() {
        let store = InMemoryOpsStore::new();
        let business = BusinessId::new();
        let s = stock(business, WarehouseId::new(), 40);
        store.seed_stock_level(s.clone());
        store.seed_movement(business, outbound(&s, 5, 120));

        let params = ForecastParams::default();
        recompute_inventory_forecasts(&store, ScanScope::all(), params, now()).await.unwrap();
        let (forecasts, flags) = (store.forecasts(), store.flags());

        recompute_inventory_forecasts(&store, ScanScope::all(), params, now()).await.unwrap();
        assert_eq!(store.forecasts(), forecasts);
        assert_eq!(store.flags(), flags);
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].flag_type, FlagType::DeadStock);
    }

    #[tokio::test]
    async fn stale_pairs_disappear_on_replace() {
        let store = InMemoryOpsStore::new();
        let business = BusinessId::new();
        let kept = stock(business, WarehouseId::new(), 10);
        let dropped = stock(business, WarehouseId::new(), 10);
        store.seed_stock_level(kept.clone());
        store.seed_stock_level(dropped.clone());
        let params = ForecastParams::default();

        recompute_inventory_forecasts(&store, ScanScope::all(), params, now()).await.unwrap();
        assert_eq!(store.forecasts().len(), 2);

        store.remove_stock_level(business, dropped.product_id, dropped.warehouse_id);
        recompute_inventory_forecasts(&store, ScanScope::all(), params, now()).await.unwrap();

        let forecasts = store.forecasts();
        assert_eq!(forecasts.len(), 1);
        assert_eq!(forecasts[0].product_id, kept.product_id);
    }

    #[tokio::test]
    async fn read_failure_leaves_existing_rows() {
        let store = InMemoryOpsStore::new();
        store.seed_stock_level(stock(BusinessId::new(), WarehouseId::new(), 10));
        let params = ForecastParams::default();
        recompute_inventory_forecasts(&store, ScanScope::all(), params, now()).await.unwrap();

        store.fail_on(StoreOperation::LoadMovements);
        let err = recompute_inventory_forecasts(&store, ScanScope::all(), params, now())
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Store(StoreError::Unavailable(_))));
        assert_eq!(store.forecasts().len(), 1);
    }

    #[tokio::test]
    async fn scoped_run_leaves_other_businesses_alone() {
        let store = InMemoryOpsStore::new();
        let (b1, b2) = (BusinessId::new(), BusinessId::new());
        store.seed_stock_level(stock(b1, WarehouseId::new(), 10));
        store.seed_stock_level(stock(b2, WarehouseId::new(), 10));
        let params = ForecastParams::default();
        recompute_inventory_forecasts(&store, ScanScope::all(), params, now()).await.unwrap();

        let run = recompute_inventory_forecasts(&store, ScanScope::for_business(b1), params, now())
            .await
            .unwrap();
        assert_eq!(run.forecasts, 1);
        assert_eq!(store.forecasts().len(), 2);
    }

    #[tokio::test]
    async fn invalid_params_are_rejected_before_reading() {
        let store = InMemoryOpsStore::new();
        store.fail_on(StoreOperation::LoadStockLevels);
        let params = ForecastParams { horizon_days: 0, ..ForecastParams::default() };

        let err = recompute_inventory_forecasts(&store, ScanScope::all(), params, now())
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Risk(_)));
    }
}
