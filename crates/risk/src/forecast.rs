//! Inventory runout forecasting.
//!
//! Model:
//! - Sum outbound movement per (product, warehouse) over the trailing
//!   `history_days` window to get an average daily usage.
//! - Project that usage forward `horizon_days` for demand and divide the
//!   available quantity by it for days until runout.
//! - Classify runout against a supplier lead time.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use opsradar_core::time::{add_days, window_start};
use opsradar_core::{BusinessId, ProductId, WarehouseId};

use crate::error::RiskError;
use crate::flags::{DEAD_STOCK_CRITICAL_DAYS, InventoryRiskFlag, detect_flags};
use crate::scoring::RiskLevel;

/// Placeholder for joined display fields that are missing.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Stock position of one product in one warehouse (read-only input).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub business_id: BusinessId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity_on_hand: i64,
    pub quantity_reserved: i64,
    pub reorder_point: i64,
    pub product_name: Option<String>,
    pub product_sku: Option<String>,
    pub warehouse_name: Option<String>,
}

impl StockLevel {
    /// On-hand minus reserved. Negative only transiently.
    pub fn available(&self) -> i64 {
        self.quantity_on_hand - self.quantity_reserved
    }

    pub fn key(&self) -> StockKey {
        StockKey {
            product_id: self.product_id,
            warehouse_id: self.warehouse_id,
        }
    }

    pub fn product_label(&self) -> &str {
        self.product_name.as_deref().unwrap_or(UNKNOWN_LABEL)
    }

    pub fn warehouse_label(&self) -> &str {
        self.warehouse_name.as_deref().unwrap_or(UNKNOWN_LABEL)
    }
}

/// Stock transfer/consumption record. Outbound when `from_warehouse_id` is
/// set, inbound when `to_warehouse_id` is set (both for transfers).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub product_id: ProductId,
    pub from_warehouse_id: Option<WarehouseId>,
    pub to_warehouse_id: Option<WarehouseId>,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StockKey {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
}

/// Per-(product, warehouse) movement rollup.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct MovementAggregate {
    /// Σ|quantity| of outbound movements inside the usage window.
    pub outbound: u64,
    /// Latest movement touching the warehouse as source or destination.
    pub last_movement_at: Option<DateTime<Utc>>,
}

impl MovementAggregate {
    fn touch(&mut self, at: DateTime<Utc>) {
        self.last_movement_at = Some(self.last_movement_at.map_or(at, |prev| prev.max(at)));
    }
}

/// Roll movements up per (product, warehouse).
///
/// Only movements at or after `usage_since` count toward `outbound`; every
/// movement passed in counts toward `last_movement_at`.
pub fn aggregate_movements(
    movements: &[MovementRecord],
    usage_since: DateTime<Utc>,
) -> HashMap<StockKey, MovementAggregate> {
    let mut out: HashMap<StockKey, MovementAggregate> = HashMap::new();

    for m in movements {
        if let Some(from) = m.from_warehouse_id {
            let agg = out
                .entry(StockKey {
                    product_id: m.product_id,
                    warehouse_id: from,
                })
                .or_default();
            if m.occurred_at >= usage_since {
                agg.outbound = agg.outbound.saturating_add(m.quantity.unsigned_abs());
            }
            agg.touch(m.occurred_at);
        }
        if let Some(to) = m.to_warehouse_id {
            out.entry(StockKey {
                product_id: m.product_id,
                warehouse_id: to,
            })
            .or_default()
            .touch(m.occurred_at);
        }
    }

    out
}

/// Forecast tuning.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastParams {
    pub horizon_days: u32,
    pub history_days: u32,
    /// Fixed supplier lead time; a per-product lookup is not wired in yet.
    pub lead_time_days: u32,
}

impl Default for ForecastParams {
    fn default() -> Self {
        Self {
            horizon_days: 30,
            history_days: 60,
            lead_time_days: 10,
        }
    }
}

/// Upper bound for `horizon_days` and `history_days` (ten years).
pub const MAX_WINDOW_DAYS: u32 = 3_650;

impl ForecastParams {
    pub fn validate(&self) -> Result<(), RiskError> {
        if self.horizon_days == 0 {
            return Err(RiskError::InvalidInput("horizon_days must be >= 1".to_string()));
        }
        if self.history_days == 0 {
            return Err(RiskError::InvalidInput("history_days must be >= 1".to_string()));
        }
        if self.horizon_days > MAX_WINDOW_DAYS || self.history_days > MAX_WINDOW_DAYS {
            return Err(RiskError::InvalidInput(format!(
                "horizon_days and history_days must be <= {MAX_WINDOW_DAYS}"
            )));
        }
        Ok(())
    }

    /// How far back movements must be loaded: the usage window, widened so
    /// dead stock can be told apart up to the critical threshold.
    pub fn movement_lookback_days(&self) -> u32 {
        self.history_days.max(DEAD_STOCK_CRITICAL_DAYS as u32)
    }
}

/// Derived forecast row for one (business, product, warehouse).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryForecast {
    pub business_id: BusinessId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub horizon_days: u32,
    pub avg_daily_usage: f64,
    pub forecast_demand: f64,
    pub available: i64,
    pub days_until_runout: Option<i64>,
    pub projected_runout_date: Option<NaiveDate>,
    pub risk_level: RiskLevel,
    pub risk_reason: String,
    pub suggestion: String,
    pub calculated_at: DateTime<Utc>,
}

/// Forecast a single stock level.
pub fn forecast_stock_level(
    stock: &StockLevel,
    movement: Option<&MovementAggregate>,
    params: &ForecastParams,
    now: DateTime<Utc>,
) -> InventoryForecast {
    let outbound = movement.map_or(0, |m| m.outbound);
    let avg_daily_usage = outbound as f64 / f64::from(params.history_days.max(1));
    let available = stock.available();
    let forecast_demand = avg_daily_usage * f64::from(params.horizon_days);

    let days_until_runout = if avg_daily_usage > 0.0 {
        Some((available as f64 / avg_daily_usage).floor() as i64)
    } else {
        None
    };
    let projected_runout_date = days_until_runout.and_then(|d| add_days(now.date_naive(), d));

    let (risk_level, risk_reason, suggestion) = classify_runout(
        stock,
        avg_daily_usage,
        available,
        days_until_runout,
        forecast_demand,
        params,
    );

    InventoryForecast {
        business_id: stock.business_id,
        product_id: stock.product_id,
        warehouse_id: stock.warehouse_id,
        horizon_days: params.horizon_days,
        avg_daily_usage,
        forecast_demand,
        available,
        days_until_runout,
        projected_runout_date,
        risk_level,
        risk_reason,
        suggestion,
        calculated_at: now,
    }
}

fn classify_runout(
    stock: &StockLevel,
    avg_daily_usage: f64,
    available: i64,
    days_until_runout: Option<i64>,
    forecast_demand: f64,
    params: &ForecastParams,
) -> (RiskLevel, String, String) {
    let lead = i64::from(params.lead_time_days);
    let product = stock.product_label();

    if avg_daily_usage <= 0.0 && available > 0 {
        return (
            RiskLevel::Low,
            format!(
                "No recent usage in the last {} days, pattern unclear",
                params.history_days
            ),
            format!("Review whether {product} is still active before reordering"),
        );
    }

    if available <= 0 {
        return (
            RiskLevel::Critical,
            format!("Out of stock ({available} units available)"),
            format!("Reorder {product} immediately; new orders cannot be fulfilled"),
        );
    }

    // usage > 0 and available > 0 from here on
    let days = days_until_runout.unwrap_or(0);
    let reorder_qty = forecast_demand.ceil() as i64;

    if days <= lead {
        (
            RiskLevel::Critical,
            format!(
                "Stock runs out in {days} days at {avg_daily_usage:.1} units/day, within the {lead}-day lead time"
            ),
            format!("Place a purchase order now for at least {reorder_qty} units"),
        )
    } else if days <= lead + 7 {
        (
            RiskLevel::High,
            format!(
                "Stock runs out in {days} days at {avg_daily_usage:.1} units/day, less than a week past lead time"
            ),
            format!("Reorder this week; {}-day demand is about {reorder_qty} units", params.horizon_days),
        )
    } else if days <= lead + 21 {
        (
            RiskLevel::Medium,
            format!("Stock runs out in {days} days at {avg_daily_usage:.1} units/day"),
            "Plan a reorder within the next two weeks".to_string(),
        )
    } else {
        (
            RiskLevel::Low,
            format!("Stock covers {days} days at {avg_daily_usage:.1} units/day"),
            "No action needed".to_string(),
        )
    }
}

/// Input snapshot for one forecast run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForecastInput {
    pub stock_levels: Vec<StockLevel>,
    /// Movements since `now - params.movement_lookback_days()`.
    pub movements: Vec<MovementRecord>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastOutcome {
    pub forecasts: Vec<InventoryForecast>,
    pub flags: Vec<InventoryRiskFlag>,
}

/// Deterministic forecast + risk flag job over one scope's stock.
#[derive(Debug, Clone)]
pub struct InventoryForecastJob {
    input: ForecastInput,
    params: ForecastParams,
}

impl InventoryForecastJob {
    pub fn new(input: ForecastInput) -> Self {
        Self {
            input,
            params: ForecastParams::default(),
        }
    }

    pub fn with_params(mut self, params: ForecastParams) -> Self {
        self.params = params;
        self
    }

    pub fn input(&self) -> &ForecastInput {
        &self.input
    }

    /// Produce one forecast per distinct (product, warehouse) and its flags.
    ///
    /// Duplicate stock rows for the same pair are ignored after the first, so
    /// the output never holds two forecasts for one identity.
    pub fn run(&self, now: DateTime<Utc>) -> Result<ForecastOutcome, RiskError> {
        self.params.validate()?;

        let usage_since = window_start(now, self.params.history_days);
        let aggregates = aggregate_movements(&self.input.movements, usage_since);

        let mut seen: HashSet<(BusinessId, StockKey)> = HashSet::new();
        let mut outcome = ForecastOutcome::default();

        for stock in &self.input.stock_levels {
            if !seen.insert((stock.business_id, stock.key())) {
                continue;
            }
            let movement = aggregates.get(&stock.key());
            let forecast = forecast_stock_level(stock, movement, &self.params, now);
            outcome.flags.extend(detect_flags(
                stock,
                &forecast,
                movement,
                self.params.movement_lookback_days(),
                now,
            ));
            outcome.forecasts.push(forecast);
        }

        Ok(outcome)
    }
}
