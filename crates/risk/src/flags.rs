//! Dead-stock and overstock detection.
//!
//! Runs on the same per-row data as the runout forecast; the two predicates
//! are independent, so a pair may carry zero, one or both flags.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use opsradar_core::time::days_since;
use opsradar_core::{BusinessId, DomainError, ProductId, WarehouseId};

use crate::forecast::{InventoryForecast, MovementAggregate, StockLevel};
use crate::scoring::RiskLevel;

pub const DEAD_STOCK_DAYS: i64 = 90;
pub const DEAD_STOCK_CRITICAL_DAYS: i64 = 180;
pub const OVERSTOCK_RATIO: f64 = 2.0;
pub const OVERSTOCK_HIGH_RATIO: f64 = 4.0;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlagType {
    DeadStock,
    Overstock,
}

impl FlagType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagType::DeadStock => "DEAD_STOCK",
            FlagType::Overstock => "OVERSTOCK",
        }
    }
}

impl FromStr for FlagType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEAD_STOCK" => Ok(FlagType::DeadStock),
            "OVERSTOCK" => Ok(FlagType::Overstock),
            other => Err(DomainError::unknown_variant("flag type", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRiskFlag {
    pub business_id: BusinessId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub flag_type: FlagType,
    /// Medium, high or critical; never low.
    pub severity: RiskLevel,
    pub message: String,
    pub days_without_movement: Option<i64>,
    pub last_movement_at: Option<DateTime<Utc>>,
    pub calculated_at: DateTime<Utc>,
}

/// Evaluate both flag predicates for one stock level.
///
/// `lookback_days` is how far back movements were loaded; a pair with no
/// movement at all inside it has been idle at least that long.
pub fn detect_flags(
    stock: &StockLevel,
    forecast: &InventoryForecast,
    movement: Option<&MovementAggregate>,
    lookback_days: u32,
    now: DateTime<Utc>,
) -> Vec<InventoryRiskFlag> {
    let mut flags = Vec::new();
    if let Some(flag) = dead_stock(stock, movement, lookback_days, now) {
        flags.push(flag);
    }
    if let Some(flag) = overstock(stock, forecast, now) {
        flags.push(flag);
    }
    flags
}

fn dead_stock(
    stock: &StockLevel,
    movement: Option<&MovementAggregate>,
    lookback_days: u32,
    now: DateTime<Utc>,
) -> Option<InventoryRiskFlag> {
    if stock.quantity_on_hand <= 0 {
        return None;
    }

    let last_movement_at = movement.and_then(|m| m.last_movement_at);
    let days_without_movement = last_movement_at.map(|at| days_since(at, now));
    let idle_days = days_without_movement.unwrap_or(i64::from(lookback_days));

    if idle_days < DEAD_STOCK_DAYS {
        return None;
    }

    let severity = if idle_days >= DEAD_STOCK_CRITICAL_DAYS {
        RiskLevel::Critical
    } else {
        RiskLevel::High
    };

    let idle = match days_without_movement {
        Some(days) => format!("no movement for {days} days"),
        None => format!("no recorded movement in the last {lookback_days} days"),
    };
    let message = format!(
        "{} at {}: {} units on hand with {idle}. Consider a discount, a bundle offer or returning stock to the supplier.",
        stock.product_label(),
        stock.warehouse_label(),
        stock.quantity_on_hand,
    );

    Some(InventoryRiskFlag {
        business_id: stock.business_id,
        product_id: stock.product_id,
        warehouse_id: stock.warehouse_id,
        flag_type: FlagType::DeadStock,
        severity,
        message,
        days_without_movement,
        last_movement_at,
        calculated_at: now,
    })
}

fn overstock(stock: &StockLevel, forecast: &InventoryForecast, now: DateTime<Utc>) -> Option<InventoryRiskFlag> {
    if forecast.avg_daily_usage <= 0.0 || forecast.forecast_demand <= 0.0 {
        return None;
    }

    let available = forecast.available as f64;
    if available <= OVERSTOCK_RATIO * forecast.forecast_demand {
        return None;
    }

    let ratio = available / forecast.forecast_demand;
    let severity = if available > OVERSTOCK_HIGH_RATIO * forecast.forecast_demand {
        RiskLevel::High
    } else {
        RiskLevel::Medium
    };

    let message = format!(
        "{} at {}: {} units available is {ratio:.1}x the {}-day forecast demand of {:.0} units. Pause reorders or transfer stock to a busier location.",
        stock.product_label(),
        stock.warehouse_label(),
        forecast.available,
        forecast.horizon_days,
        forecast.forecast_demand,
    );

    Some(InventoryRiskFlag {
        business_id: stock.business_id,
        product_id: stock.product_id,
        warehouse_id: stock.warehouse_id,
        flag_type: FlagType::Overstock,
        severity,
        message,
        days_without_movement: None,
        last_movement_at: None,
        calculated_at: now,
    })
}
