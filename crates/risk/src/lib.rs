//! Pure scoring, forecasting and classification logic for operational risk.
//!
//! Nothing here performs I/O: callers load entity rows, hand them to a
//! [`RiskDomain`] or [`InventoryForecastJob`], and persist what comes back.

pub mod domains;
pub mod error;
pub mod flags;
pub mod forecast;
pub mod insight;
pub mod scoring;
pub mod snapshot;

pub use domains::{
    AgentActivity, AgentInactivity, InventoryShortage, InvoiceNonPayment, OutstandingInvoice,
    ReorderItem, RiskDomain, StoreChurn, StoreVisit,
};
pub use error::RiskError;
pub use flags::{FlagType, InventoryRiskFlag};
pub use forecast::{
    ForecastInput, ForecastOutcome, ForecastParams, InventoryForecast, InventoryForecastJob,
    MovementRecord, StockLevel,
};
pub use insight::{
    ActionQueueItem, ActionStatus, EntityType, Finding, InsightKey, InsightStatus, RiskInsight,
    RiskType, SourceData,
};
pub use scoring::{RiskLevel, Score};
pub use snapshot::{InvoiceCounts, KpiSnapshot, SnapshotWrite, StoreCounts};
