//! Durable risk findings and the action-queue items they fan out to.

use core::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use opsradar_core::{ActionItemId, BusinessId, DomainError, InsightId};

use crate::scoring::{RiskLevel, Score};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Store,
    Invoice,
    InventoryItem,
    FieldAgent,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Store => "store",
            EntityType::Invoice => "invoice",
            EntityType::InventoryItem => "inventory_item",
            EntityType::FieldAgent => "field_agent",
        }
    }
}

impl FromStr for EntityType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "store" => Ok(EntityType::Store),
            "invoice" => Ok(EntityType::Invoice),
            "inventory_item" => Ok(EntityType::InventoryItem),
            "field_agent" => Ok(EntityType::FieldAgent),
            other => Err(DomainError::unknown_variant("entity type", other)),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskType {
    StoreChurn,
    InvoiceNonPayment,
    InventoryShortage,
    AgentInactivity,
}

impl RiskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskType::StoreChurn => "store_churn",
            RiskType::InvoiceNonPayment => "invoice_non_payment",
            RiskType::InventoryShortage => "inventory_shortage",
            RiskType::AgentInactivity => "agent_inactivity",
        }
    }
}

impl FromStr for RiskType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "store_churn" => Ok(RiskType::StoreChurn),
            "invoice_non_payment" => Ok(RiskType::InvoiceNonPayment),
            "inventory_shortage" => Ok(RiskType::InventoryShortage),
            "agent_inactivity" => Ok(RiskType::AgentInactivity),
            other => Err(DomainError::unknown_variant("risk type", other)),
        }
    }
}

/// Operator-facing lifecycle. The engine only ever writes `Open`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightStatus {
    Open,
    Resolved,
    Ignored,
}

impl InsightStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightStatus::Open => "open",
            InsightStatus::Resolved => "resolved",
            InsightStatus::Ignored => "ignored",
        }
    }
}

impl FromStr for InsightStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(InsightStatus::Open),
            "resolved" => Ok(InsightStatus::Resolved),
            "ignored" => Ok(InsightStatus::Ignored),
            other => Err(DomainError::unknown_variant("insight status", other)),
        }
    }
}

/// Audit payload, one typed variant per risk type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "risk_type", rename_all = "snake_case")]
pub enum SourceData {
    StoreChurn {
        days_since_visit: i64,
        last_visit_at: Option<DateTime<Utc>>,
        store_status: String,
    },
    InvoiceNonPayment {
        days_overdue: i64,
        amount_due: u64,
        due_date: Option<NaiveDate>,
        /// `true` when no due date existed and creation time was used.
        from_created_at: bool,
    },
    InventoryShortage {
        quantity: i64,
        reorder_point: i64,
        stock_ratio: f64,
    },
    AgentInactivity {
        days_since_payout: i64,
        last_payout_at: DateTime<Utc>,
        lifetime_earnings: u64,
    },
}

impl SourceData {
    pub fn risk_type(&self) -> RiskType {
        match self {
            SourceData::StoreChurn { .. } => RiskType::StoreChurn,
            SourceData::InvoiceNonPayment { .. } => RiskType::InvoiceNonPayment,
            SourceData::InventoryShortage { .. } => RiskType::InventoryShortage,
            SourceData::AgentInactivity { .. } => RiskType::AgentInactivity,
        }
    }
}

/// Identity of an open insight.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InsightKey {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub risk_type: RiskType,
}

impl core::fmt::Display for InsightKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}:{}", self.entity_type.as_str(), self.entity_id, self.risk_type.as_str())
    }
}

/// A computed, not-yet-persisted finding for one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub business_id: BusinessId,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub score: Score,
    pub headline: String,
    pub details: String,
    pub recommended_action: String,
    pub source_data: SourceData,
}

impl Finding {
    pub fn risk_type(&self) -> RiskType {
        self.source_data.risk_type()
    }

    pub fn key(&self) -> InsightKey {
        InsightKey {
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            risk_type: self.risk_type(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskInsight {
    pub id: InsightId,
    pub business_id: BusinessId,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub risk_type: RiskType,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub headline: String,
    pub details: String,
    pub recommended_action: String,
    pub source_data: SourceData,
    pub status: InsightStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl RiskInsight {
    /// New open insight from a finding.
    pub fn open(finding: Finding, now: DateTime<Utc>) -> Self {
        let risk_type = finding.risk_type();
        Self {
            id: InsightId::new(),
            business_id: finding.business_id,
            entity_type: finding.entity_type,
            entity_id: finding.entity_id,
            risk_type,
            risk_score: finding.score.value,
            risk_level: finding.score.level,
            headline: finding.headline,
            details: finding.details,
            recommended_action: finding.recommended_action,
            source_data: finding.source_data,
            status: InsightStatus::Open,
            created_at: now,
            updated_at: now,
            expires_at: None,
        }
    }

    pub fn key(&self) -> InsightKey {
        InsightKey {
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            risk_type: self.risk_type,
        }
    }

    /// Overwrite the computed fields in place; identity and `created_at` stay.
    pub fn refresh(&mut self, finding: &Finding, now: DateTime<Utc>) {
        self.risk_score = finding.score.value;
        self.risk_level = finding.score.level;
        self.headline.clone_from(&finding.headline);
        self.details.clone_from(&finding.details);
        self.recommended_action.clone_from(&finding.recommended_action);
        self.source_data = finding.source_data.clone();
        self.updated_at = now;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
        }
    }
}

/// Row for downstream notification/automation consumers. Insert-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionQueueItem {
    pub id: ActionItemId,
    pub business_id: BusinessId,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub insight_id: InsightId,
    pub suggested_action: String,
    pub reason: String,
    pub urgency: u8,
    pub status: ActionStatus,
    pub created_at: DateTime<Utc>,
}

impl ActionQueueItem {
    /// Companion item for a freshly created high/critical insight.
    pub fn for_new_insight(insight: &RiskInsight, now: DateTime<Utc>) -> Option<Self> {
        let urgency = insight.risk_level.action_urgency()?;
        Some(Self {
            id: ActionItemId::new(),
            business_id: insight.business_id,
            entity_type: insight.entity_type,
            entity_id: insight.entity_id,
            insight_id: insight.id,
            suggested_action: insight.recommended_action.clone(),
            reason: insight.headline.clone(),
            urgency,
            status: ActionStatus::Pending,
            created_at: now,
        })
    }
}
