//! The four entity scan domains.
//!
//! Each domain supplies a signal extractor, a scoring curve and the wording of
//! its finding. Loading entities and persisting findings is the caller's job.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use opsradar_core::time::{days_past, days_since};
use opsradar_core::{AgentId, BusinessId, InventoryItemId, InvoiceId, StoreId, WarehouseId};

use crate::forecast::UNKNOWN_LABEL;
use crate::insight::{EntityType, Finding, RiskType, SourceData};
use crate::scoring::{
    AGENT_INACTIVITY_CURVE, INVENTORY_SHORTAGE_CURVE, INVOICE_NON_PAYMENT_CURVE, RiskLevel,
    STORE_CHURN_CURVE,
};

/// A scan domain over one entity type.
pub trait RiskDomain: Send + Sync {
    type Entity: Send + Sync;

    /// Short stable name used in logs and stats.
    fn name(&self) -> &'static str;

    fn risk_type(&self) -> RiskType;

    /// Score one entity. `None` means healthy (below threshold or not eligible).
    fn evaluate(&self, entity: &Self::Entity, now: DateTime<Utc>) -> Option<Finding>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreVisit {
    pub store_id: StoreId,
    pub business_id: BusinessId,
    pub name: Option<String>,
    pub status: String,
    pub last_visit_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl StoreVisit {
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case("active")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutstandingInvoice {
    pub invoice_id: InvoiceId,
    pub business_id: BusinessId,
    pub invoice_number: Option<String>,
    pub customer_name: Option<String>,
    /// Minor currency units.
    pub amount_due: u64,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderItem {
    pub item_id: InventoryItemId,
    pub business_id: BusinessId,
    pub warehouse_id: Option<WarehouseId>,
    pub product_name: Option<String>,
    pub warehouse_name: Option<String>,
    pub quantity: i64,
    pub reorder_point: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentActivity {
    pub agent_id: AgentId,
    pub business_id: BusinessId,
    pub name: Option<String>,
    /// Minor currency units.
    pub lifetime_earnings: u64,
    pub last_payout_at: Option<DateTime<Utc>>,
}

/// Render minor units as `1,234.56`.
pub fn format_amount(minor: u64) -> String {
    let major = (minor / 100).to_string();
    let mut grouped = String::with_capacity(major.len() + major.len() / 3);
    for (i, ch) in major.chars().enumerate() {
        if i > 0 && (major.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{grouped}.{:02}", minor % 100)
}

/// Stores that have gone quiet.
#[derive(Debug, Copy, Clone, Default)]
pub struct StoreChurn;

impl RiskDomain for StoreChurn {
    type Entity = StoreVisit;

    fn name(&self) -> &'static str {
        "store_churn"
    }

    fn risk_type(&self) -> RiskType {
        RiskType::StoreChurn
    }

    fn evaluate(&self, store: &StoreVisit, now: DateTime<Utc>) -> Option<Finding> {
        // never visited: count from onboarding
        let since = store.last_visit_at.unwrap_or(store.created_at);
        let days = days_since(since, now);
        let score = STORE_CHURN_CURVE.score(days as f64)?;

        let name = store.name.as_deref().unwrap_or(UNKNOWN_LABEL);
        let last_visit = match store.last_visit_at {
            Some(at) => format!("Last visit on {}.", at.date_naive()),
            None => format!("No visit recorded since onboarding on {}.", store.created_at.date_naive()),
        };
        let recommended_action = match score.level {
            RiskLevel::Critical => "Schedule an in-person visit within 48 hours and confirm the account is still trading",
            RiskLevel::High => "Schedule a visit this week",
            RiskLevel::Medium | RiskLevel::Low => "Add the store to the next route plan",
        };

        Some(Finding {
            business_id: store.business_id,
            entity_type: EntityType::Store,
            entity_id: *store.store_id.as_uuid(),
            score,
            headline: format!("{name} not visited in {days} days ({})", store.status),
            details: format!("{last_visit} Stores without a visit for 30+ days are at high risk of churn."),
            recommended_action: recommended_action.to_string(),
            source_data: SourceData::StoreChurn {
                days_since_visit: days,
                last_visit_at: store.last_visit_at,
                store_status: store.status.clone(),
            },
        })
    }
}

/// Unpaid invoices past due.
#[derive(Debug, Copy, Clone, Default)]
pub struct InvoiceNonPayment;

impl RiskDomain for InvoiceNonPayment {
    type Entity = OutstandingInvoice;

    fn name(&self) -> &'static str {
        "invoice_non_payment"
    }

    fn risk_type(&self) -> RiskType {
        RiskType::InvoiceNonPayment
    }

    fn evaluate(&self, invoice: &OutstandingInvoice, now: DateTime<Utc>) -> Option<Finding> {
        let (days, from_created_at) = match invoice.due_date {
            Some(due) => (days_past(due, now.date_naive()), false),
            None => (days_since(invoice.created_at, now), true),
        };
        let score = INVOICE_NON_PAYMENT_CURVE.score_with_basis(days as f64, invoice.amount_due as f64)?;

        let number = invoice.invoice_number.as_deref().unwrap_or(UNKNOWN_LABEL);
        let customer = invoice.customer_name.as_deref().unwrap_or(UNKNOWN_LABEL);
        let amount = format_amount(invoice.amount_due);
        let reference = if from_created_at {
            "since it was issued (no due date)"
        } else {
            "past its due date"
        };
        let recommended_action = match score.level {
            RiskLevel::Critical => "Escalate to collections and put further credit for this customer on hold",
            RiskLevel::High => "Call the customer to agree a payment date",
            RiskLevel::Medium | RiskLevel::Low => "Send a payment reminder",
        };

        Some(Finding {
            business_id: invoice.business_id,
            entity_type: EntityType::Invoice,
            entity_id: *invoice.invoice_id.as_uuid(),
            score,
            headline: format!("Invoice {number} for {customer} is {days} days overdue ({amount})"),
            details: format!("{amount} outstanding for {days} days {reference}."),
            recommended_action: recommended_action.to_string(),
            source_data: SourceData::InvoiceNonPayment {
                days_overdue: days,
                amount_due: invoice.amount_due,
                due_date: invoice.due_date,
                from_created_at,
            },
        })
    }
}

/// Items at or below their reorder point.
#[derive(Debug, Copy, Clone, Default)]
pub struct InventoryShortage;

impl RiskDomain for InventoryShortage {
    type Entity = ReorderItem;

    fn name(&self) -> &'static str {
        "inventory_shortage"
    }

    fn risk_type(&self) -> RiskType {
        RiskType::InventoryShortage
    }

    fn evaluate(&self, item: &ReorderItem, _now: DateTime<Utc>) -> Option<Finding> {
        // untracked without a reorder point
        if item.reorder_point <= 0 || item.quantity > item.reorder_point {
            return None;
        }

        let stock_ratio = item.quantity as f64 / item.reorder_point as f64;
        let score = INVENTORY_SHORTAGE_CURVE.score(1.0 - stock_ratio)?;

        let product = item.product_name.as_deref().unwrap_or(UNKNOWN_LABEL);
        let warehouse = item.warehouse_name.as_deref().unwrap_or(UNKNOWN_LABEL);
        let state = if item.quantity <= 0 { "out of stock" } else { "below reorder point" };
        let recommended_action = match score.level {
            RiskLevel::Critical => "Raise an urgent purchase order or transfer stock from another warehouse",
            RiskLevel::High => "Raise a purchase order today",
            RiskLevel::Medium | RiskLevel::Low => "Include in the next scheduled purchase order",
        };

        Some(Finding {
            business_id: item.business_id,
            entity_type: EntityType::InventoryItem,
            entity_id: *item.item_id.as_uuid(),
            score,
            headline: format!("{product} at {warehouse} is {state}"),
            details: format!(
                "{} units on hand against a reorder point of {} ({:.0}% of reorder point).",
                item.quantity,
                item.reorder_point,
                (stock_ratio * 100.0).max(0.0)
            ),
            recommended_action: recommended_action.to_string(),
            source_data: SourceData::InventoryShortage {
                quantity: item.quantity,
                reorder_point: item.reorder_point,
                stock_ratio,
            },
        })
    }
}

/// Earning agents whose payouts stopped.
#[derive(Debug, Copy, Clone, Default)]
pub struct AgentInactivity;

impl RiskDomain for AgentInactivity {
    type Entity = AgentActivity;

    fn name(&self) -> &'static str {
        "agent_inactivity"
    }

    fn risk_type(&self) -> RiskType {
        RiskType::AgentInactivity
    }

    fn evaluate(&self, agent: &AgentActivity, now: DateTime<Utc>) -> Option<Finding> {
        // agents with no earnings are new, not inactive
        if agent.lifetime_earnings == 0 {
            return None;
        }
        let last_payout_at = agent.last_payout_at?;
        let days = days_since(last_payout_at, now);
        let score = AGENT_INACTIVITY_CURVE.score(days as f64)?;

        let name = agent.name.as_deref().unwrap_or(UNKNOWN_LABEL);
        let recommended_action = match score.level {
            RiskLevel::Critical => "Contact the agent directly and review their territory assignment",
            RiskLevel::High => "Check in with the agent this week",
            RiskLevel::Medium | RiskLevel::Low => "Send the agent a re-engagement message",
        };

        Some(Finding {
            business_id: agent.business_id,
            entity_type: EntityType::FieldAgent,
            entity_id: *agent.agent_id.as_uuid(),
            score,
            headline: format!("{name} has had no payout for {days} days"),
            details: format!(
                "Last payout on {}; lifetime earnings {}.",
                last_payout_at.date_naive(),
                format_amount(agent.lifetime_earnings)
            ),
            recommended_action: recommended_action.to_string(),
            source_data: SourceData::AgentInactivity {
                days_since_payout: days,
                last_payout_at,
                lifetime_earnings: agent.lifetime_earnings,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    fn store(last_visit_days_ago: Option<i64>) -> StoreVisit {
        StoreVisit {
            store_id: StoreId::new(),
            business_id: BusinessId::new(),
            name: Some("Corner Mart".to_string()),
            status: "active".to_string(),
            last_visit_at: last_visit_days_ago.map(|d| now() - Duration::days(d)),
            created_at: now() - Duration::days(365),
        }
    }

    fn invoice(due_days_ago: Option<i64>, amount_due: u64) -> OutstandingInvoice {
        OutstandingInvoice {
            invoice_id: InvoiceId::new(),
            business_id: BusinessId::new(),
            invoice_number: Some("INV-1042".to_string()),
            customer_name: None,
            amount_due,
            due_date: due_days_ago.map(|d| (now() - Duration::days(d)).date_naive()),
            created_at: now() - Duration::days(40),
        }
    }

    fn item(quantity: i64, reorder_point: i64) -> ReorderItem {
        ReorderItem {
            item_id: InventoryItemId::new(),
            business_id: BusinessId::new(),
            warehouse_id: None,
            product_name: Some("Robusta 500g".to_string()),
            warehouse_name: None,
            quantity,
            reorder_point,
        }
    }

    fn agent(earnings: u64, payout_days_ago: Option<i64>) -> AgentActivity {
        AgentActivity {
            agent_id: AgentId::new(),
            business_id: BusinessId::new(),
            name: Some("Somchai".to_string()),
            lifetime_earnings: earnings,
            last_payout_at: payout_days_ago.map(|d| now() - Duration::days(d)),
        }
    }

    #[test]
    fn store_visited_yesterday_is_healthy() {
        assert!(StoreChurn.evaluate(&store(Some(1)), now()).is_none());
        assert!(StoreChurn.evaluate(&store(Some(6)), now()).is_none());
    }

    #[test]
    fn store_unvisited_for_31_days_is_critical() {
        let f = StoreChurn.evaluate(&store(Some(31)), now()).unwrap();
        assert_eq!(f.score.level, RiskLevel::Critical);
        assert_eq!(f.entity_type, EntityType::Store);
        assert_eq!(f.risk_type(), RiskType::StoreChurn);
        assert_eq!(f.headline, "Corner Mart not visited in 31 days (active)");
    }

    #[test]
    fn never_visited_store_counts_from_creation() {
        let f = StoreChurn.evaluate(&store(None), now()).unwrap();
        assert_eq!(f.score.value, 100);
        assert!(f.details.contains("No visit recorded"));
    }

    #[test]
    fn large_invoice_twenty_days_overdue_is_critical() {
        let f = InvoiceNonPayment.evaluate(&invoice(Some(20), 600_000), now()).unwrap();
        assert_eq!(f.score.value, 88);
        assert_eq!(f.score.level, RiskLevel::Critical);
        assert!(f.headline.contains("6,000.00"));
        assert!(f.headline.contains("Unknown"));
    }

    #[test]
    fn invoice_without_due_date_uses_creation() {
        let f = InvoiceNonPayment.evaluate(&invoice(None, 1_000), now()).unwrap();
        match f.source_data {
            SourceData::InvoiceNonPayment { days_overdue, from_created_at, .. } => {
                assert_eq!(days_overdue, 40);
                assert!(from_created_at);
            }
            other => panic!("unexpected source data: {other:?}"),
        }
    }

    #[test]
    fn invoice_not_yet_due_is_healthy() {
        assert!(InvoiceNonPayment.evaluate(&invoice(Some(-5), 900_000), now()).is_none());
        assert!(InvoiceNonPayment.evaluate(&invoice(Some(6), 900_000), now()).is_none());
    }

    #[test]
    fn shortage_scores_by_ratio_to_reorder_point() {
        assert!(InventoryShortage.evaluate(&item(21, 20), now()).is_none());
        assert_eq!(InventoryShortage.evaluate(&item(20, 20), now()).unwrap().score.value, 40);
        assert_eq!(InventoryShortage.evaluate(&item(10, 20), now()).unwrap().score.value, 60);
        assert_eq!(InventoryShortage.evaluate(&item(5, 20), now()).unwrap().score.value, 80);

        let empty = InventoryShortage.evaluate(&item(0, 20), now()).unwrap();
        assert_eq!(empty.score.value, 100);
        assert!(empty.headline.ends_with("out of stock"));

        assert_eq!(InventoryShortage.evaluate(&item(-3, 20), now()).unwrap().score.value, 100);
    }

    #[test]
    fn items_without_reorder_point_are_untracked() {
        assert!(InventoryShortage.evaluate(&item(0, 0), now()).is_none());
    }

    #[test]
    fn agents_without_earnings_are_excluded() {
        assert!(AgentInactivity.evaluate(&agent(0, Some(90)), now()).is_none());
        assert!(AgentInactivity.evaluate(&agent(0, None), now()).is_none());
    }

    #[test]
    fn earning_agent_never_paid_out_is_skipped() {
        // no payout date to measure from, however large the earnings
        assert!(AgentInactivity.evaluate(&agent(5_000, None), now()).is_none());
        assert!(AgentInactivity.evaluate(&agent(u64::MAX, None), now()).is_none());
    }

    #[test]
    fn agent_inactivity_bands() {
        assert!(AgentInactivity.evaluate(&agent(5_000, Some(13)), now()).is_none());
        assert_eq!(AgentInactivity.evaluate(&agent(5_000, Some(14)), now()).unwrap().score.value, 40);
        assert_eq!(AgentInactivity.evaluate(&agent(5_000, Some(30)), now()).unwrap().score.value, 70);
        assert_eq!(AgentInactivity.evaluate(&agent(5_000, Some(90)), now()).unwrap().score.value, 100);
    }

    #[test]
    fn amounts_are_grouped() {
        assert_eq!(format_amount(0), "0.00");
        assert_eq!(format_amount(99_905), "999.05");
        assert_eq!(format_amount(123_456_789), "1,234,567.89");
    }
}
