//! Entity scan passes: load rows, score them, upsert open insights and fan
//! severe new ones out to the action queue.
//!
//! Sub-threshold entities are skipped entirely, so an open insight is never
//! closed by a scan; only operators resolve or ignore insights.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use opsradar_core::ScanScope;
use opsradar_risk::{
    ActionQueueItem, AgentInactivity, Finding, InventoryShortage, InvoiceNonPayment, RiskDomain,
    RiskInsight, StoreChurn,
};

use crate::error::ScanError;
use crate::store::{OpsStore, StoreError};

/// Find-then-write attempts before a conflicting upsert gives up.
pub const MAX_UPSERT_ATTEMPTS: u32 = 3;

/// Counts reported by one entity pass.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassStats {
    pub analyzed: u64,
    pub findings: u64,
    pub new_risks: u64,
    pub updated_risks: u64,
    pub actions_queued: u64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted { action_queued: bool },
    Updated,
}

/// Write one finding as the open insight for its key.
///
/// An existing open insight is refreshed in place (id and `created_at` kept).
/// Otherwise a new one is inserted and, when high or critical, an action item
/// is queued for it in the same store write. A conflict (another writer won the insert, or the row was
/// closed between read and update) restarts from the lookup.
pub async fn upsert_finding<S>(store: &S, finding: &Finding, now: DateTime<Utc>) -> Result<UpsertOutcome, StoreError>
where
    S: OpsStore + ?Sized,
{
    let key = finding.key();
    let mut attempt = 0;

    loop {
        attempt += 1;

        let written = match store.find_open_insight(key).await? {
            Some(mut existing) => {
                existing.refresh(finding, now);
                store.update_insight(&existing).await.map(|_| None)
            }
            None => {
                let insight = RiskInsight::open(finding.clone(), now);
                let action = ActionQueueItem::for_new_insight(&insight, now);
                store
                    .insert_insight(&insight, action.as_ref())
                    .await
                    .map(|_| Some((insight, action)))
            }
        };

        match written {
            Ok(Some((insight, action))) => {
                if let Some(item) = &action {
                    debug!(
                        insight_id = %insight.id,
                        key = %key,
                        urgency = item.urgency,
                        "action item queued"
                    );
                }
                return Ok(UpsertOutcome::Inserted { action_queued: action.is_some() });
            }
            Ok(None) => return Ok(UpsertOutcome::Updated),
            Err(e) if e.is_conflict() && attempt < MAX_UPSERT_ATTEMPTS => {
                debug!(key = %key, attempt, error = %e, "insight upsert conflicted, retrying");
            }
            Err(e) => return Err(e),
        }
    }
}

/// Score every entity with `domain` and persist the findings.
pub async fn scan_entities<S, D>(
    store: &S,
    domain: &D,
    entities: &[D::Entity],
    now: DateTime<Utc>,
) -> Result<PassStats, StoreError>
where
    S: OpsStore + ?Sized,
    D: RiskDomain,
{
    let mut stats = PassStats {
        analyzed: entities.len() as u64,
        ..PassStats::default()
    };

    for entity in entities {
        let Some(finding) = domain.evaluate(entity, now) else {
            continue;
        };
        stats.findings += 1;

        match upsert_finding(store, &finding, now).await? {
            UpsertOutcome::Inserted { action_queued } => {
                stats.new_risks += 1;
                if action_queued {
                    stats.actions_queued += 1;
                }
            }
            UpsertOutcome::Updated => stats.updated_risks += 1,
        }
    }

    info!(
        pass = domain.name(),
        analyzed = stats.analyzed,
        findings = stats.findings,
        new_risks = stats.new_risks,
        updated_risks = stats.updated_risks,
        actions_queued = stats.actions_queued,
        "scan pass finished"
    );
    Ok(stats)
}

pub async fn scan_store_churn<S>(store: &S, scope: ScanScope, now: DateTime<Utc>) -> Result<PassStats, ScanError>
where
    S: OpsStore + ?Sized,
{
    let stores = store.load_store_visits(scope).await?;
    Ok(scan_entities(store, &StoreChurn, &stores, now).await?)
}

pub async fn scan_invoice_non_payment<S>(
    store: &S,
    scope: ScanScope,
    now: DateTime<Utc>,
) -> Result<PassStats, ScanError>
where
    S: OpsStore + ?Sized,
{
    let invoices = store.load_outstanding_invoices(scope).await?;
    Ok(scan_entities(store, &InvoiceNonPayment, &invoices, now).await?)
}

pub async fn scan_inventory_shortage<S>(
    store: &S,
    scope: ScanScope,
    now: DateTime<Utc>,
) -> Result<PassStats, ScanError>
where
    S: OpsStore + ?Sized,
{
    let items = store.load_reorder_items(scope).await?;
    Ok(scan_entities(store, &InventoryShortage, &items, now).await?)
}

pub async fn scan_agent_inactivity<S>(
    store: &S,
    scope: ScanScope,
    now: DateTime<Utc>,
) -> Result<PassStats, ScanError>
where
    S: OpsStore + ?Sized,
{
    let agents = store.load_agent_activity(scope).await?;
    Ok(scan_entities(store, &AgentInactivity, &agents, now).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use opsradar_core::{AgentId, BusinessId, StoreId};
    use opsradar_risk::{AgentActivity, InsightStatus, RiskLevel, StoreVisit};

    use crate::store::{InMemoryOpsStore, StoreOperation};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    fn store_row(days_since_visit: i64) -> StoreVisit {
        StoreVisit {
            store_id: StoreId::new(),
            business_id: BusinessId::new(),
            name: Some("Corner Mart".to_string()),
            status: "active".to_string(),
            last_visit_at: Some(now() - Duration::days(days_since_visit)),
            created_at: now() - Duration::days(400),
        }
    }

    #[tokio::test]
    async fn new_critical_finding_creates_insight_and_action() {
        let store = InMemoryOpsStore::new();
        store.seed_store(store_row(31));
        store.seed_store(store_row(1));

        let stats = scan_store_churn(&store, ScanScope::all(), now()).await.unwrap();
        assert_eq!(stats, PassStats { analyzed: 2, findings: 1, new_risks: 1, updated_risks: 0, actions_queued: 1 });

        let insights = store.insights();
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].risk_level, RiskLevel::Critical);

        let actions = store.action_items();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].urgency, 90);
        assert_eq!(actions[0].insight_id, insights[0].id);
    }

    #[tokio::test]
    async fn rescan_updates_in_place_without_new_actions() {
        let store = InMemoryOpsStore::new();
        store.seed_store(store_row(20));

        scan_store_churn(&store, ScanScope::all(), now()).await.unwrap();
        let first = store.insights()[0].clone();

        let later = now() + Duration::days(15);
        let stats = scan_store_churn(&store, ScanScope::all(), later).await.unwrap();
        assert_eq!(stats.updated_risks, 1);
        assert_eq!(stats.new_risks, 0);
        assert_eq!(stats.actions_queued, 0);

        let insights = store.insights();
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].id, first.id);
        assert_eq!(insights[0].created_at, first.created_at);
        assert_eq!(insights[0].updated_at, later);
        assert!(insights[0].risk_score > first.risk_score);
        // High on first sight queued one item; escalation does not queue another.
        assert_eq!(store.action_items().len(), 1);
    }

    #[tokio::test]
    async fn medium_findings_queue_nothing() {
        let store = InMemoryOpsStore::new();
        store.seed_store(store_row(8));

        let stats = scan_store_churn(&store, ScanScope::all(), now()).await.unwrap();
        assert_eq!(stats.new_risks, 1);
        assert_eq!(stats.actions_queued, 0);
        assert!(store.action_items().is_empty());
    }

    #[tokio::test]
    async fn resolved_insight_is_reopened_as_a_new_row() {
        let store = InMemoryOpsStore::new();
        store.seed_store(store_row(31));

        scan_store_churn(&store, ScanScope::all(), now()).await.unwrap();
        let first = store.insights()[0].id;
        store.set_insight_status(first, InsightStatus::Resolved);

        let stats = scan_store_churn(&store, ScanScope::all(), now()).await.unwrap();
        assert_eq!(stats.new_risks, 1);
        assert_eq!(store.insights().len(), 2);
    }

    #[tokio::test]
    async fn insert_failure_aborts_the_pass() {
        let store = InMemoryOpsStore::new();
        store.seed_store(store_row(31));
        store.fail_on(StoreOperation::InsertInsight);

        let err = scan_store_churn(&store, ScanScope::all(), now()).await.unwrap_err();
        assert!(matches!(err, ScanError::Store(StoreError::Unavailable(_))));
        assert!(store.insights().is_empty());
    }

    #[tokio::test]
    async fn unpaid_agent_is_analyzed_but_not_flagged() {
        let store = InMemoryOpsStore::new();
        let business_id = BusinessId::new();
        store.seed_agent(AgentActivity {
            agent_id: AgentId::new(),
            business_id,
            name: Some("Niran".to_string()),
            lifetime_earnings: 250_000,
            last_payout_at: None,
        });
        store.seed_agent(AgentActivity {
            agent_id: AgentId::new(),
            business_id,
            name: Some("Ploy".to_string()),
            lifetime_earnings: 250_000,
            last_payout_at: Some(now() - Duration::days(45)),
        });

        let stats = scan_agent_inactivity(&store, ScanScope::all(), now()).await.unwrap();
        assert_eq!(stats.analyzed, 2);
        assert_eq!(stats.findings, 1);

        let insights = store.insights();
        assert_eq!(insights.len(), 1);
        assert!(insights[0].headline.contains("Ploy"));
    }

    #[tokio::test]
    async fn failed_enqueue_keeps_the_finding_new_for_the_next_run() {
        let store = InMemoryOpsStore::new();
        store.seed_store(store_row(31));
        store.fail_on(StoreOperation::EnqueueAction);

        let err = scan_store_churn(&store, ScanScope::all(), now()).await.unwrap_err();
        assert!(matches!(err, ScanError::Store(StoreError::Unavailable(_))));
        assert!(store.insights().is_empty());
        assert!(store.action_items().is_empty());

        store.clear_failures();
        let stats = scan_store_churn(&store, ScanScope::all(), now()).await.unwrap();
        assert_eq!(stats.new_risks, 1);
        assert_eq!(stats.updated_risks, 0);
        assert_eq!(stats.actions_queued, 1);

        let insights = store.insights();
        let actions = store.action_items();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].insight_id, insights[0].id);
    }
}
