//! Postgres-backed `OpsStore`.
//!
//! Schema lives in `migrations/0001_ops_risk.sql`. Every read carries the scan
//! scope as nullable parameters (`$n::uuid IS NULL OR column = $n`) so one
//! statement serves both full and scoped scans.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Code | StoreError |
//! |------------|-----------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | any | `Query` |
//! | PoolClosed / PoolTimedOut / Io | N/A | `Unavailable` |
//! | ColumnDecode / ColumnNotFound / Decode | N/A | `Decode` |
//! | Other | N/A | `Query` |

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{Span, instrument};
use uuid::Uuid;

use opsradar_core::{
    AgentId, BusinessId, InsightId, InventoryItemId, InvoiceId, ProductId, ScanScope, StoreId,
    WarehouseId,
};
use opsradar_risk::{
    ActionQueueItem, AgentActivity, InsightKey, InventoryForecast, InventoryRiskFlag,
    InvoiceCounts, KpiSnapshot, MovementRecord, OutstandingInvoice, ReorderItem, RiskInsight,
    SnapshotWrite, SourceData, StockLevel, StoreCounts, StoreVisit,
};

use super::{OpsStore, StoreError, StoreOperation};

/// Postgres store over a shared SQLx pool.
#[derive(Debug, Clone)]
pub struct PostgresOpsStore {
    pool: Arc<PgPool>,
}

impl PostgresOpsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

fn map_sqlx_error(op: StoreOperation, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {op}: {}", db_err.message());
            match db_err.code() {
                Some(code) if code.as_ref() == "23505" => StoreError::Conflict(msg),
                _ => StoreError::Query(msg),
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            StoreError::Unavailable(format!("{op}: {err}"))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) | sqlx::Error::Decode(_) => {
            StoreError::Decode(format!("{op}: {err}"))
        }
        _ => StoreError::Query(format!("sqlx error in {op}: {err}")),
    }
}

fn get<'r, T>(op: StoreOperation, row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get::<T, _>(column).map_err(|e| map_sqlx_error(op, e))
}

fn parse<T>(op: StoreOperation, value: &str) -> Result<T, StoreError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| StoreError::Decode(format!("{op}: {e}")))
}

fn unsigned(op: StoreOperation, column: &str, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Decode(format!("{op}: negative {column} ({value})")))
}

fn signed(op: StoreOperation, column: &str, value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Query(format!("{op}: {column} out of range ({value})")))
}

fn business_param(scope: &ScanScope) -> Option<Uuid> {
    scope.business_id.map(|b| *b.as_uuid())
}

fn warehouse_param(scope: &ScanScope) -> Option<Uuid> {
    scope.warehouse_id.map(|w| *w.as_uuid())
}

fn insight_from_row(row: &PgRow) -> Result<RiskInsight, StoreError> {
    let op = StoreOperation::FindOpenInsight;
    let Json(source_data): Json<SourceData> = get(op, row, "source_data")?;
    let risk_score: i16 = get(op, row, "risk_score")?;
    Ok(RiskInsight {
        id: InsightId::from_uuid(get(op, row, "id")?),
        business_id: BusinessId::from_uuid(get(op, row, "business_id")?),
        entity_type: parse(op, &get::<String>(op, row, "entity_type")?)?,
        entity_id: get(op, row, "entity_id")?,
        risk_type: parse(op, &get::<String>(op, row, "risk_type")?)?,
        risk_score: u8::try_from(risk_score)
            .map_err(|_| StoreError::Decode(format!("{op}: risk_score {risk_score}")))?,
        risk_level: parse(op, &get::<String>(op, row, "risk_level")?)?,
        headline: get(op, row, "headline")?,
        details: get(op, row, "details")?,
        recommended_action: get(op, row, "recommended_action")?,
        source_data,
        status: parse(op, &get::<String>(op, row, "status")?)?,
        created_at: get(op, row, "created_at")?,
        updated_at: get(op, row, "updated_at")?,
        expires_at: get(op, row, "expires_at")?,
    })
}

#[async_trait::async_trait]
impl OpsStore for PostgresOpsStore {
    #[instrument(
        skip(self),
        fields(row_count = tracing::field::Empty),
        err
    )]
    async fn load_stock_levels(&self, scope: ScanScope) -> Result<Vec<StockLevel>, StoreError> {
        let op = StoreOperation::LoadStockLevels;
        let rows = sqlx::query(
            r#"
            SELECT
                s.business_id,
                s.product_id,
                s.warehouse_id,
                s.quantity_on_hand,
                s.quantity_reserved,
                s.reorder_point,
                p.name AS product_name,
                p.sku AS product_sku,
                w.name AS warehouse_name
            FROM stock_levels s
            LEFT JOIN products p ON p.id = s.product_id
            LEFT JOIN warehouses w ON w.id = s.warehouse_id
            WHERE ($1::uuid IS NULL OR s.business_id = $1)
              AND ($2::uuid IS NULL OR s.warehouse_id = $2)
            ORDER BY s.business_id, s.product_id, s.warehouse_id
            "#,
        )
        .bind(business_param(&scope))
        .bind(warehouse_param(&scope))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(StockLevel {
                business_id: BusinessId::from_uuid(get(op, row, "business_id")?),
                product_id: ProductId::from_uuid(get(op, row, "product_id")?),
                warehouse_id: WarehouseId::from_uuid(get(op, row, "warehouse_id")?),
                quantity_on_hand: get(op, row, "quantity_on_hand")?,
                quantity_reserved: get(op, row, "quantity_reserved")?,
                reorder_point: get(op, row, "reorder_point")?,
                product_name: get(op, row, "product_name")?,
                product_sku: get(op, row, "product_sku")?,
                warehouse_name: get(op, row, "warehouse_name")?,
            });
        }

        Span::current().record("row_count", out.len());
        Ok(out)
    }

    #[instrument(
        skip(self),
        fields(row_count = tracing::field::Empty),
        err
    )]
    async fn load_movements(
        &self,
        scope: ScanScope,
        since: DateTime<Utc>,
    ) -> Result<Vec<MovementRecord>, StoreError> {
        let op = StoreOperation::LoadMovements;
        let rows = sqlx::query(
            r#"
            SELECT product_id, from_warehouse_id, to_warehouse_id, quantity, occurred_at
            FROM inventory_movements
            WHERE occurred_at >= $3
              AND ($1::uuid IS NULL OR business_id = $1)
              AND ($2::uuid IS NULL OR from_warehouse_id = $2 OR to_warehouse_id = $2)
            ORDER BY occurred_at ASC
            "#,
        )
        .bind(business_param(&scope))
        .bind(warehouse_param(&scope))
        .bind(since)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(MovementRecord {
                product_id: ProductId::from_uuid(get(op, row, "product_id")?),
                from_warehouse_id: get::<Option<Uuid>>(op, row, "from_warehouse_id")?.map(WarehouseId::from_uuid),
                to_warehouse_id: get::<Option<Uuid>>(op, row, "to_warehouse_id")?.map(WarehouseId::from_uuid),
                quantity: get(op, row, "quantity")?,
                occurred_at: get(op, row, "occurred_at")?,
            });
        }

        Span::current().record("row_count", out.len());
        Ok(out)
    }

    #[instrument(
        skip(self, forecasts, flags),
        fields(forecast_count = forecasts.len(), flag_count = flags.len()),
        err
    )]
    async fn replace_inventory_outputs(
        &self,
        scope: ScanScope,
        forecasts: &[InventoryForecast],
        flags: &[InventoryRiskFlag],
    ) -> Result<(), StoreError> {
        let op = StoreOperation::ReplaceInventoryOutputs;
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error(op, e))?;

        for table in ["inventory_forecasts", "inventory_risk_flags"] {
            sqlx::query(&format!(
                "DELETE FROM {table} \
                 WHERE ($1::uuid IS NULL OR business_id = $1) \
                   AND ($2::uuid IS NULL OR warehouse_id = $2)"
            ))
            .bind(business_param(&scope))
            .bind(warehouse_param(&scope))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(op, e))?;
        }

        for f in forecasts {
            let horizon_days = i32::try_from(f.horizon_days)
                .map_err(|_| StoreError::Query(format!("{op}: horizon_days out of range ({})", f.horizon_days)))?;
            sqlx::query(
                r#"
                INSERT INTO inventory_forecasts (
                    business_id,
                    product_id,
                    warehouse_id,
                    horizon_days,
                    avg_daily_usage,
                    forecast_demand,
                    available,
                    days_until_runout,
                    projected_runout_date,
                    risk_level,
                    risk_reason,
                    suggestion,
                    calculated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
            )
            .bind(f.business_id.as_uuid())
            .bind(f.product_id.as_uuid())
            .bind(f.warehouse_id.as_uuid())
            .bind(horizon_days)
            .bind(f.avg_daily_usage)
            .bind(f.forecast_demand)
            .bind(f.available)
            .bind(f.days_until_runout)
            .bind(f.projected_runout_date)
            .bind(f.risk_level.as_str())
            .bind(&f.risk_reason)
            .bind(&f.suggestion)
            .bind(f.calculated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(op, e))?;
        }

        for flag in flags {
            sqlx::query(
                r#"
                INSERT INTO inventory_risk_flags (
                    business_id,
                    product_id,
                    warehouse_id,
                    flag_type,
                    severity,
                    message,
                    days_without_movement,
                    last_movement_at,
                    calculated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(flag.business_id.as_uuid())
            .bind(flag.product_id.as_uuid())
            .bind(flag.warehouse_id.as_uuid())
            .bind(flag.flag_type.as_str())
            .bind(flag.severity.as_str())
            .bind(&flag.message)
            .bind(flag.days_without_movement)
            .bind(flag.last_movement_at)
            .bind(flag.calculated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(op, e))?;
        }

        tx.commit().await.map_err(|e| map_sqlx_error(op, e))
    }

    #[instrument(skip(self), fields(row_count = tracing::field::Empty), err)]
    async fn load_store_visits(&self, scope: ScanScope) -> Result<Vec<StoreVisit>, StoreError> {
        let op = StoreOperation::LoadStoreVisits;
        let rows = sqlx::query(
            r#"
            SELECT id, business_id, name, status, last_visit_at, created_at
            FROM stores
            WHERE ($1::uuid IS NULL OR business_id = $1)
            ORDER BY id
            "#,
        )
        .bind(business_param(&scope))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(StoreVisit {
                store_id: StoreId::from_uuid(get(op, row, "id")?),
                business_id: BusinessId::from_uuid(get(op, row, "business_id")?),
                name: get(op, row, "name")?,
                status: get(op, row, "status")?,
                last_visit_at: get(op, row, "last_visit_at")?,
                created_at: get(op, row, "created_at")?,
            });
        }

        Span::current().record("row_count", out.len());
        Ok(out)
    }

    #[instrument(skip(self), fields(row_count = tracing::field::Empty), err)]
    async fn load_outstanding_invoices(
        &self,
        scope: ScanScope,
    ) -> Result<Vec<OutstandingInvoice>, StoreError> {
        let op = StoreOperation::LoadOutstandingInvoices;
        let rows = sqlx::query(
            r#"
            SELECT id, business_id, invoice_number, customer_name, amount_due, due_date, created_at
            FROM invoices
            WHERE status <> 'paid'
              AND ($1::uuid IS NULL OR business_id = $1)
            ORDER BY id
            "#,
        )
        .bind(business_param(&scope))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(OutstandingInvoice {
                invoice_id: InvoiceId::from_uuid(get(op, row, "id")?),
                business_id: BusinessId::from_uuid(get(op, row, "business_id")?),
                invoice_number: get(op, row, "invoice_number")?,
                customer_name: get(op, row, "customer_name")?,
                amount_due: unsigned(op, "amount_due", get(op, row, "amount_due")?)?,
                due_date: get::<Option<NaiveDate>>(op, row, "due_date")?,
                created_at: get(op, row, "created_at")?,
            });
        }

        Span::current().record("row_count", out.len());
        Ok(out)
    }

    #[instrument(skip(self), fields(row_count = tracing::field::Empty), err)]
    async fn load_reorder_items(&self, scope: ScanScope) -> Result<Vec<ReorderItem>, StoreError> {
        let op = StoreOperation::LoadReorderItems;
        let rows = sqlx::query(
            r#"
            SELECT
                i.id,
                i.business_id,
                i.warehouse_id,
                p.name AS product_name,
                w.name AS warehouse_name,
                i.quantity,
                i.reorder_point
            FROM inventory_items i
            LEFT JOIN products p ON p.id = i.product_id
            LEFT JOIN warehouses w ON w.id = i.warehouse_id
            WHERE ($1::uuid IS NULL OR i.business_id = $1)
              AND ($2::uuid IS NULL OR i.warehouse_id = $2)
            ORDER BY i.id
            "#,
        )
        .bind(business_param(&scope))
        .bind(warehouse_param(&scope))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(ReorderItem {
                item_id: InventoryItemId::from_uuid(get(op, row, "id")?),
                business_id: BusinessId::from_uuid(get(op, row, "business_id")?),
                warehouse_id: get::<Option<Uuid>>(op, row, "warehouse_id")?.map(WarehouseId::from_uuid),
                product_name: get(op, row, "product_name")?,
                warehouse_name: get(op, row, "warehouse_name")?,
                quantity: get(op, row, "quantity")?,
                reorder_point: get(op, row, "reorder_point")?,
            });
        }

        Span::current().record("row_count", out.len());
        Ok(out)
    }

    #[instrument(skip(self), fields(row_count = tracing::field::Empty), err)]
    async fn load_agent_activity(&self, scope: ScanScope) -> Result<Vec<AgentActivity>, StoreError> {
        let op = StoreOperation::LoadAgentActivity;
        let rows = sqlx::query(
            r#"
            SELECT
                a.id,
                a.business_id,
                a.name,
                a.lifetime_earnings,
                MAX(p.paid_at) AS last_payout_at
            FROM field_agents a
            LEFT JOIN agent_payouts p ON p.agent_id = a.id
            WHERE ($1::uuid IS NULL OR a.business_id = $1)
            GROUP BY a.id, a.business_id, a.name, a.lifetime_earnings
            ORDER BY a.id
            "#,
        )
        .bind(business_param(&scope))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(AgentActivity {
                agent_id: AgentId::from_uuid(get(op, row, "id")?),
                business_id: BusinessId::from_uuid(get(op, row, "business_id")?),
                name: get(op, row, "name")?,
                lifetime_earnings: unsigned(op, "lifetime_earnings", get(op, row, "lifetime_earnings")?)?,
                last_payout_at: get(op, row, "last_payout_at")?,
            });
        }

        Span::current().record("row_count", out.len());
        Ok(out)
    }

    #[instrument(skip(self), fields(key = %key), err)]
    async fn find_open_insight(&self, key: InsightKey) -> Result<Option<RiskInsight>, StoreError> {
        let op = StoreOperation::FindOpenInsight;
        let row = sqlx::query(
            r#"
            SELECT
                id, business_id, entity_type, entity_id, risk_type, risk_score, risk_level,
                headline, details, recommended_action, source_data, status,
                created_at, updated_at, expires_at
            FROM risk_insights
            WHERE entity_type = $1 AND entity_id = $2 AND risk_type = $3 AND status = 'open'
            "#,
        )
        .bind(key.entity_type.as_str())
        .bind(key.entity_id)
        .bind(key.risk_type.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        row.as_ref().map(insight_from_row).transpose()
    }

    #[instrument(
        skip(self, insight, action),
        fields(insight_id = %insight.id, key = %insight.key(), with_action = action.is_some()),
        err
    )]
    async fn insert_insight(
        &self,
        insight: &RiskInsight,
        action: Option<&ActionQueueItem>,
    ) -> Result<(), StoreError> {
        let op = StoreOperation::InsertInsight;
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error(op, e))?;

        sqlx::query(
            r#"
            INSERT INTO risk_insights (
                id, business_id, entity_type, entity_id, risk_type, risk_score, risk_level,
                headline, details, recommended_action, source_data, status,
                created_at, updated_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(insight.id.as_uuid())
        .bind(insight.business_id.as_uuid())
        .bind(insight.entity_type.as_str())
        .bind(insight.entity_id)
        .bind(insight.risk_type.as_str())
        .bind(i16::from(insight.risk_score))
        .bind(insight.risk_level.as_str())
        .bind(&insight.headline)
        .bind(&insight.details)
        .bind(&insight.recommended_action)
        .bind(Json(&insight.source_data))
        .bind(insight.status.as_str())
        .bind(insight.created_at)
        .bind(insight.updated_at)
        .bind(insight.expires_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        if let Some(item) = action {
            let op = StoreOperation::EnqueueAction;
            sqlx::query(
                r#"
                INSERT INTO action_queue (
                    id, business_id, entity_type, entity_id, insight_id,
                    suggested_action, reason, urgency, status, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(item.business_id.as_uuid())
            .bind(item.entity_type.as_str())
            .bind(item.entity_id)
            .bind(item.insight_id.as_uuid())
            .bind(&item.suggested_action)
            .bind(&item.reason)
            .bind(i16::from(item.urgency))
            .bind(item.status.as_str())
            .bind(item.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(op, e))?;
        }

        tx.commit().await.map_err(|e| map_sqlx_error(op, e))
    }

    #[instrument(skip(self, insight), fields(insight_id = %insight.id), err)]
    async fn update_insight(&self, insight: &RiskInsight) -> Result<(), StoreError> {
        let op = StoreOperation::UpdateInsight;
        let result = sqlx::query(
            r#"
            UPDATE risk_insights
            SET risk_score = $2,
                risk_level = $3,
                headline = $4,
                details = $5,
                recommended_action = $6,
                source_data = $7,
                updated_at = $8
            WHERE id = $1 AND status = 'open'
            "#,
        )
        .bind(insight.id.as_uuid())
        .bind(i16::from(insight.risk_score))
        .bind(insight.risk_level.as_str())
        .bind(&insight.headline)
        .bind(&insight.details)
        .bind(&insight.recommended_action)
        .bind(Json(&insight.source_data))
        .bind(insight.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("insight {} is no longer open", insight.id)));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn count_stores(&self, scope: ScanScope) -> Result<StoreCounts, StoreError> {
        let op = StoreOperation::CountStores;
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE lower(status) = 'active') AS active
            FROM stores
            WHERE ($1::uuid IS NULL OR business_id = $1)
            "#,
        )
        .bind(business_param(&scope))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        let total = unsigned(op, "total", get(op, &row, "total")?)?;
        let active = unsigned(op, "active", get(op, &row, "active")?)?;
        Ok(StoreCounts {
            total,
            active,
            inactive: total.saturating_sub(active),
        })
    }

    #[instrument(skip(self), err)]
    async fn count_invoices(&self, scope: ScanScope) -> Result<InvoiceCounts, StoreError> {
        let op = StoreOperation::CountInvoices;
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status <> 'paid') AS unpaid
            FROM invoices
            WHERE ($1::uuid IS NULL OR business_id = $1)
            "#,
        )
        .bind(business_param(&scope))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        Ok(InvoiceCounts {
            total: unsigned(op, "total", get(op, &row, "total")?)?,
            unpaid: unsigned(op, "unpaid", get(op, &row, "unpaid")?)?,
        })
    }

    #[instrument(
        skip(self, snapshot),
        fields(scope = %snapshot.scope.key(), snapshot_date = %snapshot.snapshot_date),
        err
    )]
    async fn upsert_kpi_snapshot(&self, snapshot: &KpiSnapshot) -> Result<SnapshotWrite, StoreError> {
        let op = StoreOperation::UpsertKpiSnapshot;
        let row = sqlx::query(
            r#"
            INSERT INTO kpi_snapshots (
                id, snapshot_date, scope_key, business_id,
                total_stores, active_stores, inactive_stores,
                total_invoices, unpaid_invoices, low_stock_items,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (snapshot_date, scope_key)
            DO UPDATE SET
                total_stores = EXCLUDED.total_stores,
                active_stores = EXCLUDED.active_stores,
                inactive_stores = EXCLUDED.inactive_stores,
                total_invoices = EXCLUDED.total_invoices,
                unpaid_invoices = EXCLUDED.unpaid_invoices,
                low_stock_items = EXCLUDED.low_stock_items,
                updated_at = EXCLUDED.updated_at
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(snapshot.id.as_uuid())
        .bind(snapshot.snapshot_date)
        .bind(snapshot.scope.key())
        .bind(snapshot.scope.business_id().map(|b| *b.as_uuid()))
        .bind(signed(op, "total_stores", snapshot.stores.total)?)
        .bind(signed(op, "active_stores", snapshot.stores.active)?)
        .bind(signed(op, "inactive_stores", snapshot.stores.inactive)?)
        .bind(signed(op, "total_invoices", snapshot.invoices.total)?)
        .bind(signed(op, "unpaid_invoices", snapshot.invoices.unpaid)?)
        .bind(signed(op, "low_stock_items", snapshot.low_stock_items)?)
        .bind(snapshot.created_at)
        .bind(snapshot.updated_at)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        if get::<bool>(op, &row, "inserted")? {
            Ok(SnapshotWrite::Inserted)
        } else {
            Ok(SnapshotWrite::Updated)
        }
    }

    #[instrument(skip(self), err)]
    async fn expire_resolved_insights(
        &self,
        scope: ScanScope,
        created_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let op = StoreOperation::ExpireResolvedInsights;
        let result = sqlx::query(
            r#"
            UPDATE risk_insights
            SET expires_at = $3
            WHERE status = 'resolved'
              AND expires_at IS NULL
              AND created_at < $2
              AND ($1::uuid IS NULL OR business_id = $1)
            "#,
        )
        .bind(business_param(&scope))
        .bind(created_before)
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        Ok(result.rows_affected())
    }
}
