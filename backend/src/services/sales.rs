//! Sales engine: availability checks and FEFO lot consumption
//!
//! Confirmation locks the order, then each line's eligible lots in FEFO order,
//! lines taken in ascending product id.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{
    check_availability, plan_confirmation, round_quantity, start_confirmation,
    validate_line_drafts, validate_note, LedgerError, ProductLot, SalesConsumption, SalesLine,
    SalesLineDraft, SalesOrder, SalesOrderDetail, SalesState, Transition,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::lots::{LotRow, LOT_COLUMNS};
use super::today;
use crate::config::LedgerSettings;
use crate::error::{AppError, AppResult};

/// Sales service
#[derive(Clone)]
pub struct SalesService {
    db: PgPool,
    settings: LedgerSettings,
}

const ORDER_COLUMNS: &str = "id, tenant_id, ordered_at, state, note, created_by, created_at";

pub(crate) const CONSUMPTION_COLUMNS: &str = r#"
    sc.id, sc.sales_order_id, sc.sales_line_id, sc.lot_id, l.code AS lot_code,
    sc.quantity, sc.created_by, sc.created_at
"#;

#[derive(Debug, FromRow)]
struct SalesOrderRow {
    id: i64,
    tenant_id: Uuid,
    ordered_at: DateTime<Utc>,
    state: String,
    note: String,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<SalesOrderRow> for SalesOrder {
    type Error = AppError;

    fn try_from(row: SalesOrderRow) -> Result<Self, Self::Error> {
        let state = SalesState::from_str(&row.state)
            .ok_or_else(|| AppError::Internal(format!("unknown sales state {}", row.state)))?;
        Ok(SalesOrder {
            id: row.id,
            tenant_id: row.tenant_id,
            ordered_at: row.ordered_at,
            state,
            note: row.note,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct SalesLineRow {
    id: i64,
    sales_order_id: i64,
    product_id: i64,
    product_name: String,
    product_tenant_id: Uuid,
    quantity: Decimal,
}

impl From<SalesLineRow> for SalesLine {
    fn from(row: SalesLineRow) -> Self {
        SalesLine {
            id: row.id,
            sales_order_id: row.sales_order_id,
            product_id: row.product_id,
            product_name: row.product_name,
            product_tenant_id: row.product_tenant_id,
            quantity: row.quantity,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ConsumptionRow {
    id: i64,
    sales_order_id: i64,
    sales_line_id: i64,
    lot_id: i64,
    lot_code: String,
    quantity: Decimal,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl From<ConsumptionRow> for SalesConsumption {
    fn from(row: ConsumptionRow) -> Self {
        SalesConsumption {
            id: row.id,
            sales_order_id: row.sales_order_id,
            sales_line_id: row.sales_line_id,
            lot_id: row.lot_id,
            lot_code: row.lot_code,
            quantity: row.quantity,
            created_by: row.created_by,
            created_at: row.created_at,
        }
    }
}

/// Input for creating a draft sales order
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSalesOrderInput {
    pub ordered_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
    #[serde(default)]
    pub lines: Vec<SalesLineDraft>,
}

async fn fetch_order(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    order_id: i64,
    for_update: bool,
) -> AppResult<SalesOrder> {
    let lock = if for_update { "FOR UPDATE" } else { "" };
    let row = sqlx::query_as::<_, SalesOrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM sales_orders WHERE id = $1 AND tenant_id = $2 {lock}"
    ))
    .bind(order_id)
    .bind(tenant_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("sales order"))?;

    SalesOrder::try_from(row)
}

/// Lines in ascending product id, the order they are allocated in
async fn fetch_lines(conn: &mut PgConnection, order_id: i64) -> AppResult<Vec<SalesLine>> {
    let rows = sqlx::query_as::<_, SalesLineRow>(
        r#"
        SELECT sl.id, sl.sales_order_id, sl.product_id, p.name AS product_name,
               p.tenant_id AS product_tenant_id, sl.quantity
        FROM sales_lines sl
        JOIN products p ON p.id = sl.product_id
        WHERE sl.sales_order_id = $1
        ORDER BY sl.product_id
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(SalesLine::from).collect())
}

async fn fetch_consumptions(conn: &mut PgConnection, order_id: i64) -> AppResult<Vec<SalesConsumption>> {
    let rows = sqlx::query_as::<_, ConsumptionRow>(&format!(
        r#"
        SELECT {CONSUMPTION_COLUMNS}
        FROM sales_consumptions sc
        JOIN product_lots l ON l.id = sc.lot_id
        WHERE sc.sales_order_id = $1
        ORDER BY sc.id
        "#
    ))
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(SalesConsumption::from).collect())
}

async fn fetch_detail(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    order_id: i64,
) -> AppResult<SalesOrderDetail> {
    let order = fetch_order(conn, tenant_id, order_id, false).await?;
    let lines = fetch_lines(conn, order_id).await?;
    let consumptions = fetch_consumptions(conn, order_id).await?;
    Ok(SalesOrderDetail {
        order,
        lines,
        consumptions,
    })
}

/// Summed stock of eligible lots per product
async fn eligible_stock(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    product_ids: &[i64],
    today: NaiveDate,
) -> AppResult<HashMap<i64, Decimal>> {
    let rows = sqlx::query_as::<_, (i64, Decimal)>(
        r#"
        SELECT product_id, SUM(available_quantity)
        FROM product_lots
        WHERE tenant_id = $1 AND product_id = ANY($2)
          AND expiry_date >= $3 AND available_quantity > 0
        GROUP BY product_id
        "#,
    )
    .bind(tenant_id)
    .bind(product_ids)
    .bind(today)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().collect())
}

/// Eligible lots of a product in FEFO order, locked
async fn lock_eligible_lots(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    product_id: i64,
    today: NaiveDate,
) -> AppResult<Vec<ProductLot>> {
    let rows = sqlx::query_as::<_, LotRow>(&format!(
        r#"
        SELECT {LOT_COLUMNS}
        FROM product_lots l
        JOIN products p ON p.id = l.product_id
        JOIN units u ON u.id = p.unit_id
        WHERE l.tenant_id = $1 AND l.product_id = $2
          AND l.expiry_date >= $3 AND l.available_quantity > 0
        ORDER BY l.expiry_date, l.created_at, l.id
        FOR UPDATE OF l
        "#
    ))
    .bind(tenant_id)
    .bind(product_id)
    .bind(today)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(ProductLot::try_from).collect()
}

fn log_shortfall(tenant_id: Uuid, order_id: i64, err: &LedgerError) {
    if let LedgerError::InsufficientStock(items) = err {
        tracing::warn!(
            %tenant_id,
            order_id,
            deficient = items.len(),
            detail = %err,
            "sales order short of stock"
        );
    }
}

impl SalesService {
    /// Create a new SalesService instance
    pub fn new(db: PgPool, settings: LedgerSettings) -> Self {
        Self { db, settings }
    }

    /// Create a draft order. Stock is not checked until validation.
    pub async fn create_sales_order(
        &self,
        tenant_id: Uuid,
        actor: Uuid,
        input: CreateSalesOrderInput,
    ) -> AppResult<SalesOrderDetail> {
        let note = validate_note(input.note.as_deref())?;
        let drafts: Vec<SalesLineDraft> = input
            .lines
            .into_iter()
            .map(|line| SalesLineDraft {
                quantity: round_quantity(line.quantity),
                ..line
            })
            .collect();
        validate_line_drafts(&drafts)?;

        let mut tx = self.db.begin().await?;

        let product_ids: Vec<i64> = drafts.iter().map(|l| l.product_id).collect();
        let owners: HashMap<i64, Uuid> = sqlx::query_as::<_, (i64, Uuid)>(
            "SELECT id, tenant_id FROM products WHERE id = ANY($1)",
        )
        .bind(&product_ids)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();

        for line in &drafts {
            match owners.get(&line.product_id) {
                None => return Err(AppError::not_found("product")),
                Some(owner) if *owner != tenant_id => {
                    return Err(LedgerError::integrity(format!(
                        "product {} belongs to a different tenant than the sales order",
                        line.product_id
                    ))
                    .into())
                }
                Some(_) => {}
            }
        }

        let order_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO sales_orders (tenant_id, ordered_at, state, note, created_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(tenant_id)
        .bind(input.ordered_at.unwrap_or_else(Utc::now))
        .bind(SalesState::Draft.as_str())
        .bind(&note)
        .bind(actor)
        .fetch_one(&mut *tx)
        .await?;

        for line in &drafts {
            sqlx::query(
                "INSERT INTO sales_lines (sales_order_id, product_id, quantity) VALUES ($1, $2, $3)",
            )
            .bind(order_id)
            .bind(line.product_id)
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;
        }

        let detail = fetch_detail(&mut tx, tenant_id, order_id).await?;
        tx.commit().await?;

        tracing::info!(%tenant_id, order_id, lines = detail.lines.len(), "sales order created");

        Ok(detail)
    }

    /// Order with its lines and consumption trail
    pub async fn get_sales_order(&self, tenant_id: Uuid, order_id: i64) -> AppResult<SalesOrderDetail> {
        let mut conn = self.db.acquire().await?;
        fetch_detail(&mut conn, tenant_id, order_id).await
    }

    /// Check every line against eligible lot stock without writing anything
    pub async fn validate(&self, tenant_id: Uuid, order_id: i64) -> AppResult<()> {
        let mut conn = self.db.acquire().await?;
        let order = fetch_order(&mut conn, tenant_id, order_id, false).await?;
        let lines = fetch_lines(&mut conn, order.id).await?;
        let product_ids: Vec<i64> = lines.iter().map(|l| l.product_id).collect();
        let available = eligible_stock(&mut conn, tenant_id, &product_ids, today()).await?;

        check_availability(order.tenant_id, &lines, &available)
            .inspect_err(|err| log_shortfall(tenant_id, order_id, err))?;

        tracing::debug!(%tenant_id, order_id, lines = lines.len(), "sales order validated");
        Ok(())
    }

    /// Confirm a draft order, consuming lots first-expired-first-out.
    ///
    /// An already confirmed order is left untouched. Running out of lots
    /// part-way aborts the whole confirmation.
    pub async fn confirm(
        &self,
        tenant_id: Uuid,
        actor: Uuid,
        order_id: i64,
    ) -> AppResult<Transition<SalesOrderDetail>> {
        let today = today();
        let near = self.settings.near_expiry_days;
        let mut tx = self.db.begin().await?;

        let order = match start_confirmation(fetch_order(&mut tx, tenant_id, order_id, true).await?) {
            Transition::Applied(order) => order,
            Transition::AlreadyDone => {
                tracing::debug!(%tenant_id, order_id, "sales order already confirmed");
                return Ok(Transition::AlreadyDone);
            }
        };

        let lines = fetch_lines(&mut tx, order.id).await?;
        let mut locked = Vec::new();
        for line in &lines {
            locked.extend(lock_eligible_lots(&mut tx, tenant_id, line.product_id, today).await?);
        }

        // Availability is judged on the locked lots, so stock drained by a
        // concurrent confirmation aborts the whole order here
        let plan = plan_confirmation(order.tenant_id, &lines, &locked, today, near)
            .inspect_err(|err| log_shortfall(tenant_id, order_id, err))?;

        for lot in &plan.lots {
            sqlx::query("UPDATE product_lots SET available_quantity = $1, status = $2 WHERE id = $3")
                .bind(lot.available_quantity)
                .bind(lot.status.as_str())
                .bind(lot.id)
                .execute(&mut *tx)
                .await?;
        }

        for allocation in &plan.allocations {
            sqlx::query(
                r#"
                INSERT INTO sales_consumptions
                    (sales_order_id, sales_line_id, lot_id, quantity, created_by)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(order.id)
            .bind(allocation.sales_line_id)
            .bind(allocation.lot_id)
            .bind(allocation.quantity)
            .bind(actor)
            .execute(&mut *tx)
            .await?;

            tracing::debug!(
                order_id,
                line_id = allocation.sales_line_id,
                lot_id = allocation.lot_id,
                quantity = %allocation.quantity,
                "lot consumed"
            );
        }

        sqlx::query("UPDATE sales_orders SET state = $1, confirmed_at = NOW() WHERE id = $2")
            .bind(SalesState::Confirmed.as_str())
            .bind(order.id)
            .execute(&mut *tx)
            .await?;

        let detail = fetch_detail(&mut tx, tenant_id, order_id).await?;
        tx.commit().await?;

        tracing::info!(
            %tenant_id,
            order_id,
            lines = detail.lines.len(),
            consumptions = detail.consumptions.len(),
            "sales order confirmed"
        );

        Ok(Transition::Applied(detail))
    }
}
