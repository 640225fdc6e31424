//! Production engine: turns materials into a finished lot
//!
//! Execution locks the order, the product (serializing lot-code sequences) and
//! every recipe material in ascending id order before anything is written.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{
    check_output, check_requirements, derive_status, plan_production, requirements,
    round_quantity, start_execution, validate_note, validate_positive, ComponentStock,
    LedgerError, MovementKind, ProductLot, ProductionOrder, ProductionState, Requirement,
    Transition,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::ledger::{post_with, MovementDraft};
use super::lots::fetch_lot;
use super::products::fetch_product;
use super::recipes::fetch_recipe;
use super::today;
use crate::config::LedgerSettings;
use crate::error::{AppError, AppResult};

/// Production service
#[derive(Clone)]
pub struct ProductionService {
    db: PgPool,
    settings: LedgerSettings,
}

const ORDER_COLUMNS: &str = r#"
    id, tenant_id, product_id, recipe_id, batch_multiplier, produced_at, state,
    note, created_by, created_at
"#;

#[derive(Debug, FromRow)]
struct ProductionOrderRow {
    id: i64,
    tenant_id: Uuid,
    product_id: i64,
    recipe_id: i64,
    batch_multiplier: Decimal,
    produced_at: DateTime<Utc>,
    state: String,
    note: String,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ProductionOrderRow> for ProductionOrder {
    type Error = AppError;

    fn try_from(row: ProductionOrderRow) -> Result<Self, Self::Error> {
        let state = ProductionState::from_str(&row.state)
            .ok_or_else(|| AppError::Internal(format!("unknown production state {}", row.state)))?;
        Ok(ProductionOrder {
            id: row.id,
            tenant_id: row.tenant_id,
            product_id: row.product_id,
            recipe_id: row.recipe_id,
            batch_multiplier: row.batch_multiplier,
            produced_at: row.produced_at,
            state,
            note: row.note,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ComponentRow {
    material_id: i64,
    material_name: String,
    material_tenant_id: Uuid,
    quantity_per_batch: Decimal,
    available: Decimal,
}

impl From<ComponentRow> for ComponentStock {
    fn from(row: ComponentRow) -> Self {
        ComponentStock {
            material_id: row.material_id,
            material_name: row.material_name,
            material_tenant_id: row.material_tenant_id,
            quantity_per_batch: row.quantity_per_batch,
            available: row.available,
        }
    }
}

/// Input for creating a draft production order
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProductionOrderInput {
    pub product_id: i64,
    pub recipe_id: i64,
    pub batch_multiplier: Decimal,
    pub produced_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

async fn fetch_order(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    order_id: i64,
    for_update: bool,
) -> AppResult<ProductionOrder> {
    let lock = if for_update { "FOR UPDATE" } else { "" };
    let row = sqlx::query_as::<_, ProductionOrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM production_orders WHERE id = $1 AND tenant_id = $2 {lock}"
    ))
    .bind(order_id)
    .bind(tenant_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("production order"))?;

    ProductionOrder::try_from(row)
}

/// Recipe lines joined with their material's current stock.
///
/// Materials are not filtered by tenant so that a foreign material surfaces as
/// an integrity violation.
async fn fetch_components(conn: &mut PgConnection, recipe_id: i64) -> AppResult<Vec<ComponentStock>> {
    let rows = sqlx::query_as::<_, ComponentRow>(
        r#"
        SELECT rl.material_id, m.name AS material_name, m.tenant_id AS material_tenant_id,
               rl.quantity_per_batch, m.stock AS available
        FROM recipe_lines rl
        JOIN materials m ON m.id = rl.material_id
        WHERE rl.recipe_id = $1
        ORDER BY m.name, m.id
        "#,
    )
    .bind(recipe_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(ComponentStock::from).collect())
}

async fn lots_on_date(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    product_id: i64,
    date: NaiveDate,
) -> AppResult<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM product_lots
        WHERE tenant_id = $1 AND product_id = $2
          AND (produced_at AT TIME ZONE 'UTC')::date = $3
        "#,
    )
    .bind(tenant_id)
    .bind(product_id)
    .bind(date)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

fn log_shortfall(tenant_id: Uuid, order_id: i64, err: &LedgerError) {
    if let LedgerError::InsufficientStock(items) = err {
        tracing::warn!(
            %tenant_id,
            order_id,
            deficient = items.len(),
            detail = %err,
            "production order short of materials"
        );
    }
}

impl ProductionService {
    /// Create a new ProductionService instance
    pub fn new(db: PgPool, settings: LedgerSettings) -> Self {
        Self { db, settings }
    }

    /// Create a draft order for an active recipe of the product
    pub async fn create_production_order(
        &self,
        tenant_id: Uuid,
        actor: Uuid,
        input: CreateProductionOrderInput,
    ) -> AppResult<ProductionOrder> {
        let batch_multiplier = round_quantity(input.batch_multiplier);
        validate_positive("batch_multiplier", batch_multiplier)?;
        let note = validate_note(input.note.as_deref())?;

        let mut tx = self.db.begin().await?;
        let product = fetch_product(&mut tx, tenant_id, input.product_id, false).await?;
        let recipe = fetch_recipe(&mut tx, tenant_id, input.recipe_id).await?;

        if recipe.product_id != product.id {
            return Err(LedgerError::validation(
                "recipe_id",
                format!("recipe {} is not a recipe of {}", recipe.id, product.name),
            )
            .into());
        }
        if !recipe.is_active {
            return Err(LedgerError::validation("recipe_id", "recipe is not active").into());
        }

        let row = sqlx::query_as::<_, ProductionOrderRow>(&format!(
            r#"
            INSERT INTO production_orders
                (tenant_id, product_id, recipe_id, batch_multiplier, produced_at, state, note, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(tenant_id)
        .bind(product.id)
        .bind(recipe.id)
        .bind(batch_multiplier)
        .bind(input.produced_at.unwrap_or_else(Utc::now))
        .bind(ProductionState::Draft.as_str())
        .bind(&note)
        .bind(actor)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        let order = ProductionOrder::try_from(row)?;
        tracing::info!(
            %tenant_id,
            order_id = order.id,
            product_id = order.product_id,
            recipe_id = order.recipe_id,
            batch_multiplier = %order.batch_multiplier,
            "production order created"
        );

        Ok(order)
    }

    pub async fn get_production_order(&self, tenant_id: Uuid, order_id: i64) -> AppResult<ProductionOrder> {
        let mut conn = self.db.acquire().await?;
        fetch_order(&mut conn, tenant_id, order_id, false).await
    }

    /// Orders of the tenant, newest first
    pub async fn list_production_orders(
        &self,
        tenant_id: Uuid,
        state: Option<ProductionState>,
    ) -> AppResult<Vec<ProductionOrder>> {
        sqlx::query_as::<_, ProductionOrderRow>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM production_orders
            WHERE tenant_id = $1 AND ($2::text IS NULL OR state = $2)
            ORDER BY produced_at DESC, id DESC
            "#
        ))
        .bind(tenant_id)
        .bind(state.map(|s| s.as_str()))
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(ProductionOrder::try_from)
        .collect()
    }

    /// Every recipe line's requirement against current stock, short or not
    pub async fn production_requirements(
        &self,
        tenant_id: Uuid,
        order_id: i64,
    ) -> AppResult<Vec<Requirement>> {
        let mut conn = self.db.acquire().await?;
        let order = fetch_order(&mut conn, tenant_id, order_id, false).await?;
        let components = fetch_components(&mut conn, order.recipe_id).await?;
        Ok(requirements(&components, order.batch_multiplier))
    }

    /// Check material sufficiency without writing anything.
    ///
    /// Fails with every deficient material at once.
    pub async fn validate(&self, tenant_id: Uuid, order_id: i64) -> AppResult<Vec<Requirement>> {
        let mut conn = self.db.acquire().await?;
        let order = fetch_order(&mut conn, tenant_id, order_id, false).await?;
        let product = fetch_product(&mut conn, tenant_id, order.product_id, false).await?;
        let recipe = fetch_recipe(&mut conn, tenant_id, order.recipe_id).await?;
        let components = fetch_components(&mut conn, order.recipe_id).await?;

        let result = check_requirements(product.tenant_id, &components, order.batch_multiplier)
            .and_then(|reqs| {
                check_output(recipe.yield_per_batch, order.batch_multiplier)?;
                Ok(reqs)
            });
        match &result {
            Ok(reqs) => tracing::debug!(%tenant_id, order_id, lines = reqs.len(), "production order validated"),
            Err(err) => log_shortfall(tenant_id, order_id, err),
        }
        Ok(result?)
    }

    /// Execute a draft order: consume materials and mint one lot.
    ///
    /// An already executed order is left untouched.
    pub async fn execute(
        &self,
        tenant_id: Uuid,
        actor: Uuid,
        order_id: i64,
    ) -> AppResult<Transition<ProductLot>> {
        let mut tx = self.db.begin().await?;

        let order = match start_execution(fetch_order(&mut tx, tenant_id, order_id, true).await?) {
            Transition::Applied(order) => order,
            Transition::AlreadyDone => {
                tracing::debug!(%tenant_id, order_id, "production order already executed");
                return Ok(Transition::AlreadyDone);
            }
        };

        let product = fetch_product(&mut tx, tenant_id, order.product_id, true).await?;
        let recipe = fetch_recipe(&mut tx, tenant_id, order.recipe_id).await?;

        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT m.id
            FROM materials m
            WHERE m.id IN (SELECT material_id FROM recipe_lines WHERE recipe_id = $1)
            ORDER BY m.id
            FOR UPDATE
            "#,
        )
        .bind(recipe.id)
        .fetch_all(&mut *tx)
        .await?;

        let components = fetch_components(&mut tx, recipe.id).await?;
        let same_day = lots_on_date(&mut tx, tenant_id, product.id, order.produced_at.date_naive()).await?;

        let plan = plan_production(&order, &product, &recipe, &components, same_day)
            .inspect_err(|err| log_shortfall(tenant_id, order_id, err))?;

        let note = format!("production order {} · {}", order.id, product.name);
        for requirement in &plan.consumptions {
            post_with(
                &mut tx,
                tenant_id,
                Some(actor),
                MovementDraft {
                    material_id: requirement.material_id,
                    kind: MovementKind::Consumption,
                    quantity: requirement.required,
                    occurred_at: order.produced_at,
                    note: note.clone(),
                    production_order_id: Some(order.id),
                },
            )
            .await?;
        }

        sqlx::query("UPDATE production_orders SET state = $1, executed_at = NOW() WHERE id = $2")
            .bind(ProductionState::Executed.as_str())
            .bind(order.id)
            .execute(&mut *tx)
            .await?;

        let today = today();
        let status = derive_status(plan.expiry_date, today, self.settings.near_expiry_days);
        let lot_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO product_lots
                (tenant_id, product_id, code, production_order_id, produced_at, expiry_date,
                 initial_quantity, available_quantity, status, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(tenant_id)
        .bind(product.id)
        .bind(&plan.lot_code)
        .bind(order.id)
        .bind(order.produced_at)
        .bind(plan.expiry_date)
        .bind(plan.finished_quantity)
        .bind(status.as_str())
        .bind(actor)
        .fetch_one(&mut *tx)
        .await?;

        let lot = fetch_lot(&mut tx, tenant_id, lot_id).await?;
        tx.commit().await?;

        tracing::info!(
            %tenant_id,
            order_id,
            lot_id,
            lot_code = %lot.code,
            quantity = %lot.initial_quantity,
            consumptions = plan.consumptions.len(),
            "production order executed"
        );

        Ok(Transition::Applied(lot))
    }
}
