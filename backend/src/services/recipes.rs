//! Recipe catalog: versioned bills of materials per product
//!
//! Recipes are append-only. Changing a formula means creating a new version;
//! the only mutation after creation is deactivation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{
    normalize_recipe, validate_name, validate_recipe, Recipe, RecipeLine, RecipeLineDraft,
    RecipeWithLines,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use super::products::fetch_product;
use crate::error::{AppError, AppResult};

/// Recipe service
#[derive(Clone)]
pub struct RecipeService {
    db: PgPool,
}

const RECIPE_COLUMNS: &str = r#"
    r.id, r.product_id, r.name, r.version, r.yield_per_batch, r.description,
    r.is_active, r.created_at
"#;

#[derive(Debug, FromRow)]
struct RecipeRow {
    id: i64,
    product_id: i64,
    name: String,
    version: i32,
    yield_per_batch: Decimal,
    description: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<RecipeRow> for Recipe {
    fn from(row: RecipeRow) -> Self {
        Recipe {
            id: row.id,
            product_id: row.product_id,
            name: row.name,
            version: row.version,
            yield_per_batch: row.yield_per_batch,
            description: row.description,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct RecipeLineRow {
    id: i64,
    recipe_id: i64,
    material_id: i64,
    material_name: String,
    unit_name: String,
    quantity_per_batch: Decimal,
}

impl From<RecipeLineRow> for RecipeLine {
    fn from(row: RecipeLineRow) -> Self {
        RecipeLine {
            id: row.id,
            recipe_id: row.recipe_id,
            material_id: row.material_id,
            material_name: row.material_name,
            unit_name: row.unit_name,
            quantity_per_batch: row.quantity_per_batch,
        }
    }
}

/// Input for creating a recipe version
#[derive(Debug, Deserialize, Validate)]
pub struct CreateRecipeInput {
    pub product_id: i64,
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(range(min = 1))]
    pub version: i32,
    pub yield_per_batch: Decimal,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub lines: Vec<RecipeLineDraft>,
}

/// Load a recipe whose product belongs to the tenant
pub(crate) async fn fetch_recipe(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    recipe_id: i64,
) -> AppResult<Recipe> {
    let row = sqlx::query_as::<_, RecipeRow>(&format!(
        r#"
        SELECT {RECIPE_COLUMNS}
        FROM recipes r
        JOIN products p ON p.id = r.product_id
        WHERE r.id = $1 AND p.tenant_id = $2
        "#
    ))
    .bind(recipe_id)
    .bind(tenant_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("recipe"))?;

    Ok(row.into())
}

async fn fetch_lines(conn: &mut PgConnection, recipe_id: i64) -> AppResult<Vec<RecipeLine>> {
    let rows = sqlx::query_as::<_, RecipeLineRow>(
        r#"
        SELECT rl.id, rl.recipe_id, rl.material_id, m.name AS material_name,
               u.name AS unit_name, rl.quantity_per_batch
        FROM recipe_lines rl
        JOIN materials m ON m.id = rl.material_id
        JOIN units u ON u.id = m.unit_id
        WHERE rl.recipe_id = $1
        ORDER BY m.name, rl.material_id
        "#,
    )
    .bind(recipe_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(RecipeLine::from).collect())
}

impl RecipeService {
    /// Create a new RecipeService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a recipe version with its lines
    pub async fn create_recipe(
        &self,
        tenant_id: Uuid,
        input: CreateRecipeInput,
    ) -> AppResult<RecipeWithLines> {
        input.validate()?;
        let name = validate_name("name", &input.name)?;
        let (yield_per_batch, lines) = normalize_recipe(input.yield_per_batch, input.lines);

        let mut tx = self.db.begin().await?;

        let product = fetch_product(&mut tx, tenant_id, input.product_id, false).await?;

        // Not tenant-scoped: a foreign material is an integrity violation, not a miss
        let material_ids: Vec<i64> = lines.iter().map(|l| l.material_id).collect();
        let material_tenants: HashMap<i64, Uuid> = sqlx::query_as::<_, (i64, Uuid)>(
            "SELECT id, tenant_id FROM materials WHERE id = ANY($1)",
        )
        .bind(&material_ids)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();

        validate_recipe(
            product.tenant_id,
            yield_per_batch,
            &lines,
            &material_tenants,
        )?;

        let recipe_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO recipes (product_id, name, version, yield_per_batch, description)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(product.id)
        .bind(&name)
        .bind(input.version)
        .bind(yield_per_batch)
        .bind(input.description.as_deref().map(str::trim))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::unique_violation(e, "recipe version"))?;

        for line in &lines {
            sqlx::query(
                r#"
                INSERT INTO recipe_lines (recipe_id, material_id, quantity_per_batch)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(recipe_id)
            .bind(line.material_id)
            .bind(line.quantity_per_batch)
            .execute(&mut *tx)
            .await?;
        }

        let recipe = fetch_recipe(&mut tx, tenant_id, recipe_id).await?;
        let lines = fetch_lines(&mut tx, recipe_id).await?;
        tx.commit().await?;

        tracing::info!(
            %tenant_id,
            recipe_id,
            product_id = product.id,
            version = recipe.version,
            lines = lines.len(),
            "recipe created"
        );

        Ok(RecipeWithLines { recipe, lines })
    }

    /// Recipe with its lines in material-name order
    pub async fn get_recipe(&self, tenant_id: Uuid, recipe_id: i64) -> AppResult<RecipeWithLines> {
        let mut conn = self.db.acquire().await?;
        let recipe = fetch_recipe(&mut conn, tenant_id, recipe_id).await?;
        let lines = fetch_lines(&mut conn, recipe_id).await?;
        Ok(RecipeWithLines { recipe, lines })
    }

    /// Active recipes of a product, by name and newest version first
    pub async fn active_recipes(&self, tenant_id: Uuid, product_id: i64) -> AppResult<Vec<Recipe>> {
        let mut conn = self.db.acquire().await?;
        fetch_product(&mut conn, tenant_id, product_id, false).await?;

        let rows = sqlx::query_as::<_, RecipeRow>(&format!(
            r#"
            SELECT {RECIPE_COLUMNS}
            FROM recipes r
            WHERE r.product_id = $1 AND r.is_active
            ORDER BY r.name, r.version DESC
            "#
        ))
        .bind(product_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().map(Recipe::from).collect())
    }

    /// Withdraw a recipe from production use
    pub async fn deactivate_recipe(&self, tenant_id: Uuid, recipe_id: i64) -> AppResult<Recipe> {
        let result = sqlx::query(
            r#"
            UPDATE recipes r SET is_active = FALSE
            FROM products p
            WHERE r.id = $1 AND p.id = r.product_id AND p.tenant_id = $2
            "#,
        )
        .bind(recipe_id)
        .bind(tenant_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("recipe"));
        }

        tracing::info!(%tenant_id, recipe_id, "recipe deactivated");

        let mut conn = self.db.acquire().await?;
        fetch_recipe(&mut conn, tenant_id, recipe_id).await
    }
}
