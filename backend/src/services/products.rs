//! Finished-product registry

use chrono::{DateTime, Utc};
use serde::Deserialize;
use shared::{validate_name, validate_shelf_life, Product, DEFAULT_SHELF_LIFE_DAYS};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Product service
#[derive(Clone)]
pub struct ProductService {
    db: PgPool,
}

const PRODUCT_COLUMNS: &str = r#"
    p.id, p.tenant_id, p.name, p.unit_id, u.name AS unit_name, p.shelf_life_days,
    p.is_active, p.created_at
"#;

#[derive(Debug, FromRow)]
struct ProductRow {
    id: i64,
    tenant_id: Uuid,
    name: String,
    unit_id: i32,
    unit_name: String,
    shelf_life_days: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            unit_id: row.unit_id,
            unit_name: row.unit_name,
            shelf_life_days: row.shelf_life_days,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

/// Input for creating a product
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub unit_id: i32,
    #[validate(range(min = 0, max = 3650))]
    pub shelf_life_days: Option<i32>,
}

/// Load a product of the tenant on an open connection, optionally locking it
pub(crate) async fn fetch_product(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    product_id: i64,
    for_update: bool,
) -> AppResult<Product> {
    let lock = if for_update { "FOR UPDATE OF p" } else { "" };
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        r#"
        SELECT {PRODUCT_COLUMNS}
        FROM products p
        JOIN units u ON u.id = p.unit_id
        WHERE p.id = $1 AND p.tenant_id = $2
        {lock}
        "#
    ))
    .bind(product_id)
    .bind(tenant_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("product"))?;

    Ok(row.into())
}

impl ProductService {
    /// Create a new ProductService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Register a finished product
    pub async fn create_product(&self, tenant_id: Uuid, input: CreateProductInput) -> AppResult<Product> {
        input.validate()?;
        let name = validate_name("name", &input.name)?;
        let shelf_life_days = input.shelf_life_days.unwrap_or(DEFAULT_SHELF_LIFE_DAYS);
        validate_shelf_life(shelf_life_days)?;

        let unit_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM units WHERE id = $1)")
                .bind(input.unit_id)
                .fetch_one(&self.db)
                .await?;
        if !unit_exists {
            return Err(AppError::not_found("unit"));
        }

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO products (tenant_id, name, unit_id, shelf_life_days)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(tenant_id)
        .bind(&name)
        .bind(input.unit_id)
        .bind(shelf_life_days)
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::unique_violation(e, "product"))?;

        tracing::info!(%tenant_id, product_id = id, name = %name, shelf_life_days, "product created");

        self.get_product(tenant_id, id).await
    }

    /// Get a product of the tenant
    pub async fn get_product(&self, tenant_id: Uuid, product_id: i64) -> AppResult<Product> {
        let mut conn = self.db.acquire().await?;
        fetch_product(&mut conn, tenant_id, product_id, false).await
    }

    /// Products of the tenant by name
    pub async fn list_products(&self, tenant_id: Uuid, active_only: bool) -> AppResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS}
            FROM products p
            JOIN units u ON u.id = p.unit_id
            WHERE p.tenant_id = $1 AND (p.is_active OR NOT $2)
            ORDER BY p.name
            "#
        ))
        .bind(tenant_id)
        .bind(active_only)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }
}
