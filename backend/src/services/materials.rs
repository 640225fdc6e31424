//! Material registry: per-tenant raw materials and their cached stock
//!
//! Stock is never written here; it changes only through the movement ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{format_quantity, validate_name, validate_non_negative, Material};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Material service for the raw-material registry
#[derive(Clone)]
pub struct MaterialService {
    db: PgPool,
}

pub(crate) const MATERIAL_COLUMNS: &str = r#"
    m.id, m.tenant_id, m.name, m.unit_id, u.name AS unit_name, m.stock,
    m.reorder_threshold, m.is_active, m.created_at
"#;

#[derive(Debug, FromRow)]
pub(crate) struct MaterialRow {
    id: i64,
    tenant_id: Uuid,
    name: String,
    unit_id: i32,
    unit_name: String,
    stock: Decimal,
    reorder_threshold: Decimal,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<MaterialRow> for Material {
    fn from(row: MaterialRow) -> Self {
        Material {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            unit_id: row.unit_id,
            unit_name: row.unit_name,
            stock: row.stock,
            reorder_threshold: row.reorder_threshold,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

/// Input for creating a material
#[derive(Debug, Deserialize, Validate)]
pub struct CreateMaterialInput {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub unit_id: i32,
    pub reorder_threshold: Option<Decimal>,
}

/// Stock lookup result
#[derive(Debug, Clone, Serialize)]
pub struct MaterialStock {
    pub material_id: i64,
    pub name: String,
    pub unit_name: String,
    pub stock: Decimal,
    pub reorder_threshold: Decimal,
    pub below_threshold: bool,
    pub display: String,
}

impl From<&Material> for MaterialStock {
    fn from(material: &Material) -> Self {
        MaterialStock {
            material_id: material.id,
            name: material.name.clone(),
            unit_name: material.unit_name.clone(),
            stock: material.stock,
            reorder_threshold: material.reorder_threshold,
            below_threshold: material.needs_reorder(),
            display: format_quantity(material.stock, &material.unit_name),
        }
    }
}

impl MaterialService {
    /// Create a new MaterialService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Register a raw material with zero stock
    pub async fn create_material(
        &self,
        tenant_id: Uuid,
        input: CreateMaterialInput,
    ) -> AppResult<Material> {
        input.validate()?;
        let name = validate_name("name", &input.name)?;
        let threshold = input.reorder_threshold.unwrap_or(Decimal::ZERO);
        validate_non_negative("reorder_threshold", threshold)?;

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
            INSERT INTO materials (tenant_id, name, unit_id, reorder_threshold)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(tenant_id)
        .bind(&name)
        .bind(input.unit_id)
        .bind(threshold)
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::unique_violation(e, "material"))?;

        tracing::info!(%tenant_id, material_id = id, name = %name, "material created");

        self.get_material(tenant_id, id).await
    }

    /// Get a material of the tenant
    pub async fn get_material(&self, tenant_id: Uuid, material_id: i64) -> AppResult<Material> {
        let row = sqlx::query_as::<_, MaterialRow>(&format!(
            r#"
            SELECT {MATERIAL_COLUMNS}
            FROM materials m
            JOIN units u ON u.id = m.unit_id
            WHERE m.id = $1 AND m.tenant_id = $2
            "#
        ))
        .bind(material_id)
        .bind(tenant_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("material"))?;

        Ok(row.into())
    }

    /// Current stock of a material
    pub async fn material_stock(
        &self,
        tenant_id: Uuid,
        material_id: i64,
    ) -> AppResult<MaterialStock> {
        let material = self.get_material(tenant_id, material_id).await?;
        Ok(MaterialStock::from(&material))
    }

    /// List materials of the tenant by name
    pub async fn list_materials(&self, tenant_id: Uuid, active_only: bool) -> AppResult<Vec<Material>> {
        let rows = sqlx::query_as::<_, MaterialRow>(&format!(
            r#"
            SELECT {MATERIAL_COLUMNS}
            FROM materials m
            JOIN units u ON u.id = m.unit_id
            WHERE m.tenant_id = $1 AND (m.is_active OR NOT $2)
            ORDER BY m.name
            "#
        ))
        .bind(tenant_id)
        .bind(active_only)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Material::from).collect())
    }

    /// Active materials at or below their reorder threshold
    pub async fn low_stock_materials(&self, tenant_id: Uuid) -> AppResult<Vec<MaterialStock>> {
        let rows = sqlx::query_as::<_, MaterialRow>(&format!(
            r#"
            SELECT {MATERIAL_COLUMNS}
            FROM materials m
            JOIN units u ON u.id = m.unit_id
            WHERE m.tenant_id = $1 AND m.is_active AND m.stock <= m.reorder_threshold
            ORDER BY m.name
            "#
        ))
        .bind(tenant_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(Material::from)
            .map(|m| MaterialStock::from(&m))
            .collect())
    }

    /// Activate or deactivate a material. Materials are never deleted.
    pub async fn set_material_active(
        &self,
        tenant_id: Uuid,
        material_id: i64,
        active: bool,
    ) -> AppResult<Material> {
        let result = sqlx::query("UPDATE materials SET is_active = $1 WHERE id = $2 AND tenant_id = $3")
            .bind(active)
            .bind(material_id)
            .bind(tenant_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("material"));
        }

        self.get_material(tenant_id, material_id).await
    }

    /// Change the reorder threshold
    pub async fn update_reorder_threshold(
        &self,
        tenant_id: Uuid,
        material_id: i64,
        threshold: Decimal,
    ) -> AppResult<Material> {
        validate_non_negative("reorder_threshold", threshold)?;

        let result =
            sqlx::query("UPDATE materials SET reorder_threshold = $1 WHERE id = $2 AND tenant_id = $3")
                .bind(threshold)
                .bind(material_id)
                .bind(tenant_id)
                .execute(&self.db)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("material"));
        }

        self.get_material(tenant_id, material_id).await
    }
}
