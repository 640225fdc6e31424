//! Unit catalog: global, read-only reference data

use shared::{Dimension, Unit};
use sqlx::{FromRow, PgPool};

use crate::error::{AppError, AppResult};

/// Unit service for looking up measurement units
#[derive(Clone)]
pub struct UnitService {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct UnitRow {
    id: i32,
    name: String,
    dimension: String,
}

impl TryFrom<UnitRow> for Unit {
    type Error = AppError;

    fn try_from(row: UnitRow) -> Result<Self, Self::Error> {
        let dimension = Dimension::from_str(&row.dimension)
            .ok_or_else(|| AppError::Internal(format!("unknown unit dimension {}", row.dimension)))?;
        Ok(Unit {
            id: row.id,
            name: row.name,
            dimension,
        })
    }
}

impl UnitService {
    /// Create a new UnitService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// All units, by name
    pub async fn list_units(&self) -> AppResult<Vec<Unit>> {
        sqlx::query_as::<_, UnitRow>("SELECT id, name, dimension FROM units ORDER BY name")
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(Unit::try_from)
            .collect()
    }

    /// Case-insensitive lookup by name
    pub async fn unit_by_name(&self, name: &str) -> AppResult<Unit> {
        sqlx::query_as::<_, UnitRow>(
            "SELECT id, name, dimension FROM units WHERE lower(name) = lower($1)",
        )
        .bind(name.trim())
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("unit"))?
        .try_into()
    }
}
