//! Versioned bills of materials

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::validation::{ensure_distinct, round_quantity, validate_positive};

/// A recipe version for a product.
///
/// Recipes are never edited in place once created; a change is a new version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub id: i64,
    pub product_id: i64,
    pub name: String,
    pub version: i32,
    /// Finished units produced by one batch
    pub yield_per_batch: Decimal,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Material requirement per batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeLine {
    pub id: i64,
    pub recipe_id: i64,
    pub material_id: i64,
    pub material_name: String,
    pub unit_name: String,
    pub quantity_per_batch: Decimal,
}

/// Recipe with its lines in material-name order
#[derive(Debug, Clone, Serialize)]
pub struct RecipeWithLines {
    #[serde(flatten)]
    pub recipe: Recipe,
    pub lines: Vec<RecipeLine>,
}

/// Line supplied when creating a recipe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeLineDraft {
    pub material_id: i64,
    pub quantity_per_batch: Decimal,
}

/// Round the yield and every line quantity to storage scale.
///
/// Runs before `validate_recipe` so a quantity that would be stored as zero is
/// rejected as a validation error.
pub fn normalize_recipe(
    yield_per_batch: Decimal,
    lines: Vec<RecipeLineDraft>,
) -> (Decimal, Vec<RecipeLineDraft>) {
    let lines = lines
        .into_iter()
        .map(|line| RecipeLineDraft {
            quantity_per_batch: round_quantity(line.quantity_per_batch),
            ..line
        })
        .collect();
    (round_quantity(yield_per_batch), lines)
}

/// Validate a new recipe before anything is written.
///
/// `material_tenants` maps every known material id to its tenant. A material
/// missing from the map does not exist; one from another tenant is an
/// integrity violation rather than a lookup miss.
pub fn validate_recipe(
    product_tenant: Uuid,
    yield_per_batch: Decimal,
    lines: &[RecipeLineDraft],
    material_tenants: &HashMap<i64, Uuid>,
) -> LedgerResult<()> {
    validate_positive("yield_per_batch", yield_per_batch)?;

    if lines.is_empty() {
        return Err(LedgerError::validation(
            "lines",
            "a recipe needs at least one material",
        ));
    }

    for line in lines {
        validate_positive("quantity_per_batch", line.quantity_per_batch)?;
    }

    ensure_distinct("material", lines.iter().map(|l| l.material_id))?;

    for line in lines {
        let tenant = material_tenants
            .get(&line.material_id)
            .ok_or(LedgerError::NotFound("material"))?;
        if *tenant != product_tenant {
            return Err(LedgerError::integrity(format!(
                "material {} does not belong to the recipe's tenant",
                line.material_id
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(material_id: i64, qty: i64) -> RecipeLineDraft {
        RecipeLineDraft {
            material_id,
            quantity_per_batch: Decimal::from(qty),
        }
    }

    #[test]
    fn test_valid_recipe() {
        let tenant = Uuid::new_v4();
        let owners = HashMap::from([(1, tenant), (2, tenant)]);
        let lines = vec![line(1, 2), line(2, 1)];
        assert!(validate_recipe(tenant, Decimal::from(12), &lines, &owners).is_ok());
    }

    #[test]
    fn test_zero_yield_rejected() {
        let tenant = Uuid::new_v4();
        let owners = HashMap::from([(1, tenant)]);
        let err = validate_recipe(tenant, Decimal::ZERO, &[line(1, 1)], &owners).unwrap_err();
        assert!(matches!(err, LedgerError::Validation { ref field, .. } if field == "yield_per_batch"));
    }

    #[test]
    fn test_unknown_material_is_not_found() {
        let tenant = Uuid::new_v4();
        let err = validate_recipe(tenant, Decimal::ONE, &[line(9, 1)], &HashMap::new()).unwrap_err();
        assert_eq!(err, LedgerError::NotFound("material"));
    }
}
