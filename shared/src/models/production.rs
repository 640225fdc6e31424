//! Production orders: recipe-driven transformation of materials into a lot

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{expiry_date, Product, Recipe};
use crate::error::{LedgerError, LedgerResult, Shortfall};
use crate::types::Transition;
use crate::validation::{round_quantity, validate_positive};

/// Production order state. Executed is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionState {
    Draft,
    Executed,
}

impl ProductionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductionState::Draft => "draft",
            ProductionState::Executed => "executed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(ProductionState::Draft),
            "executed" => Some(ProductionState::Executed),
            _ => None,
        }
    }
}

/// A request to run `batch_multiplier` batches of a recipe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionOrder {
    pub id: i64,
    pub tenant_id: Uuid,
    pub product_id: i64,
    pub recipe_id: i64,
    pub batch_multiplier: Decimal,
    pub produced_at: DateTime<Utc>,
    pub state: ProductionState,
    pub note: String,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ProductionOrder {
    pub fn is_executed(&self) -> bool {
        self.state == ProductionState::Executed
    }
}

/// Whether a locked order still has to be executed.
///
/// An executed order yields `AlreadyDone` and nothing may be written for it.
pub fn start_execution(order: ProductionOrder) -> Transition<ProductionOrder> {
    if order.is_executed() {
        Transition::AlreadyDone
    } else {
        Transition::Applied(order)
    }
}

/// A recipe line joined with the current state of its material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentStock {
    pub material_id: i64,
    pub material_name: String,
    pub material_tenant_id: Uuid,
    pub quantity_per_batch: Decimal,
    pub available: Decimal,
}

/// What one recipe line needs for a given order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Requirement {
    pub material_id: i64,
    pub material_name: String,
    pub required: Decimal,
    pub available: Decimal,
}

impl Requirement {
    pub fn is_short(&self) -> bool {
        self.available < self.required
    }
}

/// Per-line requirements in material-name order, short or not
pub fn requirements(components: &[ComponentStock], batch_multiplier: Decimal) -> Vec<Requirement> {
    let mut requirements: Vec<Requirement> = components
        .iter()
        .map(|c| Requirement {
            material_id: c.material_id,
            material_name: c.material_name.clone(),
            required: round_quantity(c.quantity_per_batch * batch_multiplier),
            available: c.available,
        })
        .collect();
    requirements.sort_by(|a, b| {
        a.material_name
            .cmp(&b.material_name)
            .then(a.material_id.cmp(&b.material_id))
    });
    requirements
}

/// Material requirements in material-name order.
///
/// Fails with an integrity error as soon as a material from another tenant
/// shows up, and otherwise with one insufficient-stock error naming every
/// deficient material.
pub fn check_requirements(
    product_tenant: Uuid,
    components: &[ComponentStock],
    batch_multiplier: Decimal,
) -> LedgerResult<Vec<Requirement>> {
    if let Some(foreign) = components
        .iter()
        .find(|c| c.material_tenant_id != product_tenant)
    {
        return Err(LedgerError::integrity(format!(
            "material {} ({}) and the ordered product belong to different tenants",
            foreign.material_id, foreign.material_name
        )));
    }

    let requirements = requirements(components, batch_multiplier);

    if let Some(vanishing) = requirements.iter().find(|r| r.required <= Decimal::ZERO) {
        return Err(LedgerError::validation(
            "batch_multiplier",
            format!(
                "{} needed for {} rounds to zero at storage scale",
                vanishing.material_name, batch_multiplier
            ),
        ));
    }

    let shortfalls: Vec<Shortfall> = requirements
        .iter()
        .filter(|r| r.is_short())
        .map(|r| Shortfall {
            item_id: r.material_id,
            name: r.material_name.clone(),
            required: r.required,
            available: r.available,
        })
        .collect();

    if !shortfalls.is_empty() {
        return Err(LedgerError::InsufficientStock(shortfalls));
    }

    Ok(requirements)
}

/// Finished units produced by an order
pub fn finished_quantity(yield_per_batch: Decimal, batch_multiplier: Decimal) -> Decimal {
    round_quantity(yield_per_batch * batch_multiplier)
}

/// Finished units, rejected when they round to nothing
pub fn check_output(yield_per_batch: Decimal, batch_multiplier: Decimal) -> LedgerResult<Decimal> {
    let quantity = finished_quantity(yield_per_batch, batch_multiplier);
    if quantity <= Decimal::ZERO {
        return Err(LedgerError::validation(
            "batch_multiplier",
            format!("output of {batch_multiplier} batches rounds to zero at storage scale"),
        ));
    }
    Ok(quantity)
}

/// Lot code `{productId}-{YYYYMMDD}-{NNN}`.
///
/// `sequence` is one more than the number of lots of the product already
/// produced on that date.
pub fn lot_code(product_id: i64, production_date: NaiveDate, sequence: i64) -> String {
    format!(
        "{}-{}-{:03}",
        product_id,
        production_date.format("%Y%m%d"),
        sequence
    )
}

/// Everything an execution writes, computed before the first write
#[derive(Debug, Clone, Serialize)]
pub struct ProductionPlan {
    /// One consumption per recipe line, in material-name order
    pub consumptions: Vec<Requirement>,
    pub finished_quantity: Decimal,
    pub production_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub lot_code: String,
}

/// Plan the execution of a draft order.
///
/// `lots_same_day` is the number of lots of this product (and tenant) that
/// already carry the order's production date.
pub fn plan_production(
    order: &ProductionOrder,
    product: &Product,
    recipe: &Recipe,
    components: &[ComponentStock],
    lots_same_day: i64,
) -> LedgerResult<ProductionPlan> {
    if product.tenant_id != order.tenant_id {
        return Err(LedgerError::integrity(format!(
            "product {} does not belong to the order's tenant",
            product.id
        )));
    }
    if recipe.product_id != product.id || order.recipe_id != recipe.id {
        return Err(LedgerError::integrity(format!(
            "recipe {} is not a recipe of product {}",
            recipe.id, product.id
        )));
    }
    validate_positive("batch_multiplier", order.batch_multiplier)?;

    let consumptions = check_requirements(product.tenant_id, components, order.batch_multiplier)?;
    let finished_quantity = check_output(recipe.yield_per_batch, order.batch_multiplier)?;
    let production_date = order.produced_at.date_naive();

    Ok(ProductionPlan {
        consumptions,
        finished_quantity,
        production_date,
        expiry_date: expiry_date(order.produced_at, product.shelf_life_days),
        lot_code: lot_code(product.id, production_date, lots_same_day + 1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lot_code_format() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(lot_code(7, date, 3), "7-20240115-003");
        assert_eq!(lot_code(12, date, 1000), "12-20240115-1000");
    }

    #[test]
    fn test_finished_quantity() {
        assert_eq!(
            finished_quantity(Decimal::from(12), Decimal::new(15, 1)),
            Decimal::from(18)
        );
    }

    #[test]
    fn test_requirements_keep_every_line_in_name_order() {
        let tenant = Uuid::new_v4();
        let component = |id: i64, name: &str, per_batch: i64, available: i64| ComponentStock {
            material_id: id,
            material_name: name.to_string(),
            material_tenant_id: tenant,
            quantity_per_batch: Decimal::from(per_batch),
            available: Decimal::from(available),
        };
        let lines = [component(2, "sugar", 3, 1), component(1, "flour", 2, 50)];

        let reqs = requirements(&lines, Decimal::from(2));
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].material_name, "flour");
        assert!(!reqs[0].is_short());
        assert_eq!(reqs[1].required, Decimal::from(6));
        assert!(reqs[1].is_short());
    }

    #[test]
    fn test_required_quantity_is_rounded_to_storage_scale() {
        let tenant = Uuid::new_v4();
        let lines = [ComponentStock {
            material_id: 1,
            material_name: "yeast".to_string(),
            material_tenant_id: tenant,
            quantity_per_batch: Decimal::new(125, 3),
            available: Decimal::ONE,
        }];
        let reqs = requirements(&lines, Decimal::new(5, 1));
        assert_eq!(reqs[0].required, Decimal::new(63, 3));
    }

    #[test]
    fn test_state_storage_names() {
        assert_eq!(ProductionState::from_str("executed"), Some(ProductionState::Executed));
        assert_eq!(ProductionState::Draft.as_str(), "draft");
        assert_eq!(ProductionState::from_str("consumed"), None);
    }
}
