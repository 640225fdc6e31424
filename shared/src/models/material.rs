//! Raw materials and the signed stock movements that make up their kardex

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::format_quantity;

/// A tenant-scoped raw material with its cached stock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    pub id: i64,
    pub tenant_id: Uuid,
    pub name: String,
    pub unit_id: i32,
    pub unit_name: String,
    /// Materialized sum of every movement's signed quantity
    pub stock: Decimal,
    pub reorder_threshold: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Material {
    /// Stock at or below the reorder threshold
    pub fn needs_reorder(&self) -> bool {
        self.stock <= self.reorder_threshold
    }

    pub fn stock_display(&self) -> String {
        format_quantity(self.stock, &self.unit_name)
    }
}

/// Kind of stock movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Inflow,
    Consumption,
    AdjustmentUp,
    AdjustmentDown,
    /// Unusable or lost material (spoilage, breakage)
    Shrinkage,
}

impl MovementKind {
    pub const ALL: [MovementKind; 5] = [
        MovementKind::Inflow,
        MovementKind::Consumption,
        MovementKind::AdjustmentUp,
        MovementKind::AdjustmentDown,
        MovementKind::Shrinkage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Inflow => "inflow",
            MovementKind::Consumption => "consumption",
            MovementKind::AdjustmentUp => "adjustment_up",
            MovementKind::AdjustmentDown => "adjustment_down",
            MovementKind::Shrinkage => "shrinkage",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "inflow" => Some(MovementKind::Inflow),
            "consumption" => Some(MovementKind::Consumption),
            "adjustment_up" => Some(MovementKind::AdjustmentUp),
            "adjustment_down" => Some(MovementKind::AdjustmentDown),
            "shrinkage" => Some(MovementKind::Shrinkage),
            _ => None,
        }
    }

    /// Inflows and upward adjustments add stock, everything else removes it
    pub fn is_inbound(&self) -> bool {
        matches!(self, MovementKind::Inflow | MovementKind::AdjustmentUp)
    }

    /// Contribution of `quantity` to the material's stock
    pub fn signed(&self, quantity: Decimal) -> Decimal {
        if self.is_inbound() {
            quantity
        } else {
            -quantity
        }
    }
}

impl std::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One kardex entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: i64,
    pub material_id: i64,
    pub kind: MovementKind,
    /// Always positive; the sign comes from `kind`
    pub quantity: Decimal,
    pub occurred_at: DateTime<Utc>,
    pub note: String,
    pub created_by: Option<Uuid>,
}

impl StockMovement {
    pub fn signed_quantity(&self) -> Decimal {
        self.kind.signed(self.quantity)
    }

    /// Stock change when this movement's quantity becomes `new_quantity`
    pub fn amend_delta(&self, new_quantity: Decimal) -> Decimal {
        stock_delta(Some(self.signed_quantity()), Some(self.kind.signed(new_quantity)))
    }

    /// Stock change when this movement is removed
    pub fn retract_delta(&self) -> Decimal {
        stock_delta(Some(self.signed_quantity()), None)
    }
}

/// Change to apply to the cached stock when a movement goes from `before` to
/// `after` (signed contributions; `None` means the movement does not exist).
///
/// Posting is `(None, Some(new))`, amending `(Some(old), Some(new))` and
/// retracting `(Some(old), None)`.
pub fn stock_delta(before: Option<Decimal>, after: Option<Decimal>) -> Decimal {
    after.unwrap_or(Decimal::ZERO) - before.unwrap_or(Decimal::ZERO)
}

/// Full recomputation of stock from history. Offline consistency checks only.
pub fn recompute_stock<'a>(movements: impl IntoIterator<Item = &'a StockMovement>) -> Decimal {
    movements
        .into_iter()
        .map(StockMovement::signed_quantity)
        .sum()
}

/// Material whose cached stock drifted from its movement history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockDiscrepancy {
    pub material_id: i64,
    pub material_name: String,
    pub cached: Decimal,
    pub recomputed: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_contribution() {
        let qty = Decimal::from(5);
        assert_eq!(MovementKind::Inflow.signed(qty), Decimal::from(5));
        assert_eq!(MovementKind::AdjustmentUp.signed(qty), Decimal::from(5));
        assert_eq!(MovementKind::Consumption.signed(qty), Decimal::from(-5));
        assert_eq!(MovementKind::AdjustmentDown.signed(qty), Decimal::from(-5));
        assert_eq!(MovementKind::Shrinkage.signed(qty), Decimal::from(-5));
    }

    #[test]
    fn test_kind_round_trips_through_storage_name() {
        for kind in MovementKind::ALL {
            assert_eq!(MovementKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(MovementKind::from_str("merma"), None);
    }

    #[test]
    fn test_stock_delta_for_each_operation() {
        let old = Some(Decimal::from(-3));
        let new = Some(Decimal::from(4));
        assert_eq!(stock_delta(None, new), Decimal::from(4));
        assert_eq!(stock_delta(old, new), Decimal::from(7));
        assert_eq!(stock_delta(old, None), Decimal::from(3));
    }

    #[test]
    fn test_needs_reorder_at_threshold() {
        let mut material = Material {
            id: 1,
            tenant_id: Uuid::nil(),
            name: "Flour".to_string(),
            unit_id: 1,
            unit_name: "kg".to_string(),
            stock: Decimal::from(5),
            reorder_threshold: Decimal::from(5),
            is_active: true,
            created_at: Utc::now(),
        };
        assert!(material.needs_reorder());
        material.stock = Decimal::new(51, 1);
        assert!(!material.needs_reorder());
        assert_eq!(material.stock_display(), "5.1 kg");
    }
}
