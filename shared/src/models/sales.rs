//! Sales orders and first-expired-first-out lot allocation

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ProductLot;
use crate::error::{LedgerError, LedgerResult, Shortfall};
use crate::types::Transition;
use crate::validation::{ensure_distinct, validate_positive};

/// Sales order state. Confirmed is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalesState {
    Draft,
    Confirmed,
}

impl SalesState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SalesState::Draft => "draft",
            SalesState::Confirmed => "confirmed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(SalesState::Draft),
            "confirmed" => Some(SalesState::Confirmed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesOrder {
    pub id: i64,
    pub tenant_id: Uuid,
    pub ordered_at: DateTime<Utc>,
    pub state: SalesState,
    pub note: String,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl SalesOrder {
    pub fn is_confirmed(&self) -> bool {
        self.state == SalesState::Confirmed
    }
}

/// Whether a locked order still has to be confirmed.
///
/// A confirmed order yields `AlreadyDone` and nothing may be written for it.
pub fn start_confirmation(order: SalesOrder) -> Transition<SalesOrder> {
    if order.is_confirmed() {
        Transition::AlreadyDone
    } else {
        Transition::Applied(order)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesLine {
    pub id: i64,
    pub sales_order_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub product_tenant_id: Uuid,
    pub quantity: Decimal,
}

/// Immutable audit record of units taken from a lot for a sales line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesConsumption {
    pub id: i64,
    pub sales_order_id: i64,
    pub sales_line_id: i64,
    pub lot_id: i64,
    pub lot_code: String,
    pub quantity: Decimal,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SalesOrderDetail {
    #[serde(flatten)]
    pub order: SalesOrder,
    pub lines: Vec<SalesLine>,
    pub consumptions: Vec<SalesConsumption>,
}

/// Line supplied when creating a sales order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesLineDraft {
    pub product_id: i64,
    pub quantity: Decimal,
}

/// Positive quantities, one line per product
pub fn validate_line_drafts(lines: &[SalesLineDraft]) -> LedgerResult<()> {
    for line in lines {
        validate_positive("quantity", line.quantity)?;
    }
    ensure_distinct("product", lines.iter().map(|l| l.product_id))
}

/// Every line's product must belong to the order's tenant
pub fn check_line_tenants(order_tenant: Uuid, lines: &[SalesLine]) -> LedgerResult<()> {
    match lines.iter().find(|l| l.product_tenant_id != order_tenant) {
        Some(line) => Err(LedgerError::integrity(format!(
            "product {} ({}) belongs to a different tenant than the sales order",
            line.product_id, line.product_name
        ))),
        None => Ok(()),
    }
}

/// Compare each line against the stock of eligible lots of its product.
///
/// `available` maps product id to the summed available quantity of its
/// eligible lots; products without eligible lots may be absent.
pub fn check_availability(
    order_tenant: Uuid,
    lines: &[SalesLine],
    available: &HashMap<i64, Decimal>,
) -> LedgerResult<()> {
    if lines.is_empty() {
        return Err(LedgerError::EmptyOrder);
    }
    check_line_tenants(order_tenant, lines)?;

    let shortfalls: Vec<Shortfall> = lines
        .iter()
        .filter_map(|line| {
            let on_hand = available
                .get(&line.product_id)
                .copied()
                .unwrap_or(Decimal::ZERO);
            (on_hand < line.quantity).then(|| Shortfall {
                item_id: line.product_id,
                name: line.product_name.clone(),
                required: line.quantity,
                available: on_hand,
            })
        })
        .collect();

    if shortfalls.is_empty() {
        Ok(())
    } else {
        Err(LedgerError::InsufficientStock(shortfalls))
    }
}

/// Eligible lots in FEFO order: expiry, then creation time, then id
pub fn fefo_order(lots: &[ProductLot], today: NaiveDate) -> Vec<&ProductLot> {
    let mut eligible: Vec<&ProductLot> = lots.iter().filter(|l| l.is_eligible(today)).collect();
    eligible.sort_by(|a, b| {
        a.expiry_date
            .cmp(&b.expiry_date)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
    eligible
}

/// Units taken from one lot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Allocation {
    pub lot_id: i64,
    pub quantity: Decimal,
}

/// Allocate `requested` units across lots in FEFO order.
///
/// Returns the allocations in the order they must be applied, or the quantity
/// left unmet when the eligible lots run out.
pub fn allocate_fefo(
    requested: Decimal,
    lots: &[ProductLot],
    today: NaiveDate,
) -> Result<Vec<Allocation>, Decimal> {
    let mut remaining = requested;
    let mut allocations = Vec::new();

    for lot in fefo_order(lots, today) {
        if remaining <= Decimal::ZERO {
            break;
        }
        let take = remaining.min(lot.available_quantity);
        allocations.push(Allocation {
            lot_id: lot.id,
            quantity: take,
        });
        remaining -= take;
    }

    if remaining > Decimal::ZERO {
        Err(remaining)
    } else {
        Ok(allocations)
    }
}

/// Units of one lot consumed by one sales line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineAllocation {
    pub sales_line_id: i64,
    pub lot_id: i64,
    pub quantity: Decimal,
}

/// Everything a confirmation writes, computed before the first write
#[derive(Debug, Clone)]
pub struct ConfirmationPlan {
    /// One consumption per lot and line, lines in the order given
    pub allocations: Vec<LineAllocation>,
    /// Lots touched by the allocations, with their new quantity and status
    pub lots: Vec<ProductLot>,
}

/// Allocate every line of an order against the lots locked for it.
///
/// Either every line is covered or nothing is: lines the locked lots cannot
/// cover are all reported in one insufficient-stock error.
pub fn plan_confirmation(
    order_tenant: Uuid,
    lines: &[SalesLine],
    locked_lots: &[ProductLot],
    today: NaiveDate,
    near_expiry_days: i64,
) -> LedgerResult<ConfirmationPlan> {
    if lines.is_empty() {
        return Err(LedgerError::EmptyOrder);
    }
    check_line_tenants(order_tenant, lines)?;

    let mut lots = locked_lots.to_vec();
    let mut touched = BTreeSet::new();
    let mut allocations = Vec::new();
    let mut shortfalls = Vec::new();

    for line in lines {
        let candidates: Vec<ProductLot> = lots
            .iter()
            .filter(|l| l.product_id == line.product_id)
            .cloned()
            .collect();

        let taken = match allocate_fefo(line.quantity, &candidates, today) {
            Ok(taken) => taken,
            Err(unmet) => {
                shortfalls.push(Shortfall {
                    item_id: line.product_id,
                    name: line.product_name.clone(),
                    required: line.quantity,
                    available: line.quantity - unmet,
                });
                continue;
            }
        };

        for allocation in taken {
            let lot = lots
                .iter_mut()
                .find(|l| l.id == allocation.lot_id)
                .ok_or_else(|| {
                    LedgerError::integrity(format!("allocated lot {} is not locked", allocation.lot_id))
                })?;
            lot.take(allocation.quantity, today, near_expiry_days)?;
            touched.insert(lot.id);
            allocations.push(LineAllocation {
                sales_line_id: line.id,
                lot_id: lot.id,
                quantity: allocation.quantity,
            });
        }
    }

    if !shortfalls.is_empty() {
        return Err(LedgerError::InsufficientStock(shortfalls));
    }

    lots.retain(|l| touched.contains(&l.id));
    Ok(ConfirmationPlan { allocations, lots })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_drafts_reject_duplicates() {
        let lines = vec![
            SalesLineDraft {
                product_id: 1,
                quantity: Decimal::ONE,
            },
            SalesLineDraft {
                product_id: 1,
                quantity: Decimal::TWO,
            },
        ];
        assert_eq!(
            validate_line_drafts(&lines),
            Err(LedgerError::DuplicateLine {
                field: "product",
                id: 1
            })
        );
    }

    #[test]
    fn test_line_drafts_reject_zero_quantity() {
        let lines = vec![SalesLineDraft {
            product_id: 1,
            quantity: Decimal::ZERO,
        }];
        assert!(validate_line_drafts(&lines).is_err());
    }

    #[test]
    fn test_empty_order_rejected() {
        let err = check_availability(Uuid::new_v4(), &[], &HashMap::new()).unwrap_err();
        assert_eq!(err, LedgerError::EmptyOrder);
    }
}
