//! Movement ledger tests
//! Verifies that cached stock always equals the sum of signed movements

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{recompute_stock, round_quantity, MovementKind, StockMovement};

/// In-memory stand-in for one material row and its kardex, applying the same
/// stock changes the ledger service writes
#[derive(Default)]
struct MaterialBook {
    stock: Decimal,
    movements: Vec<StockMovement>,
    next_id: i64,
}

impl MaterialBook {
    fn post(&mut self, kind: MovementKind, quantity: Decimal) {
        self.stock += kind.signed(quantity);
        self.next_id += 1;
        self.movements.push(StockMovement {
            id: self.next_id,
            material_id: 1,
            kind,
            quantity,
            occurred_at: Utc::now(),
            note: String::new(),
            created_by: None,
        });
    }

    fn amend(&mut self, index: usize, quantity: Decimal) {
        if self.movements.is_empty() {
            return;
        }
        let len = self.movements.len();
        let movement = &mut self.movements[index % len];
        self.stock += movement.amend_delta(quantity);
        movement.quantity = quantity;
    }

    fn retract(&mut self, index: usize) {
        if self.movements.is_empty() {
            return;
        }
        let movement = self.movements.remove(index % self.movements.len());
        self.stock += movement.retract_delta();
    }

    fn consistent(&self) -> bool {
        self.stock == recompute_stock(&self.movements)
    }
}

#[derive(Debug, Clone)]
enum Op {
    Post(MovementKind, Decimal),
    Amend(usize, Decimal),
    Retract(usize),
}

// ============================================================================
// Property Test Strategies
// ============================================================================

fn kind_strategy() -> impl Strategy<Value = MovementKind> {
    prop::sample::select(MovementKind::ALL.to_vec())
}

/// Positive quantities with three decimals
fn quantity_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..5_000_000).prop_map(|milli| Decimal::new(milli, 3))
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (kind_strategy(), quantity_strategy()).prop_map(|(k, q)| Op::Post(k, q)),
        2 => (any::<usize>(), quantity_strategy()).prop_map(|(i, q)| Op::Amend(i, q)),
        1 => any::<usize>().prop_map(Op::Retract),
    ]
}

// ============================================================================
// Ledger consistency
// ============================================================================

mod consistency {
    use super::*;

    proptest! {
        #[test]
        fn stock_matches_history_after_every_operation(ops in prop::collection::vec(op_strategy(), 1..60)) {
            let mut book = MaterialBook::default();
            for op in ops {
                match op {
                    Op::Post(kind, qty) => book.post(kind, qty),
                    Op::Amend(i, qty) => book.amend(i, qty),
                    Op::Retract(i) => book.retract(i),
                }
                prop_assert!(book.consistent());
            }
        }

        #[test]
        fn posting_then_retracting_restores_stock(
            kind in kind_strategy(),
            qty in quantity_strategy(),
            opening in quantity_strategy(),
        ) {
            let mut book = MaterialBook::default();
            book.post(MovementKind::Inflow, opening);
            let before = book.stock;
            book.post(kind, qty);
            book.retract(1);
            prop_assert_eq!(book.stock, before);
        }

        #[test]
        fn amend_moves_stock_by_the_difference(
            kind in kind_strategy(),
            old in quantity_strategy(),
            new in quantity_strategy(),
        ) {
            let mut book = MaterialBook::default();
            book.post(kind, old);
            let before = book.stock;
            book.amend(0, new);
            prop_assert_eq!(book.stock - before, kind.signed(new) - kind.signed(old));
        }
    }
}

// ============================================================================
// Stock deltas
// ============================================================================

mod deltas {
    use super::*;

    fn movement(kind: MovementKind, quantity: i64) -> StockMovement {
        StockMovement {
            id: 1,
            material_id: 1,
            kind,
            quantity: Decimal::from(quantity),
            occurred_at: Utc::now(),
            note: String::new(),
            created_by: None,
        }
    }

    #[test]
    fn shrinking_an_inflow_lowers_stock() {
        assert_eq!(movement(MovementKind::Inflow, 10).amend_delta(Decimal::from(4)), Decimal::from(-6));
    }

    #[test]
    fn shrinking_a_consumption_returns_stock() {
        assert_eq!(
            movement(MovementKind::Consumption, 10).amend_delta(Decimal::from(4)),
            Decimal::from(6)
        );
    }

    #[test]
    fn growing_a_shrinkage_removes_more_stock() {
        assert_eq!(
            movement(MovementKind::Shrinkage, 2).amend_delta(Decimal::from(5)),
            Decimal::from(-3)
        );
    }

    #[test]
    fn retracting_reverses_the_contribution() {
        assert_eq!(movement(MovementKind::Inflow, 10).retract_delta(), Decimal::from(-10));
        assert_eq!(movement(MovementKind::Consumption, 7).retract_delta(), Decimal::from(7));
    }

    #[test]
    fn unchanged_quantity_moves_nothing() {
        assert_eq!(movement(MovementKind::AdjustmentUp, 3).amend_delta(Decimal::from(3)), Decimal::ZERO);
    }
}

// ============================================================================
// Movement kinds
// ============================================================================

mod kinds {
    use super::*;

    #[test]
    fn inbound_kinds_add_stock() {
        let qty = Decimal::from(4);
        assert_eq!(MovementKind::Inflow.signed(qty), qty);
        assert_eq!(MovementKind::AdjustmentUp.signed(qty), qty);
    }

    #[test]
    fn outbound_kinds_remove_stock() {
        let qty = Decimal::from(4);
        for kind in [
            MovementKind::Consumption,
            MovementKind::AdjustmentDown,
            MovementKind::Shrinkage,
        ] {
            assert_eq!(kind.signed(qty), -qty, "{kind}");
        }
    }

    #[test]
    fn storage_names_are_stable() {
        for kind in MovementKind::ALL {
            assert_eq!(MovementKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(MovementKind::from_str("transfer"), None);
    }

    #[test]
    fn shrinkage_is_a_loss_in_the_kardex() {
        let mut book = MaterialBook::default();
        book.post(MovementKind::Inflow, Decimal::from(10));
        book.post(MovementKind::Shrinkage, Decimal::new(25, 1));
        assert_eq!(book.stock, Decimal::new(75, 1));
        assert!(book.consistent());
    }

    #[test]
    fn stock_may_go_negative_through_adjustments() {
        let mut book = MaterialBook::default();
        book.post(MovementKind::AdjustmentDown, Decimal::from(3));
        assert_eq!(book.stock, Decimal::from(-3));
        assert!(book.consistent());
    }
}

// ============================================================================
// Decimal exactness
// ============================================================================

mod exactness {
    use super::*;

    #[test]
    fn tenths_do_not_drift() {
        let mut book = MaterialBook::default();
        for _ in 0..1000 {
            book.post(MovementKind::Inflow, Decimal::new(1, 1));
        }
        assert_eq!(book.stock, Decimal::from(100));
    }

    #[test]
    fn quantities_round_to_storage_scale() {
        assert_eq!(round_quantity(Decimal::new(12345, 4)), Decimal::new(1235, 3));
        assert_eq!(round_quantity(Decimal::new(4, 4)), Decimal::ZERO);
    }
}
