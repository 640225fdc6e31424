//! Lot inventory tests
//! Verifies lot monotonicity and expiry-derived status

use chrono::{Duration, NaiveDate, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{derive_status, expiry_date, LotStatus, ProductLot};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn lot(expiry: NaiveDate, initial: Decimal) -> ProductLot {
    ProductLot {
        id: 1,
        product_id: 7,
        product_name: "Sourdough".to_string(),
        unit_name: "unit".to_string(),
        code: "7-20240110-001".to_string(),
        production_order_id: Some(40),
        produced_at: Utc::now(),
        expiry_date: expiry,
        initial_quantity: initial,
        available_quantity: initial,
        status: LotStatus::Fresh,
        created_by: None,
        created_at: Utc::now(),
    }
}

// ============================================================================
// Lot monotonicity
// ============================================================================

mod monotonicity {
    use super::*;

    proptest! {
        #[test]
        fn available_never_increases_and_never_exceeds_initial(
            initial in 1i64..10_000,
            takes in prop::collection::vec(-50i64..2_000, 1..40),
        ) {
            let today = date(2024, 1, 10);
            let mut l = lot(date(2024, 2, 1), Decimal::from(initial));

            for take in takes {
                let before = l.available_quantity;
                let _ = l.take(Decimal::from(take), today, 1);
                prop_assert!(l.available_quantity <= before);
                prop_assert!(l.available_quantity >= Decimal::ZERO);
                prop_assert!(l.available_quantity <= l.initial_quantity);
            }
        }

        #[test]
        fn failed_take_changes_nothing(initial in 1i64..100, extra in 1i64..100) {
            let today = date(2024, 1, 10);
            let mut l = lot(date(2024, 2, 1), Decimal::from(initial));
            prop_assert!(l.take(Decimal::from(initial + extra), today, 1).is_err());
            prop_assert_eq!(l.available_quantity, Decimal::from(initial));
        }
    }

    #[test]
    fn draining_a_lot_leaves_zero() {
        let mut l = lot(date(2024, 2, 1), Decimal::from(5));
        l.take(Decimal::from(5), date(2024, 1, 10), 1).unwrap();
        assert_eq!(l.available_quantity, Decimal::ZERO);
        assert!(!l.is_eligible(date(2024, 1, 10)));
    }
}

// ============================================================================
// Status derivation
// ============================================================================

mod status {
    use super::*;

    #[test]
    fn one_day_ahead_is_near_expiry() {
        let today = date(2024, 1, 10);
        assert_eq!(derive_status(date(2024, 1, 11), today, 1), LotStatus::NearExpiry);
        assert_eq!(derive_status(date(2024, 1, 12), today, 1), LotStatus::Fresh);
    }

    #[test]
    fn expiring_today_is_still_sellable() {
        let today = date(2024, 1, 10);
        let status = derive_status(today, today, 1);
        assert_eq!(status, LotStatus::NearExpiry);
        assert!(status.is_sellable());
        assert!(!LotStatus::Expired.is_sellable());
    }

    #[test]
    fn wider_window_is_configurable() {
        let today = date(2024, 1, 10);
        assert_eq!(derive_status(date(2024, 1, 13), today, 3), LotStatus::NearExpiry);
        assert_eq!(derive_status(date(2024, 1, 13), today, 1), LotStatus::Fresh);
    }

    #[test]
    fn stored_status_is_replaced_on_read() {
        let stale = lot(date(2024, 1, 9), Decimal::from(3));
        assert_eq!(stale.status, LotStatus::Fresh);

        let live = stale.refresh_status(date(2024, 1, 10), 1);
        assert_eq!(live.status, LotStatus::Expired);
    }

    #[test]
    fn expiry_is_production_date_plus_shelf_life() {
        let produced_at = date(2024, 1, 15).and_hms_opt(23, 30, 0).unwrap().and_utc();
        assert_eq!(expiry_date(produced_at, 3), date(2024, 1, 18));
    }

    proptest! {
        #[test]
        fn status_only_moves_towards_expired(offset in -30i64..30, near in 0i64..5) {
            let today = date(2024, 6, 15);
            let expiry = today + Duration::days(offset);
            let rank = |s: LotStatus| match s {
                LotStatus::Fresh => 0,
                LotStatus::NearExpiry => 1,
                LotStatus::Expired => 2,
            };
            let now = derive_status(expiry, today, near);
            let tomorrow = derive_status(expiry, today + Duration::days(1), near);
            prop_assert!(rank(tomorrow) >= rank(now));
        }
    }
}
