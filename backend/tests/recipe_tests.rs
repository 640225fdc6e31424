//! Recipe catalog tests
//! Verifies recipe validation, including cross-tenant rejection

use std::collections::HashMap;

use rust_decimal::Decimal;
use shared::{normalize_recipe, validate_recipe, LedgerError, RecipeLineDraft};
use uuid::Uuid;

fn line(material_id: i64, qty: &str) -> RecipeLineDraft {
    RecipeLineDraft {
        material_id,
        quantity_per_batch: qty.parse().unwrap(),
    }
}

// =============================================================================
// Tenant isolation
// =============================================================================

mod tenant_isolation {
    use super::*;

    #[test]
    fn material_from_another_tenant_is_an_integrity_error() {
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();
        let owners = HashMap::from([(1, tenant_a), (2, tenant_b)]);

        let err = validate_recipe(
            tenant_a,
            Decimal::from(10),
            &[line(1, "2"), line(2, "1.5")],
            &owners,
        )
        .unwrap_err();

        assert!(matches!(err, LedgerError::DataIntegrity(_)));
        assert!(!err.is_caller_correctable());
    }

    #[test]
    fn unknown_material_is_not_found() {
        let tenant = Uuid::new_v4();
        let owners = HashMap::from([(1, tenant)]);

        let err = validate_recipe(tenant, Decimal::ONE, &[line(1, "1"), line(9, "1")], &owners)
            .unwrap_err();
        assert_eq!(err, LedgerError::NotFound("material"));
    }
}

// =============================================================================
// Line validation
// =============================================================================

mod line_validation {
    use super::*;

    fn owners(tenant: Uuid) -> HashMap<i64, Uuid> {
        HashMap::from([(1, tenant), (2, tenant), (3, tenant)])
    }

    #[test]
    fn accepts_a_well_formed_recipe() {
        let tenant = Uuid::new_v4();
        assert!(validate_recipe(
            tenant,
            Decimal::from(24),
            &[line(1, "0.5"), line(2, "0.25"), line(3, "12")],
            &owners(tenant),
        )
        .is_ok());
    }

    #[test]
    fn yield_must_be_positive() {
        let tenant = Uuid::new_v4();
        let err = validate_recipe(tenant, Decimal::ZERO, &[line(1, "1")], &owners(tenant)).unwrap_err();
        assert!(matches!(err, LedgerError::Validation { ref field, .. } if field == "yield_per_batch"));
    }

    #[test]
    fn line_quantity_must_be_positive() {
        let tenant = Uuid::new_v4();
        let err = validate_recipe(tenant, Decimal::ONE, &[line(1, "-1")], &owners(tenant)).unwrap_err();
        assert!(matches!(err, LedgerError::Validation { ref field, .. } if field == "quantity_per_batch"));
    }

    #[test]
    fn duplicate_material_is_rejected() {
        let tenant = Uuid::new_v4();
        let err = validate_recipe(
            tenant,
            Decimal::ONE,
            &[line(2, "1"), line(1, "1"), line(2, "3")],
            &owners(tenant),
        )
        .unwrap_err();
        assert_eq!(
            err,
            LedgerError::DuplicateLine {
                field: "material",
                id: 2
            }
        );
    }

    #[test]
    fn empty_recipe_is_rejected() {
        let tenant = Uuid::new_v4();
        let err = validate_recipe(tenant, Decimal::ONE, &[], &owners(tenant)).unwrap_err();
        assert!(err.is_caller_correctable());
    }

    #[test]
    fn input_errors_win_over_tenant_errors() {
        // Nothing is looked up until the lines themselves are sound
        let tenant = Uuid::new_v4();
        let foreign = HashMap::from([(1, Uuid::new_v4())]);
        let err = validate_recipe(tenant, Decimal::ONE, &[line(1, "0")], &foreign).unwrap_err();
        assert!(matches!(err, LedgerError::Validation { .. }));
    }
}

// =============================================================================
// Storage scale
// =============================================================================

mod storage_scale {
    use super::*;

    #[test]
    fn sub_scale_line_quantity_is_a_validation_error() {
        let tenant = Uuid::new_v4();
        let owners = HashMap::from([(1, tenant)]);

        let (yield_per_batch, lines) = normalize_recipe(Decimal::from(12), vec![line(1, "0.0004")]);
        assert_eq!(lines[0].quantity_per_batch, Decimal::ZERO);

        let err = validate_recipe(tenant, yield_per_batch, &lines, &owners).unwrap_err();
        assert!(matches!(err, LedgerError::Validation { ref field, .. } if field == "quantity_per_batch"));
    }

    #[test]
    fn sub_scale_yield_is_a_validation_error() {
        let tenant = Uuid::new_v4();
        let owners = HashMap::from([(1, tenant)]);

        let (yield_per_batch, lines) = normalize_recipe("0.0004".parse().unwrap(), vec![line(1, "1")]);
        let err = validate_recipe(tenant, yield_per_batch, &lines, &owners).unwrap_err();
        assert!(matches!(err, LedgerError::Validation { ref field, .. } if field == "yield_per_batch"));
    }

    #[test]
    fn quantities_are_stored_at_three_decimals() {
        let (yield_per_batch, lines) =
            normalize_recipe("1.2345".parse().unwrap(), vec![line(1, "0.1235"), line(2, "2")]);
        assert_eq!(yield_per_batch, "1.235".parse::<Decimal>().unwrap());
        assert_eq!(lines[0].quantity_per_batch, "0.124".parse::<Decimal>().unwrap());
        assert_eq!(lines[1].quantity_per_batch, Decimal::from(2));
        assert_eq!(lines[1].material_id, 2);
    }
}
