//! Measurement units and quantity formatting

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// What a unit measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Mass,
    Volume,
    Count,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Mass => "mass",
            Dimension::Volume => "volume",
            Dimension::Count => "count",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "mass" => Some(Dimension::Mass),
            "volume" => Some(Dimension::Volume),
            "count" => Some(Dimension::Count),
            _ => None,
        }
    }
}

/// Global, immutable unit of measure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: i32,
    pub name: String,
    pub dimension: Dimension,
}

/// Units seeded by the initial migration
pub const STANDARD_UNITS: &[(&str, Dimension)] = &[
    ("kg", Dimension::Mass),
    ("g", Dimension::Mass),
    ("l", Dimension::Volume),
    ("ml", Dimension::Volume),
    ("cc", Dimension::Volume),
    ("unit", Dimension::Count),
];

const LITRE_ALIASES: &[&str] = &["l", "lt", "litro", "litros"];

/// Render a quantity with at most one decimal, dropping a trailing `.0`
pub fn format_decimal(value: Decimal) -> String {
    value
        .round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
        .to_string()
}

fn whole(value: Decimal) -> String {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
        .to_string()
}

/// Render a quantity for display in its unit.
///
/// Kilograms and litres below one switch to grams and millilitres.
pub fn format_quantity(value: Decimal, unit_name: &str) -> String {
    let unit = unit_name.trim().to_lowercase();
    let thousand = Decimal::from(1000);

    if unit == "kg" {
        if value >= Decimal::ONE {
            return format!("{} kg", format_decimal(value));
        }
        return format!("{} g", whole(value * thousand));
    }

    if LITRE_ALIASES.contains(&unit.as_str()) {
        if value >= Decimal::ONE {
            return format!("{} l", format_decimal(value));
        }
        return format!("{} ml", whole(value * thousand));
    }

    format!("{} {}", format_decimal(value), unit_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_format_decimal() {
        assert_eq!(format_decimal(dec("3.000")), "3");
        assert_eq!(format_decimal(dec("2.25")), "2.3");
        assert_eq!(format_decimal(dec("2.24")), "2.2");
        assert_eq!(format_decimal(dec("0.04")), "0");
        assert_eq!(format_decimal(dec("-0.04")), "0");
        assert_eq!(format_decimal(dec("120")), "120");
    }

    #[test]
    fn test_format_quantity_mass() {
        assert_eq!(format_quantity(dec("1.250"), "kg"), "1.3 kg");
        assert_eq!(format_quantity(dec("0.250"), "kg"), "250 g");
        assert_eq!(format_quantity(dec("0.0005"), "KG"), "1 g");
    }

    #[test]
    fn test_format_quantity_volume() {
        assert_eq!(format_quantity(dec("2"), "l"), "2 l");
        assert_eq!(format_quantity(dec("0.75"), "litros"), "750 ml");
        assert_eq!(format_quantity(dec("0.5"), "lt"), "500 ml");
    }

    #[test]
    fn test_format_quantity_other_units() {
        assert_eq!(format_quantity(dec("12"), "unit"), "12 unit");
        assert_eq!(format_quantity(dec("0.5"), "g"), "0.5 g");
    }

    #[test]
    fn test_standard_units_are_unique() {
        let mut names: Vec<&str> = STANDARD_UNITS.iter().map(|(n, _)| *n).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), STANDARD_UNITS.len());
    }
}
