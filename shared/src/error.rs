//! Domain error taxonomy for the inventory and production ledger
//!
//! Errors carry enough structure (entities, quantities) for the calling layer
//! to render a precise message. Nothing here is retried or silently corrected.

use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::models::format_decimal;

/// Result type used by the pure ledger logic
pub type LedgerResult<T> = Result<T, LedgerError>;

/// One deficient item inside an insufficient-stock failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shortfall {
    /// Material id for production, product id for sales
    pub item_id: i64,
    pub name: String,
    pub required: Decimal,
    pub available: Decimal,
}

impl Shortfall {
    /// Quantity still missing to satisfy the requirement
    pub fn missing(&self) -> Decimal {
        self.required - self.available
    }
}

impl fmt::Display for Shortfall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: required {} / available {}",
            self.name,
            format_decimal(self.required),
            format_decimal(self.available)
        )
    }
}

fn render_shortfalls(items: &[Shortfall]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Ledger error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Caller-correctable input problem (non-positive quantity, blank name, ...)
    #[error("validation failed on {field}: {message}")]
    Validation { field: String, message: String },

    /// A sales order was validated or confirmed without any line
    #[error("order has no lines")]
    EmptyOrder,

    /// The same material (recipe) or product (sales order) appears twice
    #[error("duplicate {field} {id} in lines")]
    DuplicateLine { field: &'static str, id: i64 },

    /// Every deficient item, never just the first one
    #[error("insufficient stock: {}", render_shortfalls(.0))]
    InsufficientStock(Vec<Shortfall>),

    /// Entities from different tenants were wired together
    #[error("data integrity violation: {0}")]
    DataIntegrity(String),

    /// Entity missing or outside the caller's tenant
    #[error("{0} not found")]
    NotFound(&'static str),
}

impl LedgerError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::DataIntegrity(message.into())
    }

    /// Shortfalls carried by an insufficient-stock error, empty otherwise
    pub fn shortfalls(&self) -> &[Shortfall] {
        match self {
            Self::InsufficientStock(items) => items,
            _ => &[],
        }
    }

    /// Whether the caller can fix the request and try again
    pub fn is_caller_correctable(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::EmptyOrder
                | Self::DuplicateLine { .. }
                | Self::InsufficientStock(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_lists_every_item() {
        let err = LedgerError::InsufficientStock(vec![
            Shortfall {
                item_id: 1,
                name: "Flour".to_string(),
                required: Decimal::from(10),
                available: Decimal::from(4),
            },
            Shortfall {
                item_id: 2,
                name: "Butter".to_string(),
                required: Decimal::new(25, 1),
                available: Decimal::ZERO,
            },
        ]);

        assert_eq!(
            err.to_string(),
            "insufficient stock: Flour: required 10 / available 4; Butter: required 2.5 / available 0"
        );
        assert_eq!(err.shortfalls().len(), 2);
        assert_eq!(err.shortfalls()[0].missing(), Decimal::from(6));
        assert!(err.is_caller_correctable());
    }

    #[test]
    fn integrity_errors_are_fatal() {
        let err = LedgerError::integrity("material 4 belongs to another tenant");
        assert!(!err.is_caller_correctable());
        assert!(err.shortfalls().is_empty());
    }
}
