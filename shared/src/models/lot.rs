//! Finished-goods lots and their expiry-derived status

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SalesConsumption;
use crate::error::{LedgerError, LedgerResult};
use crate::types::DateRange;
use crate::validation::validate_positive;

/// Days before expiry at which a lot turns near-expiry
pub const DEFAULT_NEAR_EXPIRY_DAYS: i64 = 1;

/// Lot status, always derived from the expiry date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotStatus {
    Fresh,
    NearExpiry,
    Expired,
}

impl LotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LotStatus::Fresh => "fresh",
            LotStatus::NearExpiry => "near_expiry",
            LotStatus::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "fresh" => Some(LotStatus::Fresh),
            "near_expiry" => Some(LotStatus::NearExpiry),
            "expired" => Some(LotStatus::Expired),
            _ => None,
        }
    }

    /// Fresh and near-expiry lots may be allocated to sales
    pub fn is_sellable(&self) -> bool {
        !matches!(self, LotStatus::Expired)
    }
}

impl std::fmt::Display for LotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LotStatus::Fresh => write!(f, "Fresh"),
            LotStatus::NearExpiry => write!(f, "Near expiry"),
            LotStatus::Expired => write!(f, "Expired"),
        }
    }
}

/// Status of a lot expiring on `expiry` as seen on `today`
pub fn derive_status(expiry: NaiveDate, today: NaiveDate, near_expiry_days: i64) -> LotStatus {
    let remaining = (expiry - today).num_days();
    if remaining < 0 {
        LotStatus::Expired
    } else if remaining <= near_expiry_days {
        LotStatus::NearExpiry
    } else {
        LotStatus::Fresh
    }
}

/// A dated batch of finished product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductLot {
    pub id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub unit_name: String,
    pub code: String,
    pub production_order_id: Option<i64>,
    pub produced_at: DateTime<Utc>,
    pub expiry_date: NaiveDate,
    pub initial_quantity: Decimal,
    pub available_quantity: Decimal,
    /// Snapshot written with the lot; read paths refresh it with `refresh_status`
    pub status: LotStatus,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ProductLot {
    pub fn days_remaining(&self, today: NaiveDate) -> i64 {
        (self.expiry_date - today).num_days()
    }

    pub fn live_status(&self, today: NaiveDate, near_expiry_days: i64) -> LotStatus {
        derive_status(self.expiry_date, today, near_expiry_days)
    }

    /// Replace the stored snapshot with the status as of `today`
    pub fn refresh_status(mut self, today: NaiveDate, near_expiry_days: i64) -> Self {
        self.status = self.live_status(today, near_expiry_days);
        self
    }

    /// Not expired and with something left to sell
    pub fn is_eligible(&self, today: NaiveDate) -> bool {
        self.expiry_date >= today && self.available_quantity > Decimal::ZERO
    }

    /// Take `quantity` out of the lot and refresh its status.
    ///
    /// Available quantity never increases and never goes below zero.
    pub fn take(
        &mut self,
        quantity: Decimal,
        today: NaiveDate,
        near_expiry_days: i64,
    ) -> LedgerResult<()> {
        validate_positive("quantity", quantity)?;
        if quantity > self.available_quantity {
            return Err(LedgerError::validation(
                "quantity",
                format!("lot {} has only {} available", self.code, self.available_quantity),
            ));
        }
        self.available_quantity -= quantity;
        self.status = self.live_status(today, near_expiry_days);
        Ok(())
    }
}

/// Lot with its consumption trail
#[derive(Debug, Clone, Serialize)]
pub struct LotDetail {
    #[serde(flatten)]
    pub lot: ProductLot,
    pub consumptions: Vec<SalesConsumption>,
}

/// Criteria for lot listings. Status is compared against the live status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LotFilter {
    pub product_id: Option<i64>,
    pub status: Option<LotStatus>,
    pub expires: Option<DateRange>,
    /// Only lots with available quantity left
    #[serde(default)]
    pub with_stock: bool,
}

impl LotFilter {
    pub fn matches(&self, lot: &ProductLot, today: NaiveDate, near_expiry_days: i64) -> bool {
        if self.product_id.is_some_and(|id| id != lot.product_id) {
            return false;
        }
        if self
            .status
            .is_some_and(|s| s != lot.live_status(today, near_expiry_days))
        {
            return false;
        }
        if self
            .expires
            .as_ref()
            .is_some_and(|range| !range.contains(lot.expiry_date))
        {
            return false;
        }
        !(self.with_stock && lot.available_quantity <= Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn lot(expiry: NaiveDate, available: i64) -> ProductLot {
        ProductLot {
            id: 1,
            product_id: 7,
            product_name: "Sourdough".to_string(),
            unit_name: "unit".to_string(),
            code: "7-20240115-001".to_string(),
            production_order_id: Some(3),
            produced_at: Utc::now(),
            expiry_date: expiry,
            initial_quantity: Decimal::from(10),
            available_quantity: Decimal::from(available),
            status: LotStatus::Fresh,
            created_by: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_boundaries() {
        let today = date(2024, 1, 10);
        assert_eq!(derive_status(date(2024, 1, 9), today, 1), LotStatus::Expired);
        assert_eq!(derive_status(date(2024, 1, 10), today, 1), LotStatus::NearExpiry);
        assert_eq!(derive_status(date(2024, 1, 11), today, 1), LotStatus::NearExpiry);
        assert_eq!(derive_status(date(2024, 1, 12), today, 1), LotStatus::Fresh);
    }

    #[test]
    fn test_take_refreshes_status() {
        let mut l = lot(date(2024, 1, 11), 5);
        l.take(Decimal::from(2), date(2024, 1, 10), 1).unwrap();
        assert_eq!(l.available_quantity, Decimal::from(3));
        assert_eq!(l.status, LotStatus::NearExpiry);
    }

    #[test]
    fn test_take_never_overdraws() {
        let mut l = lot(date(2024, 1, 20), 5);
        assert!(l.take(Decimal::from(6), date(2024, 1, 10), 1).is_err());
        assert!(l.take(Decimal::ZERO, date(2024, 1, 10), 1).is_err());
        assert_eq!(l.available_quantity, Decimal::from(5));
    }

    #[test]
    fn test_eligibility() {
        let today = date(2024, 1, 10);
        assert!(lot(date(2024, 1, 10), 1).is_eligible(today));
        assert!(!lot(date(2024, 1, 9), 1).is_eligible(today));
        assert!(!lot(date(2024, 1, 15), 0).is_eligible(today));
    }

    #[test]
    fn test_filter_uses_live_status() {
        let today = date(2024, 1, 10);
        // stored snapshot says fresh, but the lot expired yesterday
        let stale = lot(date(2024, 1, 9), 4);
        let filter = LotFilter {
            status: Some(LotStatus::Expired),
            ..LotFilter::default()
        };
        assert!(filter.matches(&stale, today, 1));

        let window = LotFilter {
            expires: Some(DateRange {
                start: date(2024, 1, 10),
                end: date(2024, 1, 11),
            }),
            with_stock: true,
            ..LotFilter::default()
        };
        assert!(!window.matches(&stale, today, 1));
        assert!(window.matches(&lot(date(2024, 1, 11), 1), today, 1));
        assert!(!window.matches(&lot(date(2024, 1, 11), 0), today, 1));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&LotStatus::NearExpiry).unwrap(),
            "\"near_expiry\""
        );
    }
}
