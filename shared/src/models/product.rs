//! Finished products

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shelf life applied when a product is created without one
pub const DEFAULT_SHELF_LIFE_DAYS: i32 = 3;

/// A tenant-scoped finished product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub tenant_id: Uuid,
    pub name: String,
    pub unit_id: i32,
    pub unit_name: String,
    pub shelf_life_days: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Expiry of a lot produced at `produced_at`
    pub fn expiry_for(&self, produced_at: DateTime<Utc>) -> NaiveDate {
        expiry_date(produced_at, self.shelf_life_days)
    }
}

/// Production calendar date plus shelf life
pub fn expiry_date(produced_at: DateTime<Utc>, shelf_life_days: i32) -> NaiveDate {
    produced_at.date_naive() + Duration::days(i64::from(shelf_life_days))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_expiry_uses_calendar_date() {
        let produced_at = Utc.with_ymd_and_hms(2024, 1, 15, 23, 30, 0).unwrap();
        assert_eq!(
            expiry_date(produced_at, 3),
            NaiveDate::from_ymd_opt(2024, 1, 18).unwrap()
        );
        assert_eq!(
            expiry_date(produced_at, 0),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
    }
}
