//! Lot inventory: finished-goods lots and their live expiry status

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use shared::{LotDetail, LotFilter, LotStatus, ProductLot, SalesConsumption};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::sales::{ConsumptionRow, CONSUMPTION_COLUMNS};
use super::today;
use crate::config::LedgerSettings;
use crate::error::{AppError, AppResult};

/// Lot inventory service
#[derive(Clone)]
pub struct LotService {
    db: PgPool,
    settings: LedgerSettings,
}

pub(crate) const LOT_COLUMNS: &str = r#"
    l.id, l.product_id, p.name AS product_name, u.name AS unit_name, l.code,
    l.production_order_id, l.produced_at, l.expiry_date, l.initial_quantity,
    l.available_quantity, l.status, l.created_by, l.created_at
"#;

#[derive(Debug, FromRow)]
pub(crate) struct LotRow {
    id: i64,
    product_id: i64,
    product_name: String,
    unit_name: String,
    code: String,
    production_order_id: Option<i64>,
    produced_at: DateTime<Utc>,
    expiry_date: NaiveDate,
    initial_quantity: Decimal,
    available_quantity: Decimal,
    status: String,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<LotRow> for ProductLot {
    type Error = AppError;

    fn try_from(row: LotRow) -> Result<Self, Self::Error> {
        let status = LotStatus::from_str(&row.status)
            .ok_or_else(|| AppError::Internal(format!("unknown lot status {}", row.status)))?;
        Ok(ProductLot {
            id: row.id,
            product_id: row.product_id,
            product_name: row.product_name,
            unit_name: row.unit_name,
            code: row.code,
            production_order_id: row.production_order_id,
            produced_at: row.produced_at,
            expiry_date: row.expiry_date,
            initial_quantity: row.initial_quantity,
            available_quantity: row.available_quantity,
            status,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

/// Load a lot of the tenant as stored
pub(crate) async fn fetch_lot(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    lot_id: i64,
) -> AppResult<ProductLot> {
    let row = sqlx::query_as::<_, LotRow>(&format!(
        r#"
        SELECT {LOT_COLUMNS}
        FROM product_lots l
        JOIN products p ON p.id = l.product_id
        JOIN units u ON u.id = p.unit_id
        WHERE l.id = $1 AND l.tenant_id = $2
        "#
    ))
    .bind(lot_id)
    .bind(tenant_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("lot"))?;

    ProductLot::try_from(row)
}

impl LotService {
    /// Create a new LotService instance
    pub fn new(db: PgPool, settings: LedgerSettings) -> Self {
        Self { db, settings }
    }

    /// Lots matching the filter, in FEFO order, with status recomputed for today
    pub async fn list_lots(&self, tenant_id: Uuid, filter: &LotFilter) -> AppResult<Vec<ProductLot>> {
        let today = today();
        let near = self.settings.near_expiry_days;
        let expires_from = filter.expires.map(|r| r.start);
        let expires_to = filter.expires.map(|r| r.end);

        let rows = sqlx::query_as::<_, LotRow>(&format!(
            r#"
            SELECT {LOT_COLUMNS}
            FROM product_lots l
            JOIN products p ON p.id = l.product_id
            JOIN units u ON u.id = p.unit_id
            WHERE l.tenant_id = $1
              AND ($2::bigint IS NULL OR l.product_id = $2)
              AND ($3::date IS NULL OR l.expiry_date >= $3)
              AND ($4::date IS NULL OR l.expiry_date <= $4)
              AND (NOT $5 OR l.available_quantity > 0)
            ORDER BY l.expiry_date, l.created_at, l.id
            "#
        ))
        .bind(tenant_id)
        .bind(filter.product_id)
        .bind(expires_from)
        .bind(expires_to)
        .bind(filter.with_stock)
        .fetch_all(&self.db)
        .await?;

        let mut lots = Vec::with_capacity(rows.len());
        for row in rows {
            let lot = ProductLot::try_from(row)?;
            // Status filters run on the live status, not the stored snapshot
            if filter.matches(&lot, today, near) {
                lots.push(lot.refresh_status(today, near));
            }
        }
        Ok(lots)
    }

    /// Near-expiry lots that still have stock
    pub async fn expiring_lots(&self, tenant_id: Uuid) -> AppResult<Vec<ProductLot>> {
        self.list_lots(
            tenant_id,
            &LotFilter {
                status: Some(LotStatus::NearExpiry),
                with_stock: true,
                ..LotFilter::default()
            },
        )
        .await
    }

    /// Expired lots that still have stock, for write-off
    pub async fn expired_lots_with_stock(&self, tenant_id: Uuid) -> AppResult<Vec<ProductLot>> {
        self.list_lots(
            tenant_id,
            &LotFilter {
                status: Some(LotStatus::Expired),
                with_stock: true,
                ..LotFilter::default()
            },
        )
        .await
    }

    /// A lot with every sales consumption taken from it
    pub async fn lot_detail(&self, tenant_id: Uuid, lot_id: i64) -> AppResult<LotDetail> {
        let mut conn = self.db.acquire().await?;
        let lot = fetch_lot(&mut conn, tenant_id, lot_id)
            .await?
            .refresh_status(today(), self.settings.near_expiry_days);

        let consumptions = sqlx::query_as::<_, ConsumptionRow>(&format!(
            r#"
            SELECT {CONSUMPTION_COLUMNS}
            FROM sales_consumptions sc
            JOIN product_lots l ON l.id = sc.lot_id
            WHERE sc.lot_id = $1
            ORDER BY sc.created_at, sc.id
            "#
        ))
        .bind(lot_id)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(SalesConsumption::from)
        .collect();

        Ok(LotDetail { lot, consumptions })
    }
}
