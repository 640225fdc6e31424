//! Movement ledger: the only writer of `materials.stock`
//!
//! Every post, amend and retract locks the material row, applies the signed
//! delta to the cached stock and persists the movement change in the same
//! transaction.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    recompute_stock, round_quantity, validate_note, validate_positive, MovementKind,
    StockDiscrepancy, StockMovement,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::config::LedgerSettings;
use crate::error::{AppError, AppResult};

/// Movement ledger service
#[derive(Clone)]
pub struct MovementLedger {
    db: PgPool,
    settings: LedgerSettings,
}

const MOVEMENT_COLUMNS: &str =
    "mv.id, mv.material_id, mv.kind, mv.quantity, mv.occurred_at, mv.note, mv.created_by";

#[derive(Debug, FromRow)]
struct MovementRow {
    id: i64,
    material_id: i64,
    kind: String,
    quantity: Decimal,
    occurred_at: DateTime<Utc>,
    note: String,
    created_by: Option<Uuid>,
}

impl TryFrom<MovementRow> for StockMovement {
    type Error = AppError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let kind = MovementKind::from_str(&row.kind)
            .ok_or_else(|| AppError::Internal(format!("unknown movement kind {}", row.kind)))?;
        Ok(StockMovement {
            id: row.id,
            material_id: row.material_id,
            kind,
            quantity: row.quantity,
            occurred_at: row.occurred_at,
            note: row.note,
            created_by: row.created_by,
        })
    }
}

#[derive(Debug, FromRow)]
struct KardexRow {
    #[sqlx(flatten)]
    movement: MovementRow,
    material_name: String,
    unit_name: String,
}

/// Kardex line: a movement with its material
#[derive(Debug, Clone, Serialize)]
pub struct KardexEntry {
    #[serde(flatten)]
    pub movement: StockMovement,
    pub material_name: String,
    pub unit_name: String,
    pub signed_quantity: Decimal,
}

impl TryFrom<KardexRow> for KardexEntry {
    type Error = AppError;

    fn try_from(row: KardexRow) -> Result<Self, Self::Error> {
        let movement = StockMovement::try_from(row.movement)?;
        Ok(KardexEntry {
            signed_quantity: movement.signed_quantity(),
            movement,
            material_name: row.material_name,
            unit_name: row.unit_name,
        })
    }
}

/// Input for posting a movement
#[derive(Debug, Clone, Deserialize)]
pub struct PostMovementInput {
    pub material_id: i64,
    pub kind: MovementKind,
    pub quantity: Decimal,
    pub note: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
}

/// A validated movement ready to be written
#[derive(Debug, Clone)]
pub(crate) struct MovementDraft {
    pub material_id: i64,
    pub kind: MovementKind,
    pub quantity: Decimal,
    pub occurred_at: DateTime<Utc>,
    pub note: String,
    pub production_order_id: Option<i64>,
}

/// Lock a material of the tenant for the rest of the transaction
async fn lock_material(conn: &mut PgConnection, tenant_id: Uuid, material_id: i64) -> AppResult<()> {
    sqlx::query_scalar::<_, i64>(
        "SELECT id FROM materials WHERE id = $1 AND tenant_id = $2 FOR UPDATE",
    )
    .bind(material_id)
    .bind(tenant_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("material"))?;
    Ok(())
}

async fn apply_delta(conn: &mut PgConnection, material_id: i64, delta: Decimal) -> AppResult<()> {
    sqlx::query("UPDATE materials SET stock = stock + $1 WHERE id = $2")
        .bind(delta)
        .bind(material_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Post a movement on an open transaction.
///
/// Shared by user postings and production consumptions.
pub(crate) async fn post_with(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    actor: Option<Uuid>,
    draft: MovementDraft,
) -> AppResult<StockMovement> {
    let quantity = round_quantity(draft.quantity);
    validate_positive("quantity", quantity)?;
    lock_material(conn, tenant_id, draft.material_id).await?;

    apply_delta(conn, draft.material_id, draft.kind.signed(quantity)).await?;

    let row = sqlx::query_as::<_, MovementRow>(&format!(
        r#"
        INSERT INTO stock_movements AS mv
            (tenant_id, material_id, kind, quantity, occurred_at, note, created_by, production_order_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {MOVEMENT_COLUMNS}
        "#
    ))
    .bind(tenant_id)
    .bind(draft.material_id)
    .bind(draft.kind.as_str())
    .bind(quantity)
    .bind(draft.occurred_at)
    .bind(&draft.note)
    .bind(actor)
    .bind(draft.production_order_id)
    .fetch_one(&mut *conn)
    .await?;

    StockMovement::try_from(row)
}

impl MovementLedger {
    /// Create a new MovementLedger instance
    pub fn new(db: PgPool, settings: LedgerSettings) -> Self {
        Self { db, settings }
    }

    /// Record a movement and apply its signed quantity to the material
    pub async fn post(
        &self,
        tenant_id: Uuid,
        actor: Uuid,
        input: PostMovementInput,
    ) -> AppResult<StockMovement> {
        validate_positive("quantity", input.quantity)?;
        let note = validate_note(input.note.as_deref())?;

        let mut tx = self.db.begin().await?;
        let movement = post_with(
            &mut tx,
            tenant_id,
            Some(actor),
            MovementDraft {
                material_id: input.material_id,
                kind: input.kind,
                quantity: input.quantity,
                occurred_at: input.occurred_at.unwrap_or_else(Utc::now),
                note,
                production_order_id: None,
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            %tenant_id,
            movement_id = movement.id,
            material_id = movement.material_id,
            kind = %movement.kind,
            quantity = %movement.quantity,
            "movement posted"
        );

        Ok(movement)
    }

    /// Change the quantity of a movement; the stock moves by the difference
    pub async fn amend(
        &self,
        tenant_id: Uuid,
        movement_id: i64,
        new_quantity: Decimal,
    ) -> AppResult<StockMovement> {
        let new_quantity = round_quantity(new_quantity);
        validate_positive("quantity", new_quantity)?;

        let mut tx = self.db.begin().await?;
        let current = Self::lock_movement(&mut tx, tenant_id, movement_id).await?;

        apply_delta(&mut tx, current.material_id, current.amend_delta(new_quantity)).await?;

        let row = sqlx::query_as::<_, MovementRow>(&format!(
            r#"
            UPDATE stock_movements AS mv SET quantity = $1
            WHERE mv.id = $2
            RETURNING {MOVEMENT_COLUMNS}
            "#
        ))
        .bind(new_quantity)
        .bind(movement_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(
            %tenant_id,
            movement_id,
            material_id = current.material_id,
            old_quantity = %current.quantity,
            new_quantity = %new_quantity,
            "movement amended"
        );

        StockMovement::try_from(row)
    }

    /// Remove a movement and reverse its contribution
    pub async fn retract(&self, tenant_id: Uuid, movement_id: i64) -> AppResult<StockMovement> {
        let mut tx = self.db.begin().await?;
        let current = Self::lock_movement(&mut tx, tenant_id, movement_id).await?;

        apply_delta(&mut tx, current.material_id, current.retract_delta()).await?;

        sqlx::query("DELETE FROM stock_movements WHERE id = $1")
            .bind(movement_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(
            %tenant_id,
            movement_id,
            material_id = current.material_id,
            kind = %current.kind,
            quantity = %current.quantity,
            "movement retracted"
        );

        Ok(current)
    }

    /// Lock the movement's material, then the movement itself
    async fn lock_movement(
        conn: &mut PgConnection,
        tenant_id: Uuid,
        movement_id: i64,
    ) -> AppResult<StockMovement> {
        let material_id = sqlx::query_scalar::<_, i64>(
            "SELECT material_id FROM stock_movements WHERE id = $1 AND tenant_id = $2",
        )
        .bind(movement_id)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found("movement"))?;

        lock_material(conn, tenant_id, material_id).await?;

        // Re-read under lock; a concurrent retract may have removed it
        let row = sqlx::query_as::<_, MovementRow>(&format!(
            r#"
            SELECT {MOVEMENT_COLUMNS}
            FROM stock_movements mv
            WHERE mv.id = $1 AND mv.material_id = $2
            FOR UPDATE
            "#
        ))
        .bind(movement_id)
        .bind(material_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found("movement"))?;

        StockMovement::try_from(row)
    }

    /// Movement history of one material, newest first
    pub async fn kardex(
        &self,
        tenant_id: Uuid,
        material_id: i64,
        limit: Option<i64>,
    ) -> AppResult<Vec<KardexEntry>> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM materials WHERE id = $1 AND tenant_id = $2)",
        )
        .bind(material_id)
        .bind(tenant_id)
        .fetch_one(&self.db)
        .await?;
        if !exists {
            return Err(AppError::not_found("material"));
        }

        let rows = sqlx::query_as::<_, KardexRow>(&format!(
            r#"
            SELECT {MOVEMENT_COLUMNS}, m.name AS material_name, u.name AS unit_name
            FROM stock_movements mv
            JOIN materials m ON m.id = mv.material_id
            JOIN units u ON u.id = m.unit_id
            WHERE mv.material_id = $1 AND mv.tenant_id = $2
            ORDER BY mv.occurred_at DESC, mv.id DESC
            LIMIT $3
            "#
        ))
        .bind(material_id)
        .bind(tenant_id)
        .bind(self.limit(limit))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(KardexEntry::try_from).collect()
    }

    /// Movement history across every material of the tenant, newest first
    pub async fn tenant_kardex(&self, tenant_id: Uuid, limit: Option<i64>) -> AppResult<Vec<KardexEntry>> {
        let rows = sqlx::query_as::<_, KardexRow>(&format!(
            r#"
            SELECT {MOVEMENT_COLUMNS}, m.name AS material_name, u.name AS unit_name
            FROM stock_movements mv
            JOIN materials m ON m.id = mv.material_id
            JOIN units u ON u.id = m.unit_id
            WHERE mv.tenant_id = $1
            ORDER BY mv.occurred_at DESC, mv.id DESC
            LIMIT $2
            "#
        ))
        .bind(tenant_id)
        .bind(self.limit(limit))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(KardexEntry::try_from).collect()
    }

    fn limit(&self, requested: Option<i64>) -> i64 {
        requested
            .filter(|l| *l > 0)
            .unwrap_or(self.settings.kardex_limit)
    }

    /// Offline consistency check: recompute every material's stock from its
    /// full history and report each one whose cached stock differs.
    pub async fn audit_stock(&self, tenant_id: Uuid) -> AppResult<Vec<StockDiscrepancy>> {
        let materials = sqlx::query_as::<_, (i64, String, Decimal)>(
            "SELECT id, name, stock FROM materials WHERE tenant_id = $1 ORDER BY name, id",
        )
        .bind(tenant_id)
        .fetch_all(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, MovementRow>(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements mv WHERE mv.tenant_id = $1"
        ))
        .bind(tenant_id)
        .fetch_all(&self.db)
        .await?;

        let mut history: HashMap<i64, Vec<StockMovement>> = HashMap::new();
        for row in rows {
            let movement = StockMovement::try_from(row)?;
            history.entry(movement.material_id).or_default().push(movement);
        }

        let mut discrepancies = Vec::new();
        for (material_id, material_name, cached) in materials {
            let recomputed = history
                .get(&material_id)
                .map(|movements| recompute_stock(movements))
                .unwrap_or(Decimal::ZERO);
            if recomputed != cached {
                tracing::warn!(
                    %tenant_id,
                    material_id,
                    cached = %cached,
                    recomputed = %recomputed,
                    "stock drifted from movement history"
                );
                discrepancies.push(StockDiscrepancy {
                    material_id,
                    material_name,
                    cached,
                    recomputed,
                });
            }
        }

        tracing::debug!(%tenant_id, mismatches = discrepancies.len(), "stock audit finished");
        Ok(discrepancies)
    }
}
