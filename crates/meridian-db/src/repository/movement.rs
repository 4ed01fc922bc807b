//! # Stock Movement Repository (append-only ledger)
//!
//! Every stock mutation writes a signed ledger entry here, in the same
//! transaction as the mutation itself. The repository deliberately exposes
//! no update or delete; corrections are compensating entries.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use meridian_core::{MovementEvent, MovementRef, StockMovement};

use crate::error::DbResult;

// =============================================================================
// Row Types
// =============================================================================

/// Ledger entry as the stock transactions produce it.
#[derive(Debug, Clone)]
pub struct NewStockMovement {
    pub event_type: MovementEvent,
    pub product_id: i64,
    pub variant_id: i64,
    pub shop_id: i64,
    /// Signed delta: negative for sales, positive for restock adjustments.
    pub quantity: i64,
    pub unit_price_cents: Option<i64>,
    pub reference: Option<MovementRef>,
    pub actor_id: Option<i64>,
    pub note: Option<String>,
}

/// Raw ledger row; `reference` is stored as a (type, id) column pair.
#[derive(Debug, sqlx::FromRow)]
struct MovementRow {
    id: i64,
    event_type: MovementEvent,
    product_id: i64,
    variant_id: i64,
    shop_id: i64,
    quantity: i64,
    unit_price_cents: Option<i64>,
    reference_type: Option<String>,
    reference_id: Option<i64>,
    actor_id: Option<i64>,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<MovementRow> for StockMovement {
    fn from(row: MovementRow) -> Self {
        let reference = match (row.reference_type.as_deref(), row.reference_id) {
            (Some(kind), Some(id)) => MovementRef::from_parts(kind, id),
            _ => None,
        };

        StockMovement {
            id: row.id,
            event_type: row.event_type,
            product_id: row.product_id,
            variant_id: row.variant_id,
            shop_id: row.shop_id,
            quantity: row.quantity,
            unit_price_cents: row.unit_price_cents,
            reference,
            actor_id: row.actor_id,
            note: row.note,
            created_at: row.created_at,
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Append + read access to the inventory ledger.
#[derive(Debug, Clone)]
pub struct MovementRepository {
    pool: SqlitePool,
}

impl MovementRepository {
    pub fn new(pool: SqlitePool) -> Self {
        MovementRepository { pool }
    }

    /// Appends one ledger entry inside the caller's transaction.
    pub async fn insert(conn: &mut SqliteConnection, new: &NewStockMovement) -> DbResult<i64> {
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO stock_movements
                 (event_type, product_id, variant_id, shop_id, quantity,
                  unit_price_cents, reference_type, reference_id, actor_id,
                  note, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new.event_type)
        .bind(new.product_id)
        .bind(new.variant_id)
        .bind(new.shop_id)
        .bind(new.quantity)
        .bind(new.unit_price_cents)
        .bind(new.reference.as_ref().map(MovementRef::kind))
        .bind(new.reference.as_ref().map(MovementRef::id))
        .bind(new.actor_id)
        .bind(&new.note)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Full history of one variant, oldest first.
    pub async fn for_variant(&self, variant_id: i64) -> DbResult<Vec<StockMovement>> {
        let rows = sqlx::query_as::<_, MovementRow>(
            "SELECT id, event_type, product_id, variant_id, shop_id, quantity,
                    unit_price_cents, reference_type, reference_id, actor_id,
                    note, created_at
             FROM stock_movements WHERE variant_id = ? ORDER BY id ASC",
        )
        .bind(variant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(StockMovement::from).collect())
    }

    /// Sum of all signed deltas ever recorded for one variant.
    ///
    /// Conservation check: equals current stock_level minus the variant's
    /// initial stock_level.
    pub async fn delta_sum_for_variant(&self, variant_id: i64) -> DbResult<i64> {
        let sum: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0) FROM stock_movements WHERE variant_id = ?",
        )
        .bind(variant_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(sum)
    }

    /// All entries attributed to one reference, oldest first.
    pub async fn for_reference(&self, reference: MovementRef) -> DbResult<Vec<StockMovement>> {
        let rows = sqlx::query_as::<_, MovementRow>(
            "SELECT id, event_type, product_id, variant_id, shop_id, quantity,
                    unit_price_cents, reference_type, reference_id, actor_id,
                    note, created_at
             FROM stock_movements
             WHERE reference_type = ? AND reference_id = ?
             ORDER BY id ASC",
        )
        .bind(reference.kind())
        .bind(reference.id())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(StockMovement::from).collect())
    }
}
