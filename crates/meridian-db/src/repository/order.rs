//! # Order Repository
//!
//! Order and order-item persistence. All writes run inside the checkout /
//! restock transactions; the pool-based methods serve the read API.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use meridian_core::{Order, OrderItem, OrderStatus, PlacedOrder, Shop};

use crate::error::{DbError, DbResult};

// =============================================================================
// Insert Payloads
// =============================================================================

/// Everything the checkout transaction has resolved by the time it writes
/// the order row.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub invoice_no: String,
    pub receipt_no: String,
    pub job_no: String,
    pub idempotency_key: Option<String>,
    pub user_id: i64,
    pub shop_id: i64,
    pub total_amount_cents: i64,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub payment_slip: Option<String>,
}

/// One order line, priced from the variant snapshot.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: i64,
    pub variant_id: i64,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

/// One variant's total quantity on an order, as consumed by the restock
/// transaction. Items are stored normalized (one row per variant) but the
/// aggregation query keeps restock correct even against hand-edited data.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RestockLine {
    pub variant_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

// =============================================================================
// Repository
// =============================================================================

const ORDER_COLUMNS: &str = "id, invoice_no, receipt_no, job_no, idempotency_key, user_id, \
     shop_id, status, total_amount_cents, phone, address, payment_slip, \
     restocked_at, created_at, updated_at";

/// Order persistence: transactional writes plus pool-based reads.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    // =========================================================================
    // Reads (pool)
    // =========================================================================

    /// Most recent orders first.
    pub async fn list_recent(&self, limit: i64) -> DbResult<Vec<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY id DESC LIMIT ?");
        let orders = sqlx::query_as::<_, Order>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(orders)
    }

    /// Loads the full aggregate (order + items + shop).
    pub async fn load(&self, order_id: i64) -> DbResult<PlacedOrder> {
        let mut conn = self.pool.acquire().await?;
        Self::load_placed(&mut conn, order_id).await
    }

    // =========================================================================
    // Transactional operations (explicit connection)
    // =========================================================================

    /// Inserts the order row; returns its id. Status starts at `pending`.
    pub async fn insert(conn: &mut SqliteConnection, new: &NewOrder) -> DbResult<i64> {
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO orders
                 (invoice_no, receipt_no, job_no, idempotency_key, user_id,
                  shop_id, status, total_amount_cents, phone, address,
                  payment_slip, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.invoice_no)
        .bind(&new.receipt_no)
        .bind(&new.job_no)
        .bind(&new.idempotency_key)
        .bind(new.user_id)
        .bind(new.shop_id)
        .bind(OrderStatus::Pending)
        .bind(new.total_amount_cents)
        .bind(&new.phone)
        .bind(&new.address)
        .bind(&new.payment_slip)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Bulk-inserts the order's items in one statement.
    pub async fn insert_items(
        conn: &mut SqliteConnection,
        order_id: i64,
        items: &[NewOrderItem],
    ) -> DbResult<()> {
        if items.is_empty() {
            return Ok(());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO order_items (order_id, product_id, variant_id, quantity, unit_price_cents) ",
        );
        qb.push_values(items, |mut row, item| {
            row.push_bind(order_id)
                .push_bind(item.product_id)
                .push_bind(item.variant_id)
                .push_bind(item.quantity)
                .push_bind(item.unit_price_cents);
        });

        qb.build().execute(&mut *conn).await?;
        Ok(())
    }

    /// Looks up a previously created order by (user, idempotency key).
    pub async fn find_by_idempotency_key(
        conn: &mut SqliteConnection,
        user_id: i64,
        key: &str,
    ) -> DbResult<Option<Order>> {
        let sql =
            format!("SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = ? AND idempotency_key = ?");
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(user_id)
            .bind(key)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(order)
    }

    /// Fetches one order or fails with NotFound.
    pub async fn get(conn: &mut SqliteConnection, order_id: i64) -> DbResult<Order> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?");
        sqlx::query_as::<_, Order>(&sql)
            .bind(order_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| DbError::not_found("Order", order_id))
    }

    /// Items of one order, in insertion order.
    pub async fn items(conn: &mut SqliteConnection, order_id: i64) -> DbResult<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT id, order_id, product_id, variant_id, quantity, unit_price_cents
             FROM order_items WHERE order_id = ? ORDER BY id ASC",
        )
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(items)
    }

    /// Per-variant totals for the restock transaction.
    pub async fn restock_lines(
        conn: &mut SqliteConnection,
        order_id: i64,
    ) -> DbResult<Vec<RestockLine>> {
        let lines = sqlx::query_as::<_, RestockLine>(
            "SELECT variant_id, product_id, SUM(quantity) AS quantity,
                    MIN(unit_price_cents) AS unit_price_cents
             FROM order_items WHERE order_id = ?
             GROUP BY variant_id, product_id
             ORDER BY variant_id ASC",
        )
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(lines)
    }

    /// Stamps `restocked_at`, but only if it is still NULL. Returns whether
    /// this call won the stamp; a `false` means the order was already
    /// restocked and the caller must not credit stock again.
    pub async fn mark_restocked(
        conn: &mut SqliteConnection,
        order_id: i64,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE orders SET restocked_at = ?, updated_at = ?
             WHERE id = ? AND restocked_at IS NULL",
        )
        .bind(at)
        .bind(at)
        .bind(order_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Loads the full aggregate inside the caller's transaction.
    pub async fn load_placed(conn: &mut SqliteConnection, order_id: i64) -> DbResult<PlacedOrder> {
        let order = Self::get(&mut *conn, order_id).await?;
        let items = Self::items(&mut *conn, order_id).await?;

        let shop = sqlx::query_as::<_, Shop>("SELECT id, code, name FROM shops WHERE id = ?")
            .bind(order.shop_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| DbError::not_found("Shop", order.shop_id))?;

        Ok(PlacedOrder { order, items, shop })
    }
}
