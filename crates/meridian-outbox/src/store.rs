//! # Offline Store
//!
//! The terminal-local SQLite database: catalog / order caches plus the
//! durable outbox.
//!
//! ## The Negative-Id Contract
//! ```text
//! Server order ids:   1, 2, 3, ...        (SQLite rowids, always positive)
//! Queued order ids:  -1, -2, -3, ...      (negated outbox rowids)
//! ```
//! A queued sale is presented under the negation of its outbox row id, so
//! synthetic ids can never collide with a server id. Once the entry syncs,
//! the synthetic order disappears and the server's order (positive id)
//! takes its place in the cache.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};
use uuid::Uuid;

use meridian_core::{
    normalize_lines, CachedOrder, CachedProduct, CachedVariant, CoreError, Money, OrderDraft,
    OrderLine, OutboxEntry, OutboxStatus, PENDING_SYNC_STATUS,
};

use crate::error::{OutboxError, OutboxResult};
use crate::migrations;

/// Retry budget per outbox entry; at this count the entry goes dead and
/// waits for an operator.
pub const MAX_RETRIES: i64 = 10;

/// Counters surfaced in the terminal's sync indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStatus {
    pub pending: i64,
    pub dead: i64,
    pub last_sync_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Offline Store
// =============================================================================

/// Handle to the terminal-local store. Cheap to clone.
#[derive(Debug, Clone)]
pub struct OfflineStore {
    pool: SqlitePool,
}

impl OfflineStore {
    /// Opens (or creates) the store at the given path and migrates it.
    pub async fn open(path: impl AsRef<Path>) -> OutboxResult<Self> {
        let url = format!("sqlite://{}?mode=rwc", path.as_ref().display());
        let options = SqliteConnectOptions::from_str(&url)?
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?;

        migrations::run_migrations(&pool).await?;
        info!(path = %path.as_ref().display(), "Offline store ready");

        Ok(OfflineStore { pool })
    }

    /// In-memory store for tests. Single connection: each in-memory
    /// connection is its own database.
    pub async fn in_memory() -> OutboxResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        migrations::run_migrations(&pool).await?;
        Ok(OfflineStore { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // Catalog Cache
    // =========================================================================

    /// Last-writer-wins upsert of the product cache (and the variant cache
    /// beneath it) from a server snapshot.
    pub async fn cache_products(&self, products: &[CachedProduct]) -> OutboxResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for product in products {
            let payload = serde_json::to_string(product)?;
            sqlx::query(
                "INSERT INTO products_cache (product_id, name, sku, payload_json, updated_at)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT (product_id) DO UPDATE SET
                     name = excluded.name, sku = excluded.sku,
                     payload_json = excluded.payload_json, updated_at = excluded.updated_at",
            )
            .bind(product.id)
            .bind(&product.name)
            .bind(&product.sku)
            .bind(&payload)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            for variant in &product.active_variants {
                sqlx::query(
                    "INSERT INTO variant_cache
                         (variant_id, product_id, sku, price_cents, stock_level, is_active, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT (variant_id) DO UPDATE SET
                         product_id = excluded.product_id, sku = excluded.sku,
                         price_cents = excluded.price_cents, stock_level = excluded.stock_level,
                         is_active = excluded.is_active, updated_at = excluded.updated_at",
                )
                .bind(variant.id)
                .bind(variant.product_id)
                .bind(&variant.sku)
                .bind(variant.price_cents)
                .bind(variant.stock_level)
                .bind(variant.is_active)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        debug!(count = products.len(), "Product cache refreshed");
        Ok(())
    }

    /// The cached catalog, by product id.
    pub async fn cached_products(&self) -> OutboxResult<Vec<CachedProduct>> {
        let payloads: Vec<String> =
            sqlx::query_scalar("SELECT payload_json FROM products_cache ORDER BY product_id ASC")
                .fetch_all(&self.pool)
                .await?;

        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(OutboxError::from))
            .collect()
    }

    /// Case-insensitive name/sku search over the cached catalog, for the
    /// terminal's product lookup while offline.
    pub async fn search_products(&self, query: &str) -> OutboxResult<Vec<CachedProduct>> {
        let pattern = format!("%{}%", query.trim());
        let payloads: Vec<String> = sqlx::query_scalar(
            "SELECT payload_json FROM products_cache
             WHERE name LIKE ? OR sku LIKE ?
             ORDER BY name ASC",
        )
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await?;

        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(OutboxError::from))
            .collect()
    }

    /// One cached variant, if present.
    pub async fn cached_variant(&self, variant_id: i64) -> OutboxResult<Option<CachedVariant>> {
        let row = sqlx::query_as::<_, (i64, i64, String, i64, i64, bool)>(
            "SELECT variant_id, product_id, sku, price_cents, stock_level, is_active
             FROM variant_cache WHERE variant_id = ?",
        )
        .bind(variant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(id, product_id, sku, price_cents, stock_level, is_active)| CachedVariant {
                id,
                product_id,
                sku,
                price_cents,
                stock_level,
                is_active,
            },
        ))
    }

    // =========================================================================
    // Order Cache
    // =========================================================================

    /// Last-writer-wins upsert of server-confirmed orders.
    pub async fn cache_orders(&self, orders: &[CachedOrder]) -> OutboxResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for order in orders {
            let payload = serde_json::to_string(order)?;
            sqlx::query(
                "INSERT INTO orders_cache (order_id, payload_json, updated_at)
                 VALUES (?, ?, ?)
                 ON CONFLICT (order_id) DO UPDATE SET
                     payload_json = excluded.payload_json, updated_at = excluded.updated_at",
            )
            .bind(order.id)
            .bind(&payload)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    // =========================================================================
    // Outbox
    // =========================================================================

    /// Queues a sale durably, never touching the network.
    ///
    /// Mints the idempotency key here, exactly once; retries replay the
    /// same key. The returned order carries a negative synthetic id and a
    /// total computed from cached prices; the server recomputes the real
    /// total from its own catalog at replay time.
    pub async fn queue_order(
        &self,
        lines: &[OrderLine],
        shop_id: Option<i64>,
        phone: Option<String>,
        address: Option<String>,
    ) -> OutboxResult<CachedOrder> {
        let items = normalize_lines(lines);
        if items.is_empty() {
            return Err(CoreError::EmptyCart.into());
        }

        let mut total = Money::zero();
        for item in &items {
            let variant = self
                .cached_variant(item.variant_id)
                .await?
                .ok_or(OutboxError::VariantNotCached {
                    variant_id: item.variant_id,
                })?;
            let line_total = Money::from_cents(variant.price_cents)
                .checked_mul(item.quantity)
                .ok_or(CoreError::AmountOverflow)?;
            total = total.checked_add(line_total).ok_or(CoreError::AmountOverflow)?;
        }

        let draft = OrderDraft {
            idempotency_key: Uuid::new_v4().to_string(),
            shop_id,
            phone: phone.clone(),
            address: address.clone(),
            items: items.clone(),
        };
        let payload = serde_json::to_string(&draft)?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let entry_id = sqlx::query(
            "INSERT INTO outbox (event_type, payload, status, retries, created_at, updated_at)
             VALUES ('order.create', ?, 'pending', 0, ?, ?)",
        )
        .bind(&payload)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        // Optimistic local decrement so the terminal UI reflects the sale
        // immediately; the next catalog refresh replaces it with the
        // server's authoritative count.
        for item in &items {
            sqlx::query(
                "UPDATE variant_cache
                 SET stock_level = MAX(stock_level - ?, 0), updated_at = ?
                 WHERE variant_id = ?",
            )
            .bind(item.quantity)
            .bind(now)
            .bind(item.variant_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            entry_id,
            total_cents = total.cents(),
            items = items.len(),
            "Sale queued for sync"
        );

        Ok(CachedOrder {
            id: -entry_id,
            status: PENDING_SYNC_STATUS.to_string(),
            total_amount_cents: total.cents(),
            phone,
            address,
            created_at: now,
        })
    }

    /// Oldest pending entries first, up to `limit`. The sync runner replays
    /// these in order.
    pub async fn pending_batch(&self, limit: i64) -> OutboxResult<Vec<OutboxEntry>> {
        let entries = sqlx::query_as::<_, OutboxEntry>(
            "SELECT id, event_type, payload, status, retries, last_error, created_at, updated_at
             FROM outbox WHERE status = 'pending'
             ORDER BY created_at ASC, id ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Entries that exhausted their retry budget. Never auto-deleted.
    pub async fn dead_entries(&self) -> OutboxResult<Vec<OutboxEntry>> {
        let entries = sqlx::query_as::<_, OutboxEntry>(
            "SELECT id, event_type, payload, status, retries, last_error, created_at, updated_at
             FROM outbox WHERE status = 'dead' ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// The entry synced: drop it and cache the server's order in its place.
    pub async fn complete_entry(
        &self,
        entry_id: i64,
        server_order: &CachedOrder,
    ) -> OutboxResult<()> {
        let payload = serde_json::to_string(server_order)?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM outbox WHERE id = ?")
            .bind(entry_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO orders_cache (order_id, payload_json, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT (order_id) DO UPDATE SET
                 payload_json = excluded.payload_json, updated_at = excluded.updated_at",
        )
        .bind(server_order.id)
        .bind(&payload)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!(entry_id, order_id = server_order.id, "Outbox entry synced");
        Ok(())
    }

    /// Records a failed replay attempt; escalates to dead at the retry
    /// budget. Returns the entry's resulting status.
    pub async fn record_failure(&self, entry_id: i64, error: &str) -> OutboxResult<OutboxStatus> {
        let now = Utc::now();

        let status: OutboxStatus = sqlx::query_scalar(
            "UPDATE outbox
             SET retries = retries + 1,
                 last_error = ?,
                 status = CASE WHEN retries + 1 >= ? THEN 'dead' ELSE status END,
                 updated_at = ?
             WHERE id = ?
             RETURNING status",
        )
        .bind(error)
        .bind(MAX_RETRIES)
        .bind(now)
        .bind(entry_id)
        .fetch_one(&self.pool)
        .await?;

        if status == OutboxStatus::Dead {
            warn!(entry_id, error, "Outbox entry exhausted retries, marked dead");
        }
        Ok(status)
    }

    // =========================================================================
    // Presentation
    // =========================================================================

    /// All orders as the terminal shows them: queued sales first (negative
    /// ids, newest first), then server-confirmed orders from the cache.
    pub async fn orders(&self) -> OutboxResult<Vec<CachedOrder>> {
        let mut result = Vec::new();

        for entry in self.pending_batch(i64::MAX).await?.into_iter().rev() {
            let draft: OrderDraft = serde_json::from_str(&entry.payload)?;

            let mut total = Money::zero();
            for item in &draft.items {
                if let Some(variant) = self.cached_variant(item.variant_id).await? {
                    let line_total = Money::from_cents(variant.price_cents)
                        .checked_mul(item.quantity)
                        .ok_or(CoreError::AmountOverflow)?;
                    total = total.checked_add(line_total).ok_or(CoreError::AmountOverflow)?;
                }
            }

            result.push(CachedOrder {
                id: -entry.id,
                status: PENDING_SYNC_STATUS.to_string(),
                total_amount_cents: total.cents(),
                phone: draft.phone,
                address: draft.address,
                created_at: entry.created_at,
            });
        }

        let payloads: Vec<String> =
            sqlx::query_scalar("SELECT payload_json FROM orders_cache ORDER BY order_id DESC")
                .fetch_all(&self.pool)
                .await?;
        for payload in &payloads {
            result.push(serde_json::from_str(payload)?);
        }

        Ok(result)
    }

    /// Sync-indicator counters.
    pub async fn status(&self) -> OutboxResult<StoreStatus> {
        let pending: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM outbox WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await?;
        let dead: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox WHERE status = 'dead'")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreStatus {
            pending,
            dead,
            last_sync_at: self.last_sync_at().await?,
        })
    }

    // =========================================================================
    // Sync State
    // =========================================================================

    /// When the last successful sync finished, if ever.
    pub async fn last_sync_at(&self) -> OutboxResult<Option<DateTime<Utc>>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM sync_state WHERE key = 'last_sync_at'")
                .fetch_optional(&self.pool)
                .await?;

        Ok(value
            .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }

    /// Advances the sync watermark.
    pub async fn set_last_sync_at(&self, at: DateTime<Utc>) -> OutboxResult<()> {
        sqlx::query(
            "INSERT INTO sync_state (key, value, updated_at)
             VALUES ('last_sync_at', ?, ?)
             ON CONFLICT (key) DO UPDATE SET
                 value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(at.to_rfc3339())
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<CachedProduct> {
        vec![CachedProduct {
            id: 1,
            shop_id: 1,
            sku: "WID".into(),
            name: "Widget".into(),
            active_variants: vec![
                CachedVariant {
                    id: 10,
                    product_id: 1,
                    sku: "WID-A".into(),
                    price_cents: 1_000,
                    stock_level: 5,
                    is_active: true,
                },
                CachedVariant {
                    id: 11,
                    product_id: 1,
                    sku: "WID-B".into(),
                    price_cents: 250,
                    stock_level: 8,
                    is_active: true,
                },
            ],
        }]
    }

    fn line(variant_id: i64, quantity: i64) -> OrderLine {
        OrderLine {
            variant_id,
            quantity,
        }
    }

    #[tokio::test]
    async fn test_queue_order_negative_id_and_local_total() {
        let store = OfflineStore::in_memory().await.unwrap();
        store.cache_products(&catalog()).await.unwrap();

        let order = store
            .queue_order(&[line(10, 2), line(11, 4)], None, None, None)
            .await
            .unwrap();

        assert!(order.id < 0);
        assert_eq!(order.status, PENDING_SYNC_STATUS);
        // 2 * $10.00 + 4 * $2.50, from cached prices.
        assert_eq!(order.total_amount_cents, 3_000);

        // Optimistic local decrement.
        let v = store.cached_variant(10).await.unwrap().unwrap();
        assert_eq!(v.stock_level, 3);

        let status = store.status().await.unwrap();
        assert_eq!(status.pending, 1);
        assert_eq!(status.dead, 0);
    }

    #[tokio::test]
    async fn test_queue_order_empty_cart_rejected() {
        let store = OfflineStore::in_memory().await.unwrap();
        store.cache_products(&catalog()).await.unwrap();

        let err = store
            .queue_order(&[line(10, 0)], None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OutboxError::Validation(CoreError::EmptyCart)
        ));
    }

    #[tokio::test]
    async fn test_queue_order_overflowing_total_rejected() {
        let store = OfflineStore::in_memory().await.unwrap();
        store
            .cache_products(&[CachedProduct {
                id: 9,
                shop_id: 1,
                sku: "BIG".into(),
                name: "Big Ticket".into(),
                active_variants: vec![CachedVariant {
                    id: 90,
                    product_id: 9,
                    sku: "BIG-A".into(),
                    price_cents: i64::MAX,
                    stock_level: 5,
                    is_active: true,
                }],
            }])
            .await
            .unwrap();

        let err = store
            .queue_order(&[line(90, 2)], None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OutboxError::Validation(CoreError::AmountOverflow)
        ));

        // Nothing was queued.
        assert_eq!(store.status().await.unwrap().pending, 0);
    }

    #[tokio::test]
    async fn test_idempotency_key_minted_once() {
        let store = OfflineStore::in_memory().await.unwrap();
        store.cache_products(&catalog()).await.unwrap();
        store
            .queue_order(&[line(10, 1)], None, None, None)
            .await
            .unwrap();

        let batch = store.pending_batch(100).await.unwrap();
        let draft: OrderDraft = serde_json::from_str(&batch[0].payload).unwrap();
        let key_before = draft.idempotency_key.clone();
        assert!(!key_before.is_empty());

        // A failed attempt must not regenerate the key.
        store.record_failure(batch[0].id, "boom").await.unwrap();
        let batch = store.pending_batch(100).await.unwrap();
        let draft: OrderDraft = serde_json::from_str(&batch[0].payload).unwrap();
        assert_eq!(draft.idempotency_key, key_before);
        assert_eq!(batch[0].retries, 1);
    }

    #[tokio::test]
    async fn test_pending_batch_is_fifo() {
        let store = OfflineStore::in_memory().await.unwrap();
        store.cache_products(&catalog()).await.unwrap();

        let first = store
            .queue_order(&[line(10, 1)], None, None, None)
            .await
            .unwrap();
        let second = store
            .queue_order(&[line(11, 1)], None, None, None)
            .await
            .unwrap();

        let batch = store.pending_batch(100).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(-batch[0].id, first.id);
        assert_eq!(-batch[1].id, second.id);
    }

    #[tokio::test]
    async fn test_record_failure_escalates_to_dead() {
        let store = OfflineStore::in_memory().await.unwrap();
        store.cache_products(&catalog()).await.unwrap();
        store
            .queue_order(&[line(10, 1)], None, None, None)
            .await
            .unwrap();
        let entry_id = store.pending_batch(1).await.unwrap()[0].id;

        for attempt in 1..MAX_RETRIES {
            let status = store.record_failure(entry_id, "rejected").await.unwrap();
            assert_eq!(status, OutboxStatus::Pending, "attempt {attempt}");
        }
        let status = store.record_failure(entry_id, "rejected").await.unwrap();
        assert_eq!(status, OutboxStatus::Dead);

        // Dead entries leave the replay queue but are never deleted.
        assert!(store.pending_batch(100).await.unwrap().is_empty());
        let dead = store.dead_entries().await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].retries, MAX_RETRIES);
        assert_eq!(dead[0].last_error.as_deref(), Some("rejected"));
    }

    #[tokio::test]
    async fn test_complete_entry_swaps_synthetic_for_server_order() {
        let store = OfflineStore::in_memory().await.unwrap();
        store.cache_products(&catalog()).await.unwrap();
        let queued = store
            .queue_order(&[line(10, 1)], None, None, None)
            .await
            .unwrap();
        let entry_id = -queued.id;

        let server_order = CachedOrder {
            id: 501,
            status: "pending".into(),
            total_amount_cents: 1_000,
            phone: None,
            address: None,
            created_at: Utc::now(),
        };
        store
            .complete_entry(entry_id, &server_order)
            .await
            .unwrap();

        let orders = store.orders().await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].id, 501);
        assert_eq!(store.status().await.unwrap().pending, 0);
    }

    #[tokio::test]
    async fn test_orders_lists_pending_before_cached() {
        let store = OfflineStore::in_memory().await.unwrap();
        store.cache_products(&catalog()).await.unwrap();

        store
            .cache_orders(&[CachedOrder {
                id: 7,
                status: "pending".into(),
                total_amount_cents: 500,
                phone: None,
                address: None,
                created_at: Utc::now(),
            }])
            .await
            .unwrap();
        let queued = store
            .queue_order(&[line(11, 2)], None, None, None)
            .await
            .unwrap();

        let orders = store.orders().await.unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].id, queued.id);
        assert_eq!(orders[0].status, PENDING_SYNC_STATUS);
        assert_eq!(orders[0].total_amount_cents, 500);
        assert_eq!(orders[1].id, 7);
    }

    #[tokio::test]
    async fn test_search_products_matches_name_and_sku() {
        let store = OfflineStore::in_memory().await.unwrap();
        store.cache_products(&catalog()).await.unwrap();

        let by_name = store.search_products("widg").await.unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].sku, "WID");

        let by_sku = store.search_products("WID").await.unwrap();
        assert_eq!(by_sku.len(), 1);

        assert!(store.search_products("nothing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sync_watermark_roundtrip() {
        let store = OfflineStore::in_memory().await.unwrap();
        assert!(store.last_sync_at().await.unwrap().is_none());

        let at = Utc::now();
        store.set_last_sync_at(at).await.unwrap();
        let loaded = store.last_sync_at().await.unwrap().unwrap();
        assert_eq!(loaded.timestamp(), at.timestamp());
    }
}
