//! # Variant Repository
//!
//! The unit of stock. The two associated functions used by the stock
//! transactions are [`VariantRepository::load_for_update`] (ascending-id
//! loads, with the owning product joined in) and
//! [`VariantRepository::apply_stock_deltas`] (one guarded bulk UPDATE that
//! refuses to drive any stock_level negative).

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use meridian_core::ProductVariant;

use crate::error::DbResult;

// =============================================================================
// Row Types
// =============================================================================

/// A variant loaded for mutation, with the owning product's shop joined in.
///
/// Carries everything the checkout decision needs (price snapshot, stock,
/// active flag, shop attribution) so no second read happens between the
/// decision and the write.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LockedVariant {
    pub id: i64,
    pub product_id: i64,
    pub shop_id: i64,
    pub sku: String,
    pub price_cents: i64,
    pub stock_level: i64,
    pub is_active: bool,
}

/// Insert payload for seeding and tests.
#[derive(Debug, Clone)]
pub struct NewVariant {
    pub product_id: i64,
    pub sku: String,
    pub price_cents: i64,
    pub stock_level: i64,
    pub is_active: bool,
}

// =============================================================================
// Repository
// =============================================================================

/// Read access plus the transactional stock primitives.
#[derive(Debug, Clone)]
pub struct VariantRepository {
    pool: SqlitePool,
}

impl VariantRepository {
    pub fn new(pool: SqlitePool) -> Self {
        VariantRepository { pool }
    }

    /// Fetches a single variant by id.
    pub async fn get(&self, id: i64) -> DbResult<Option<ProductVariant>> {
        let variant = sqlx::query_as::<_, ProductVariant>(
            "SELECT id, product_id, sku, price_cents, stock_level, is_active,
                    created_at, updated_at
             FROM product_variants WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(variant)
    }

    /// Loads the given variants inside the caller's transaction, joined with
    /// their owning product for shop attribution.
    ///
    /// Rows come back in ascending variant-id order regardless of input
    /// order; callers relying on a fixed acquisition order get it for free.
    /// Missing ids are simply absent; the caller compares counts.
    pub async fn load_for_update(
        conn: &mut SqliteConnection,
        variant_ids: &[i64],
    ) -> DbResult<Vec<LockedVariant>> {
        if variant_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT v.id, v.product_id, p.shop_id, v.sku, v.price_cents,
                    v.stock_level, v.is_active
             FROM product_variants v
             JOIN products p ON p.id = v.product_id
             WHERE v.id IN (",
        );

        let mut separated = qb.separated(", ");
        for id in variant_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY v.id ASC");

        let rows = qb
            .build_query_as::<LockedVariant>()
            .fetch_all(&mut *conn)
            .await?;

        Ok(rows)
    }

    /// Applies signed stock deltas to many variants in ONE statement.
    ///
    /// The WHERE clause excludes any row the delta would drive negative, so
    /// on a lost race the statement updates fewer rows than deltas were
    /// given. Returns the number of rows actually updated; the caller aborts
    /// the transaction on a shortfall.
    pub async fn apply_stock_deltas(
        conn: &mut SqliteConnection,
        deltas: &[(i64, i64)],
    ) -> DbResult<u64> {
        if deltas.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE product_variants SET stock_level = stock_level + CASE id");
        for (variant_id, delta) in deltas {
            qb.push(" WHEN ");
            qb.push_bind(*variant_id);
            qb.push(" THEN ");
            qb.push_bind(*delta);
        }
        qb.push(" ELSE 0 END, updated_at = ");
        qb.push_bind(now);

        qb.push(" WHERE id IN (");
        let mut separated = qb.separated(", ");
        for (variant_id, _) in deltas {
            separated.push_bind(*variant_id);
        }
        separated.push_unseparated(")");

        qb.push(" AND stock_level + CASE id");
        for (variant_id, delta) in deltas {
            qb.push(" WHEN ");
            qb.push_bind(*variant_id);
            qb.push(" THEN ");
            qb.push_bind(*delta);
        }
        qb.push(" ELSE 0 END >= 0");

        let result = qb.build().execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }

    /// Inserts a variant. Used by the seeder and tests.
    pub async fn insert(conn: &mut SqliteConnection, new: &NewVariant) -> DbResult<i64> {
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO product_variants
                 (product_id, sku, price_cents, stock_level, is_active,
                  created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new.product_id)
        .bind(&new.sku)
        .bind(new.price_cents)
        .bind(new.stock_level)
        .bind(new.is_active)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::product::{NewProduct, ProductRepository};
    use crate::repository::shop::ShopRepository;

    async fn seed_variant(db: &Database, stock: i64) -> i64 {
        let mut conn = db.pool().acquire().await.unwrap();
        let shop_id = ShopRepository::insert(&mut conn, Some("MAIN"), "Main Street")
            .await
            .unwrap();
        let product_id = ProductRepository::insert(
            &mut conn,
            &NewProduct {
                shop_id,
                sku: "P-001".into(),
                name: "Widget".into(),
                is_active: true,
            },
        )
        .await
        .unwrap();
        VariantRepository::insert(
            &mut conn,
            &NewVariant {
                product_id,
                sku: "P-001-A".into(),
                price_cents: 1_500,
                stock_level: stock,
                is_active: true,
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_load_for_update_orders_by_id() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let shop_id = ShopRepository::insert(&mut conn, Some("MAIN"), "Main")
            .await
            .unwrap();
        let product_id = ProductRepository::insert(
            &mut conn,
            &NewProduct {
                shop_id,
                sku: "P-1".into(),
                name: "P".into(),
                is_active: true,
            },
        )
        .await
        .unwrap();

        let mut ids = Vec::new();
        for i in 0..3 {
            ids.push(
                VariantRepository::insert(
                    &mut conn,
                    &NewVariant {
                        product_id,
                        sku: format!("V-{i}"),
                        price_cents: 100,
                        stock_level: 5,
                        is_active: true,
                    },
                )
                .await
                .unwrap(),
            );
        }

        // Request in reverse; rows come back ascending.
        let reversed: Vec<i64> = ids.iter().rev().copied().collect();
        let rows = VariantRepository::load_for_update(&mut conn, &reversed)
            .await
            .unwrap();

        let loaded: Vec<i64> = rows.iter().map(|v| v.id).collect();
        assert_eq!(loaded, ids);
        assert_eq!(rows[0].shop_id, shop_id);
    }

    #[tokio::test]
    async fn test_apply_stock_deltas_refuses_negative() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let variant_id = seed_variant(&db, 3).await;

        {
            let mut conn = db.pool().acquire().await.unwrap();
            // Would go to -2: zero rows updated, stock untouched.
            let updated = VariantRepository::apply_stock_deltas(&mut conn, &[(variant_id, -5)])
                .await
                .unwrap();
            assert_eq!(updated, 0);
        }
        let variant = db.variants().get(variant_id).await.unwrap().unwrap();
        assert_eq!(variant.stock_level, 3);

        {
            let mut conn = db.pool().acquire().await.unwrap();
            // Exactly to zero is allowed.
            let updated = VariantRepository::apply_stock_deltas(&mut conn, &[(variant_id, -3)])
                .await
                .unwrap();
            assert_eq!(updated, 1);
        }
        let variant = db.variants().get(variant_id).await.unwrap().unwrap();
        assert_eq!(variant.stock_level, 0);
    }
}
