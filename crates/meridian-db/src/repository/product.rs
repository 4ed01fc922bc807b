//! # Product Repository
//!
//! Catalog reads plus the denormalized stock refresh run at the tail of
//! every stock transaction.

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use meridian_core::{Product, ProductVariant};

use crate::error::DbResult;

/// Insert payload for seeding and tests.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub shop_id: i64,
    pub sku: String,
    pub name: String,
    pub is_active: bool,
}

/// Catalog reads plus the transactional stock-refresh.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Fetches a single product by id.
    pub async fn get(&self, id: i64) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT id, shop_id, sku, name, stock_level, is_active, created_at, updated_at
             FROM products WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(product)
    }

    /// Active catalog with each product's active variants, for the catalog
    /// endpoint and the terminal cache refresh.
    pub async fn catalog(&self) -> DbResult<Vec<(Product, Vec<ProductVariant>)>> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT id, shop_id, sku, name, stock_level, is_active, created_at, updated_at
             FROM products WHERE is_active = 1 ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let variants = sqlx::query_as::<_, ProductVariant>(
            "SELECT id, product_id, sku, price_cents, stock_level, is_active,
                    created_at, updated_at
             FROM product_variants WHERE is_active = 1 ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut catalog: Vec<(Product, Vec<ProductVariant>)> = products
            .into_iter()
            .map(|product| (product, Vec::new()))
            .collect();

        for variant in variants {
            if let Some((_, list)) = catalog
                .iter_mut()
                .find(|(product, _)| product.id == variant.product_id)
            {
                list.push(variant);
            }
        }

        Ok(catalog)
    }

    /// Recomputes the denormalized `products.stock_level` read model from
    /// the owned active variants. Run inside the stock transactions, after
    /// the variant update.
    pub async fn refresh_stock(
        conn: &mut SqliteConnection,
        product_ids: &[i64],
    ) -> DbResult<()> {
        if product_ids.is_empty() {
            return Ok(());
        }

        let now = Utc::now();

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "UPDATE products SET stock_level = (
                 SELECT COALESCE(SUM(v.stock_level), 0)
                 FROM product_variants v
                 WHERE v.product_id = products.id AND v.is_active = 1
             ), updated_at = ",
        );
        qb.push_bind(now);
        qb.push(" WHERE id IN (");
        let mut separated = qb.separated(", ");
        for id in product_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        qb.build().execute(&mut *conn).await?;
        Ok(())
    }

    /// Inserts a product. Used by the seeder and tests.
    pub async fn insert(conn: &mut SqliteConnection, new: &NewProduct) -> DbResult<i64> {
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO products (shop_id, sku, name, stock_level, is_active,
                                   created_at, updated_at)
             VALUES (?, ?, ?, 0, ?, ?, ?)",
        )
        .bind(new.shop_id)
        .bind(&new.sku)
        .bind(&new.name)
        .bind(new.is_active)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }
}
