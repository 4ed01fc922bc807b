//! # Shop Repository
//!
//! Shops own the catalog and scope document numbers. Branch codes are
//! assigned lazily by the numbering service when missing.

use sqlx::{SqliteConnection, SqlitePool};

use meridian_core::Shop;

use crate::error::{DbError, DbResult};

#[derive(Debug, Clone)]
pub struct ShopRepository {
    pool: SqlitePool,
}

impl ShopRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ShopRepository { pool }
    }

    pub async fn list(&self) -> DbResult<Vec<Shop>> {
        let shops = sqlx::query_as::<_, Shop>("SELECT id, code, name FROM shops ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(shops)
    }

    /// Fetches one shop or fails with NotFound.
    pub async fn get(conn: &mut SqliteConnection, shop_id: i64) -> DbResult<Shop> {
        sqlx::query_as::<_, Shop>("SELECT id, code, name FROM shops WHERE id = ?")
            .bind(shop_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| DbError::not_found("Shop", shop_id))
    }

    /// Persists a lazily assigned branch code. Only fills a missing code;
    /// an existing code is never overwritten.
    pub async fn set_code(conn: &mut SqliteConnection, shop_id: i64, code: &str) -> DbResult<()> {
        sqlx::query("UPDATE shops SET code = ? WHERE id = ? AND code IS NULL")
            .bind(code)
            .bind(shop_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Inserts a shop. Used by the seeder and tests.
    pub async fn insert(
        conn: &mut SqliteConnection,
        code: Option<&str>,
        name: &str,
    ) -> DbResult<i64> {
        let result = sqlx::query("INSERT INTO shops (code, name) VALUES (?, ?)")
            .bind(code)
            .bind(name)
            .execute(&mut *conn)
            .await?;
        Ok(result.last_insert_rowid())
    }
}
