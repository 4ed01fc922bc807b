//! # Document Numbering
//!
//! Issues invoice / receipt / job numbers of the form
//! `{PREFIX}-{BRANCH}-{YYYYMMDD}-{NNNNN}`, e.g. `INV-MAIN-20260825-00042`.
//!
//! Counters live in `document_sequences`, keyed by (document type, branch
//! code, business date), and are advanced with a single upsert that returns
//! the new value:
//!
//! ```text
//! INSERT ... VALUES (type, branch, date, 1)
//!   ON CONFLICT DO UPDATE SET last_number = last_number + 1
//!   RETURNING last_number
//! ```
//!
//! Run inside the checkout transaction: if the checkout aborts, the counter
//! advance rolls back with it, so persisted numbers have no holes from
//! failed checkouts. Numbers are issued exactly once and never reissued.

use chrono::Utc;
use sqlx::SqliteConnection;

use meridian_core::Shop;

use crate::error::DbResult;
use crate::repository::ShopRepository;

// =============================================================================
// Document Types
// =============================================================================

/// The three documents issued per order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentType {
    Invoice,
    Receipt,
    Job,
}

impl DocumentType {
    /// Storage discriminant (sequence key).
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "invoice",
            DocumentType::Receipt => "receipt",
            DocumentType::Job => "job",
        }
    }

    /// Human-facing number prefix.
    pub fn prefix(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "INV",
            DocumentType::Receipt => "RCP",
            DocumentType::Job => "JOB",
        }
    }
}

// =============================================================================
// Issuing
// =============================================================================

/// Resolves the shop's branch code, assigning `B{id:03}` if the shop has
/// none yet. The assignment persists, so the code stays stable.
pub async fn branch_code(conn: &mut SqliteConnection, shop: &Shop) -> DbResult<String> {
    if let Some(code) = &shop.code {
        return Ok(code.clone());
    }

    let code = format!("B{:03}", shop.id);
    ShopRepository::set_code(&mut *conn, shop.id, &code).await?;
    Ok(code)
}

/// Issues the next number for (document type, branch, today) inside the
/// caller's transaction.
pub async fn next_number(
    conn: &mut SqliteConnection,
    doc_type: DocumentType,
    branch: &str,
) -> DbResult<String> {
    let date = Utc::now().format("%Y%m%d").to_string();

    let seq: i64 = sqlx::query_scalar(
        "INSERT INTO document_sequences (document_type, branch_code, sequence_date, last_number)
         VALUES (?, ?, ?, 1)
         ON CONFLICT (document_type, branch_code, sequence_date)
             DO UPDATE SET last_number = last_number + 1
         RETURNING last_number",
    )
    .bind(doc_type.as_str())
    .bind(branch)
    .bind(&date)
    .fetch_one(&mut *conn)
    .await?;

    Ok(format!("{}-{}-{}-{:05}", doc_type.prefix(), branch, date, seq))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_numbers_increment_per_type() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        let a = next_number(&mut conn, DocumentType::Invoice, "MAIN")
            .await
            .unwrap();
        let b = next_number(&mut conn, DocumentType::Invoice, "MAIN")
            .await
            .unwrap();
        let c = next_number(&mut conn, DocumentType::Receipt, "MAIN")
            .await
            .unwrap();

        assert!(a.starts_with("INV-MAIN-"));
        assert!(a.ends_with("-00001"));
        assert!(b.ends_with("-00002"));
        // Receipt counter is independent of the invoice counter.
        assert!(c.starts_with("RCP-MAIN-"));
        assert!(c.ends_with("-00001"));
    }

    #[tokio::test]
    async fn test_branch_counters_are_independent() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        let a = next_number(&mut conn, DocumentType::Job, "MAIN")
            .await
            .unwrap();
        let b = next_number(&mut conn, DocumentType::Job, "EAST")
            .await
            .unwrap();

        assert!(a.ends_with("-00001"));
        assert!(b.ends_with("-00001"));
    }

    #[tokio::test]
    async fn test_branch_code_assigned_lazily() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        let shop_id = ShopRepository::insert(&mut conn, None, "Unnamed Branch")
            .await
            .unwrap();
        let shop = ShopRepository::get(&mut conn, shop_id).await.unwrap();

        let code = branch_code(&mut conn, &shop).await.unwrap();
        assert_eq!(code, format!("B{:03}", shop_id));

        // Persisted: the next load sees the assigned code.
        let shop = ShopRepository::get(&mut conn, shop_id).await.unwrap();
        assert_eq!(shop.code.as_deref(), Some(code.as_str()));

        // Existing codes are never overwritten.
        let code_again = branch_code(&mut conn, &shop).await.unwrap();
        assert_eq!(code_again, code);
    }
}
