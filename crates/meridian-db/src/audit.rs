//! # Audit Trail
//!
//! Append-only record of business events (order placed, order restocked),
//! written in the same transaction as the event itself. Value snapshots are
//! stored as JSON text.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::DbResult;

/// One audit event.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub actor_id: Option<i64>,
    /// Dotted event name, e.g. `order.created`.
    pub event: String,
    pub subject_type: String,
    pub subject_id: i64,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
}

/// Stored audit row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditLog {
    pub id: i64,
    pub actor_id: Option<i64>,
    pub event: String,
    pub subject_type: String,
    pub subject_id: i64,
    pub old_values: Option<String>,
    pub new_values: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Appends one audit entry inside the caller's transaction.
pub async fn record(conn: &mut SqliteConnection, entry: &AuditEntry) -> DbResult<i64> {
    let now = Utc::now();

    let result = sqlx::query(
        "INSERT INTO audit_logs
             (actor_id, event, subject_type, subject_id, old_values, new_values, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(entry.actor_id)
    .bind(&entry.event)
    .bind(&entry.subject_type)
    .bind(entry.subject_id)
    .bind(entry.old_values.as_ref().map(Value::to_string))
    .bind(entry.new_values.as_ref().map(Value::to_string))
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// History of one subject, oldest first.
pub async fn for_subject(
    pool: &SqlitePool,
    subject_type: &str,
    subject_id: i64,
) -> DbResult<Vec<AuditLog>> {
    let rows = sqlx::query_as::<_, AuditLog>(
        "SELECT id, actor_id, event, subject_type, subject_id, old_values,
                new_values, created_at
         FROM audit_logs WHERE subject_type = ? AND subject_id = ?
         ORDER BY id ASC",
    )
    .bind(subject_type)
    .bind(subject_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
