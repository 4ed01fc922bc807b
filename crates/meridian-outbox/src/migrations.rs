//! Embedded migrations for the terminal-local store.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::OutboxResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/client");

/// Runs all pending client-store migrations. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> OutboxResult<()> {
    MIGRATOR.run(pool).await?;
    info!("Offline store migrations applied");
    Ok(())
}
