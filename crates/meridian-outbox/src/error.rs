//! # Outbox Error Types
//!
//! Failures on the terminal side. Network errors are the normal case here
//! (the terminal is offline whenever the shop's link is down) and are
//! recorded per outbox entry rather than propagated to the seller.

use thiserror::Error;

/// Terminal-side store and sync errors.
#[derive(Debug, Error)]
pub enum OutboxError {
    /// The sale was rejected locally before anything was queued.
    #[error(transparent)]
    Validation(#[from] meridian_core::CoreError),

    /// Local SQLite failure.
    #[error("Offline store error: {0}")]
    Database(#[from] sqlx::Error),

    /// Local store migration failed.
    #[error("Offline store migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Outbox payload or cache snapshot failed to (de)serialize.
    #[error("Payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP transport failure talking to the server.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A sync run was requested while another was in flight.
    #[error("Sync already in progress")]
    SyncInProgress,

    /// A queued outbox entry references a variant absent from the cache.
    #[error("Variant {variant_id} not in local cache")]
    VariantNotCached { variant_id: i64 },
}

/// Result type for offline store and sync operations.
pub type OutboxResult<T> = Result<T, OutboxError>;
