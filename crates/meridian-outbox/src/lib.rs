//! # meridian-outbox: Offline Store & Sync for the POS Terminal
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Terminal Data Flow (offline-first)                 │
//! │                                                                         │
//! │  Sale at the counter                                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  OfflineStore::queue_order                                              │
//! │    ├── mint idempotency key (uuid v4, once, never regenerated)          │
//! │    ├── write outbox row (durable BEFORE any network attempt)            │
//! │    ├── optimistic local stock decrement in the variant cache            │
//! │    └── return synthetic order (negative id, "pending_sync")             │
//! │                                                                         │
//! │  SyncRunner::sync_once (background / on reconnect)                      │
//! │    ├── single-flight: overlapping runs are refused                      │
//! │    ├── FIFO replay: POST /api/orders + X-Idempotency-Key header         │
//! │    │     2xx ──► delete entry, cache the server's order                 │
//! │    │     4xx/5xx/timeout ─► retries += 1; at 10 ──► status = dead       │
//! │    │     connection refused ─► stop, no retry burned                    │
//! │    ├── refresh catalog + order caches from the server                   │
//! │    └── advance the last_sync_at watermark when anything was pushed      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The server's idempotency index makes the replay exactly-once: a retry of
//! an already-applied entry returns the original order and moves no stock.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod store;
pub mod sync;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{OutboxError, OutboxResult};
pub use store::{OfflineStore, StoreStatus};
pub use sync::{SyncReport, SyncRunner};
