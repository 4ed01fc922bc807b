//! # meridian-db: Server-Side Store for Meridian POS
//!
//! Authoritative inventory and order state, backed by SQLite via sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Meridian Server Data Flow                         │
//! │                                                                         │
//! │  apps/api handler (POST /api/orders)                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    meridian-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │  OrderService ──┬── repository::variant  (locked loads, bulk    │   │
//! │  │  (orders.rs)    │                         guarded stock update) │   │
//! │  │                 ├── repository::order    (order + items)        │   │
//! │  │                 ├── repository::movement (append-only ledger)   │   │
//! │  │                 ├── numbering            (invoice/receipt/job)  │   │
//! │  │                 ├── audit                (append-only trail)    │   │
//! │  │                 └── slips                (payment-proof files)  │   │
//! │  │                                                                 │   │
//! │  │  Everything above runs inside ONE sqlx transaction per call.    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL mode, foreign keys on, embedded migrations)                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency Discipline
//!
//! Stock-mutating transactions serialize on a process-wide *stock gate*
//! (`tokio::sync::Mutex` owned by [`Database`]), the single-process
//! substitute for `SELECT ... FOR UPDATE` row locks, which SQLite does not
//! have. Variant rows are always loaded in ascending-id order, and the
//! actual stock write is one guarded bulk UPDATE that refuses to drive any
//! stock_level negative, so the no-oversell invariant holds even for a
//! caller that bypasses the gate.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod audit;
pub mod error;
pub mod migrations;
pub mod numbering;
pub mod orders;
pub mod pool;
pub mod repository;
pub mod slips;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use numbering::DocumentType;
pub use orders::{CreateOrder, OrderError, OrderService, PaymentSlip};
pub use pool::{Database, DbConfig};
pub use slips::{FsSlipStore, SlipError, SlipStore};
