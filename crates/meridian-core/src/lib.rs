//! # meridian-core: Pure Business Logic for Meridian POS
//!
//! This crate is the heart of the order-fulfillment engine. It contains the
//! domain types and pure functions shared by the server store (`meridian-db`)
//! and the offline client (`meridian-outbox`).
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Meridian POS Architecture                          │
//! │                                                                         │
//! │   Sales channel (web / terminal)                                        │
//! │        │ online              │ offline                                  │
//! │        ▼                     ▼                                          │
//! │   apps/api (axum)       meridian-outbox (durable queue + sync)          │
//! │        │                     │ replays against apps/api                 │
//! │        ▼                     │                                          │
//! │   meridian-db  ◄─────────────┘                                          │
//! │   (checkout + restock transactions, ledger, numbering)                  │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   ★ meridian-core (THIS CRATE) ★                                        │
//! │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Order, ProductVariant, StockMovement, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`cart`] - Order line normalization (merge, filter, deterministic order)
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure functions**: deterministic, no side effects
//! 2. **Integer money**: all monetary values are cents (i64)
//! 3. **Explicit errors**: typed enums, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod error;
pub mod money;
pub mod types;

// =============================================================================
// Re-exports
// =============================================================================

pub use cart::{normalize_lines, OrderLine};
pub use error::{CoreError, CoreResult};
pub use money::Money;
pub use types::{
    CachedOrder, CachedProduct, CachedVariant, MovementEvent, MovementRef, Order, OrderDraft,
    OrderItem, OrderStatus, OutboxEntry, OutboxStatus, PlacedOrder, Product, ProductVariant, Shop,
    StockMovement, PENDING_SYNC_STATUS,
};
