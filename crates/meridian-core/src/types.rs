//! # Domain Types
//!
//! Core domain types shared by the server store and the offline client.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  SERVER SIDE (authoritative)          CLIENT SIDE (cache + queue)       │
//! │  ┌──────────────────┐                 ┌──────────────────┐              │
//! │  │ Shop             │                 │ CachedProduct    │              │
//! │  │ Product          │                 │ CachedVariant    │              │
//! │  │ ProductVariant   │ ◄── stock ──►   │ CachedOrder      │              │
//! │  │ Order/OrderItem  │                 │ OutboxEntry      │              │
//! │  │ StockMovement    │                 │ OrderDraft       │              │
//! │  └──────────────────┘                 └──────────────────┘              │
//! │                                                                         │
//! │  ProductVariant is the unit of stock: stock_level never goes negative   │
//! │  and is mutated only by the checkout / restock transactions.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Server entity ids are `i64` rowids; the offline client presents queued
//! orders under *negative* synthetic ids so they can never collide with a
//! server-issued id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cart::OrderLine;
use crate::money::Money;

// =============================================================================
// Shop
// =============================================================================

/// A shop (branch). Document numbers are scoped per shop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Shop {
    pub id: i64,
    /// Branch code used as the document-number prefix (e.g. "MAIN").
    /// Assigned lazily as `B{id:03}` when missing.
    pub code: Option<String>,
    pub name: String,
}

// =============================================================================
// Product & Variant
// =============================================================================

/// A catalog product. Belongs to exactly one shop.
///
/// `stock_level` here is a denormalized read model (sum of active variants),
/// refreshed by the stock transactions. The authoritative count lives on the
/// variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: i64,
    pub shop_id: i64,
    pub sku: String,
    pub name: String,
    pub stock_level: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A specific purchasable SKU under a product: the unit of stock.
///
/// Invariant: `stock_level >= 0`, enforced by the guarded bulk update in the
/// stock transactions. Never assign stock_level directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ProductVariant {
    pub id: i64,
    pub product_id: i64,
    pub sku: String,
    pub price_cents: i64,
    pub stock_level: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductVariant {
    /// Current unit price as Money (the pricing-snapshot source).
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// Order lifecycle status.
///
/// The fulfillment engine only ever *creates* `Pending` orders; the later
/// transitions are owned by out-of-scope lifecycle actions (which invoke the
/// restock transaction on cancel / return-accept).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Completed,
    Cancelled,
    Returned,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Returned => "returned",
        }
    }
}

// =============================================================================
// Order
// =============================================================================

/// Aggregate root of a sale.
///
/// The three document numbers are issued exactly once at creation and never
/// reissued. `total_amount_cents` equals the sum of item line totals captured
/// at creation time and is never recomputed, even if catalog prices change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
    pub id: i64,
    pub invoice_no: String,
    pub receipt_no: String,
    pub job_no: String,
    /// Client-generated de-duplication token (offline replays).
    pub idempotency_key: Option<String>,
    pub user_id: i64,
    pub shop_id: i64,
    pub status: OrderStatus,
    pub total_amount_cents: i64,
    pub phone: Option<String>,
    pub address: Option<String>,
    /// Durable reference to the stored payment-proof file, if any.
    pub payment_slip: Option<String>,
    /// Set by the restock transaction; guards against double-crediting stock.
    pub restocked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[inline]
    pub fn total_amount(&self) -> Money {
        Money::from_cents(self.total_amount_cents)
    }
}

/// One line of a sale.
///
/// `unit_price_cents` is snapshotted at order time and never read back from
/// the catalog after creation. A variant appears at most once per order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub variant_id: i64,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

impl OrderItem {
    /// Line total (snapshot price × quantity).
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.unit_price_cents * self.quantity)
    }
}

/// A fully loaded order aggregate as returned by the checkout transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacedOrder {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub shop: Shop,
}

// =============================================================================
// Stock Movement (ledger)
// =============================================================================

/// What kind of inventory change a ledger entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum MovementEvent {
    /// Checkout: negative quantity delta.
    Sale,
    /// Compensating correction (restock on cancel/return): positive delta.
    Adjust,
    /// Inter-shop stock transfer.
    Transfer,
}

/// The record that caused a stock movement.
///
/// A sum type instead of an untyped (type-string, id) pair, so reporting
/// over reference kinds is exhaustive at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MovementRef {
    Order(i64),
    Transfer(i64),
    Adjustment(i64),
}

impl MovementRef {
    /// Storage discriminant for the (kind, id) column pair.
    pub fn kind(&self) -> &'static str {
        match self {
            MovementRef::Order(_) => "order",
            MovementRef::Transfer(_) => "transfer",
            MovementRef::Adjustment(_) => "adjustment",
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            MovementRef::Order(id) | MovementRef::Transfer(id) | MovementRef::Adjustment(id) => {
                *id
            }
        }
    }

    /// Rebuilds the reference from its stored column pair.
    pub fn from_parts(kind: &str, id: i64) -> Option<Self> {
        match kind {
            "order" => Some(MovementRef::Order(id)),
            "transfer" => Some(MovementRef::Transfer(id)),
            "adjustment" => Some(MovementRef::Adjustment(id)),
            _ => None,
        }
    }
}

/// One immutable fact about a stock change.
///
/// Append-only: the ledger repository exposes no update or delete. The sum of
/// all entries for a variant, from its creation, equals its current
/// stock_level minus its initial stock_level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: i64,
    pub event_type: MovementEvent,
    pub product_id: i64,
    pub variant_id: i64,
    pub shop_id: i64,
    /// Signed delta: negative for sales, positive for restock adjustments.
    pub quantity: i64,
    pub unit_price_cents: Option<i64>,
    pub reference: Option<MovementRef>,
    pub actor_id: Option<i64>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Offline Outbox (client-resident)
// =============================================================================

/// Outbox entry status.
///
/// `Pending` entries are replayed by the sync runner; `Dead` is terminal:
/// the retry budget is exhausted and an operator has to intervene. Dead
/// entries are never auto-deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Dead,
}

/// A durably queued intent to create an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OutboxEntry {
    pub id: i64,
    /// Currently only "order.create".
    pub event_type: String,
    /// Serialized [`OrderDraft`] including the idempotency key.
    pub payload: String,
    pub status: OutboxStatus,
    pub retries: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The queued order-creation command (outbox payload / request body).
///
/// The idempotency key is generated once at enqueue time and never
/// regenerated on retry. It is the de-duplication token the server honors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDraft {
    pub idempotency_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shop_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub items: Vec<OrderLine>,
}

// =============================================================================
// Client Cache Payloads
// =============================================================================

/// Catalog product as cached on the terminal (last-writer-wins upsert).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedProduct {
    pub id: i64,
    pub shop_id: i64,
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub active_variants: Vec<CachedVariant>,
}

/// Variant snapshot in the terminal cache; `price_cents` feeds the locally
/// computed total shown for pending-sync orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedVariant {
    pub id: i64,
    pub product_id: i64,
    pub sku: String,
    pub price_cents: i64,
    pub stock_level: i64,
    pub is_active: bool,
}

/// Order as presented by the terminal: either a server-confirmed order
/// (positive id) or a queued pending-sync order (negative synthetic id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedOrder {
    pub id: i64,
    pub status: String,
    pub total_amount_cents: i64,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Status string shown for not-yet-synced orders.
pub const PENDING_SYNC_STATUS: &str = "pending_sync";

// =============================================================================
// Unit Tests
// =============================================================================
