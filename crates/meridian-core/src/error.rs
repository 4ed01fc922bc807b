//! # Error Types
//!
//! Domain errors for the order-fulfillment engine.
//!
//! ## Taxonomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Validation errors (this module)                                        │
//! │    Empty cart, missing/inactive variant, insufficient stock,            │
//! │    multi-shop basket. Surfaced to the caller verbatim with the          │
//! │    offending sku named. Never retried; the transaction always rolls     │
//! │    back cleanly.                                                        │
//! │                                                                         │
//! │  Storage/infrastructure errors (meridian-db::DbError)                   │
//! │    Safe to retry unchanged from the top.                                │
//! │                                                                         │
//! │  Network errors (meridian-outbox::OutboxError)                          │
//! │    Recorded per outbox entry, retried with a bounded count, then        │
//! │    escalated to the dead-letter state.                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Client-correctable validation failures of the checkout transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The item list is empty after normalization. Rejected before any
    /// transaction is opened.
    #[error("Order items are required")]
    EmptyCart,

    /// One or more requested variant ids do not resolve, typically a stale client
    /// catalog referencing deleted variants.
    #[error("Some variants are missing")]
    ItemsMissing,

    /// Line items resolve to more than one shop; multi-shop baskets are not
    /// supported by a single order.
    #[error("Order items must belong to a single shop")]
    MultipleShops,

    /// An explicit forced-shop override conflicts with the variants' shop.
    #[error("Order items do not belong to shop {forced} (resolved shop {resolved})")]
    ShopMismatch { forced: i64, resolved: i64 },

    /// The variant exists but is not sellable.
    #[error("Variant {sku} is inactive")]
    VariantInactive { sku: String },

    /// Requested quantity exceeds current stock, read under the stock lock
    /// so this decision is race-free against concurrent sales.
    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    /// Accumulating the order total overflowed i64 cents.
    #[error("Order total overflows the representable amount")]
    AmountOverflow,
}

/// Convenience alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_sku() {
        let err = CoreError::InsufficientStock {
            sku: "X1".to_string(),
            available: 5,
            requested: 7,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for X1: available 5, requested 7"
        );

        let err = CoreError::VariantInactive {
            sku: "X1".to_string(),
        };
        assert_eq!(err.to_string(), "Variant X1 is inactive");
    }
}
