//! # Order Fulfillment Service
//!
//! The two stock-mutating transactions of the system:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_order (checkout)              restock_order (cancel / return)   │
//! │                                                                         │
//! │  normalize lines                      acquire stock gate                │
//! │  acquire stock gate                   BEGIN                             │
//! │  BEGIN                                  stamp restocked_at (guarded)    │
//! │    idempotency replay check?  ──►       aggregate items per variant     │
//! │    load variants (asc id)               credit stock (bulk update)      │
//! │    validate: active, one shop,          ledger: adjust entries (+qty)   │
//! │              stock, total               refresh product read model      │
//! │    store payment slip                   audit: order.restocked          │
//! │    issue invoice/receipt/job nos      COMMIT                            │
//! │    insert order + items                                                 │
//! │    debit stock (guarded bulk update)                                    │
//! │    ledger: sale entries (-qty)                                          │
//! │    refresh product read model                                           │
//! │    audit: order.created                                                 │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any error anywhere rolls the whole transaction back: no partial orders,
//! no stock drift, no orphaned ledger entries.

use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use meridian_core::{
    normalize_lines, CoreError, Money, MovementEvent, MovementRef, OrderLine, PlacedOrder,
};

use crate::audit::{self, AuditEntry};
use crate::error::{DbError, DbResult};
use crate::numbering::{self, DocumentType};
use crate::pool::Database;
use crate::repository::{
    LockedVariant, MovementRepository, NewOrder, NewOrderItem, NewStockMovement, OrderRepository,
    ProductRepository, ShopRepository, VariantRepository,
};
use crate::slips::{SlipError, SlipStore};

// =============================================================================
// Request / Error Types
// =============================================================================

/// Payment-proof file attached to a checkout.
#[derive(Debug, Clone)]
pub struct PaymentSlip {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Checkout request, as received from the API or the offline replay.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub user_id: i64,
    pub lines: Vec<OrderLine>,
    /// Client-generated de-duplication token. Present on every offline
    /// replay; optional for direct online checkouts.
    pub idempotency_key: Option<String>,
    /// Explicit shop override; must match the shop the variants resolve to.
    pub shop_id: Option<i64>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub payment_slip: Option<PaymentSlip>,
}

/// Checkout / restock failure.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Client-correctable rejection; the transaction rolled back cleanly.
    #[error(transparent)]
    Validation(#[from] CoreError),

    /// Payment-slip persistence failed before the order was written.
    #[error(transparent)]
    Slip(#[from] SlipError),

    /// Infrastructure failure; safe to retry unchanged.
    #[error(transparent)]
    Db(#[from] DbError),
}

// =============================================================================
// Service
// =============================================================================

/// Executes the checkout and restock transactions against one [`Database`].
///
/// Cheap to clone; all clones share the database's stock gate.
#[derive(Clone)]
pub struct OrderService {
    db: Database,
    slips: Arc<dyn SlipStore>,
}

impl OrderService {
    pub fn new(db: Database, slips: Arc<dyn SlipStore>) -> Self {
        OrderService { db, slips }
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Places an order atomically, or changes nothing.
    ///
    /// When `idempotency_key` matches an order previously created for the
    /// same user, that order is returned unchanged and no stock moves; this is the
    /// exactly-once contract the offline replay depends on.
    #[instrument(skip(self, request), fields(user_id = request.user_id))]
    pub async fn create_order(&self, request: CreateOrder) -> Result<PlacedOrder, OrderError> {
        let lines = normalize_lines(&request.lines);
        if lines.is_empty() {
            return Err(CoreError::EmptyCart.into());
        }

        // All stock decisions below happen under the gate, after any
        // concurrent checkout's commit.
        let _gate = self.db.stock_gate().lock().await;

        let mut tx = self.db.pool().begin().await.map_err(DbError::from)?;

        if let Some(key) = request.idempotency_key.as_deref() {
            if let Some(existing) =
                OrderRepository::find_by_idempotency_key(&mut tx, request.user_id, key).await?
            {
                info!(order_id = existing.id, "Idempotent replay, returning existing order");
                let placed = OrderRepository::load_placed(&mut tx, existing.id).await?;
                tx.commit().await.map_err(DbError::from)?;
                return Ok(placed);
            }
        }

        let variant_ids: Vec<i64> = lines.iter().map(|l| l.variant_id).collect();
        let variants = VariantRepository::load_for_update(&mut tx, &variant_ids).await?;

        let (shop_id, total) = validate_cart(&lines, &variants, request.shop_id)?;

        let payment_slip = match &request.payment_slip {
            Some(slip) => Some(self.slips.store(&slip.file_name, &slip.bytes).await?),
            None => None,
        };

        let shop = ShopRepository::get(&mut tx, shop_id).await?;
        let branch = numbering::branch_code(&mut tx, &shop).await?;
        let invoice_no = numbering::next_number(&mut tx, DocumentType::Invoice, &branch).await?;
        let receipt_no = numbering::next_number(&mut tx, DocumentType::Receipt, &branch).await?;
        let job_no = numbering::next_number(&mut tx, DocumentType::Job, &branch).await?;

        let order_id = OrderRepository::insert(
            &mut tx,
            &NewOrder {
                invoice_no: invoice_no.clone(),
                receipt_no,
                job_no,
                idempotency_key: request.idempotency_key.clone(),
                user_id: request.user_id,
                shop_id,
                total_amount_cents: total.cents(),
                phone: request.phone.clone(),
                address: request.address.clone(),
                payment_slip,
            },
        )
        .await?;

        let items: Vec<NewOrderItem> = lines
            .iter()
            .zip(&variants)
            .map(|(line, variant)| NewOrderItem {
                product_id: variant.product_id,
                variant_id: variant.id,
                quantity: line.quantity,
                unit_price_cents: variant.price_cents,
            })
            .collect();
        OrderRepository::insert_items(&mut tx, order_id, &items).await?;

        debit_stock(&mut tx, &lines, &variants, order_id, request.user_id).await?;

        audit::record(
            &mut tx,
            &AuditEntry {
                actor_id: Some(request.user_id),
                event: "order.created".into(),
                subject_type: "order".into(),
                subject_id: order_id,
                old_values: None,
                new_values: Some(json!({
                    "invoice_no": invoice_no,
                    "shop_id": shop_id,
                    "total_amount_cents": total.cents(),
                    "items": items.len(),
                })),
            },
        )
        .await?;

        let placed = OrderRepository::load_placed(&mut tx, order_id).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!(
            order_id,
            invoice_no = %placed.order.invoice_no,
            total_cents = placed.order.total_amount_cents,
            "Order placed"
        );

        Ok(placed)
    }

    // =========================================================================
    // Restock
    // =========================================================================

    /// Credits an order's quantities back to stock, exactly once.
    ///
    /// Returns `true` if this call performed the credit, `false` if the
    /// order was already restocked (the call is then a no-op).
    #[instrument(skip(self))]
    pub async fn restock_order(
        &self,
        order_id: i64,
        actor_id: Option<i64>,
    ) -> Result<bool, OrderError> {
        let _gate = self.db.stock_gate().lock().await;

        let mut tx = self.db.pool().begin().await.map_err(DbError::from)?;

        // Existence check first so a bad id is NotFound, not a silent no-op.
        let order = OrderRepository::get(&mut tx, order_id).await?;

        let stamped = OrderRepository::mark_restocked(&mut tx, order.id, chrono::Utc::now()).await?;
        if !stamped {
            tx.commit().await.map_err(DbError::from)?;
            info!(order_id, "Order already restocked, skipping");
            return Ok(false);
        }

        let restock_lines = OrderRepository::restock_lines(&mut tx, order.id).await?;

        let deltas: Vec<(i64, i64)> = restock_lines
            .iter()
            .map(|line| (line.variant_id, line.quantity))
            .collect();
        let updated = VariantRepository::apply_stock_deltas(&mut tx, &deltas).await?;
        if updated != deltas.len() as u64 {
            return Err(DbError::TransactionFailed(format!(
                "restock touched {updated} of {} variants",
                deltas.len()
            ))
            .into());
        }

        for line in &restock_lines {
            MovementRepository::insert(
                &mut tx,
                &NewStockMovement {
                    event_type: MovementEvent::Adjust,
                    product_id: line.product_id,
                    variant_id: line.variant_id,
                    shop_id: order.shop_id,
                    quantity: line.quantity,
                    unit_price_cents: Some(line.unit_price_cents),
                    reference: Some(MovementRef::Order(order.id)),
                    actor_id,
                    note: Some("Order restock adjustment".into()),
                },
            )
            .await?;
        }

        let product_ids: Vec<i64> = restock_lines.iter().map(|l| l.product_id).collect();
        ProductRepository::refresh_stock(&mut tx, &product_ids).await?;

        audit::record(
            &mut tx,
            &AuditEntry {
                actor_id,
                event: "order.restocked".into(),
                subject_type: "order".into(),
                subject_id: order.id,
                old_values: None,
                new_values: Some(json!({ "variants": restock_lines.len() })),
            },
        )
        .await?;

        tx.commit().await.map_err(DbError::from)?;

        info!(order_id, variants = restock_lines.len(), "Order restocked");
        Ok(true)
    }
}

// =============================================================================
// Checkout Internals
// =============================================================================

/// Validates the normalized cart against the locked variants and returns the
/// resolved (shop_id, order total).
///
/// `lines` and `variants` are both ascending by variant id, so a positional
/// zip pairs them correctly once the counts match.
fn validate_cart(
    lines: &[OrderLine],
    variants: &[LockedVariant],
    forced_shop_id: Option<i64>,
) -> Result<(i64, Money), CoreError> {
    if variants.len() != lines.len() {
        return Err(CoreError::ItemsMissing);
    }

    let mut shop_id: Option<i64> = None;
    let mut total = Money::zero();

    for (line, variant) in lines.iter().zip(variants) {
        if !variant.is_active {
            return Err(CoreError::VariantInactive {
                sku: variant.sku.clone(),
            });
        }

        match shop_id {
            None => shop_id = Some(variant.shop_id),
            Some(resolved) if resolved != variant.shop_id => {
                return Err(CoreError::MultipleShops);
            }
            Some(_) => {}
        }

        if variant.stock_level < line.quantity {
            warn!(
                sku = %variant.sku,
                available = variant.stock_level,
                requested = line.quantity,
                "Insufficient stock"
            );
            return Err(CoreError::InsufficientStock {
                sku: variant.sku.clone(),
                available: variant.stock_level,
                requested: line.quantity,
            });
        }

        let line_total = Money::from_cents(variant.price_cents)
            .checked_mul(line.quantity)
            .ok_or(CoreError::AmountOverflow)?;
        total = total.checked_add(line_total).ok_or(CoreError::AmountOverflow)?;
    }

    // lines is non-empty here, so a shop was resolved.
    let resolved = shop_id.ok_or(CoreError::EmptyCart)?;

    if let Some(forced) = forced_shop_id {
        if forced != resolved {
            return Err(CoreError::ShopMismatch { forced, resolved });
        }
    }

    Ok((resolved, total))
}

/// Debits stock for every line and writes the matching sale ledger entries.
async fn debit_stock(
    conn: &mut sqlx::SqliteConnection,
    lines: &[OrderLine],
    variants: &[LockedVariant],
    order_id: i64,
    user_id: i64,
) -> DbResult<()> {
    let deltas: Vec<(i64, i64)> = lines
        .iter()
        .map(|line| (line.variant_id, -line.quantity))
        .collect();

    // The pre-check under the gate already guaranteed sufficiency; the
    // guarded update is the backstop for callers bypassing the gate.
    let updated = VariantRepository::apply_stock_deltas(&mut *conn, &deltas).await?;
    if updated != deltas.len() as u64 {
        return Err(DbError::TransactionFailed(format!(
            "stock debit touched {updated} of {} variants",
            deltas.len()
        )));
    }

    for (line, variant) in lines.iter().zip(variants) {
        MovementRepository::insert(
            &mut *conn,
            &NewStockMovement {
                event_type: MovementEvent::Sale,
                product_id: variant.product_id,
                variant_id: variant.id,
                shop_id: variant.shop_id,
                quantity: -line.quantity,
                unit_price_cents: Some(variant.price_cents),
                reference: Some(MovementRef::Order(order_id)),
                actor_id: Some(user_id),
                note: None,
            },
        )
        .await?;
    }

    let product_ids: Vec<i64> = variants.iter().map(|v| v.product_id).collect();
    ProductRepository::refresh_stock(&mut *conn, &product_ids).await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
