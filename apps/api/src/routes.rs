//! # HTTP Routes
//!
//! | Method | Path          | Purpose                                   |
//! |--------|---------------|-------------------------------------------|
//! | GET    | /health       | Liveness + database check                 |
//! | GET    | /api/products | Catalog snapshot for the terminal cache   |
//! | GET    | /api/orders   | Recent orders for the terminal cache      |
//! | POST   | /api/orders   | Checkout (offline-replay target)          |
//!
//! Response bodies are wrapped as `{ "data": ... }`; errors as
//! `{ "error": "<message>" }`.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use meridian_core::{CachedProduct, CachedVariant, OrderLine};
use meridian_db::{CreateOrder, Database, OrderService, PaymentSlip};

use crate::error::ApiError;

/// Longest accepted idempotency key. Anything longer is a malformed client.
const MAX_IDEMPOTENCY_KEY_LEN: usize = 120;

/// Orders returned to the terminal cache per request.
const ORDER_PAGE_SIZE: i64 = 100;

// =============================================================================
// State & Router
// =============================================================================

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub orders: OrderService,
    pub default_user_id: i64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/products", get(list_products))
        .route("/api/orders", get(list_orders).post(create_order))
        .with_state(state)
}

// =============================================================================
// Request Types
// =============================================================================

/// Checkout request body. The offline client posts its queued
/// [`meridian_core::OrderDraft`] verbatim, which deserializes into this.
#[derive(Debug, Deserialize)]
struct OrderRequest {
    #[serde(default)]
    idempotency_key: Option<String>,
    #[serde(default)]
    shop_id: Option<i64>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    items: Vec<OrderLine>,
    #[serde(default)]
    payment_slip: Option<SlipUpload>,
}

/// Payment-proof file, base64-encoded in the JSON body.
#[derive(Debug, Deserialize)]
struct SlipUpload {
    file_name: String,
    content_base64: String,
}

// =============================================================================
// Handlers
// =============================================================================

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let db_up = state.db.health_check().await;
    let status = if db_up { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status,
        Json(json!({
            "status": if db_up { "up" } else { "degraded" },
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}

async fn list_products(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let catalog = state.db.products().catalog().await?;

    let data: Vec<CachedProduct> = catalog
        .into_iter()
        .map(|(product, variants)| CachedProduct {
            id: product.id,
            shop_id: product.shop_id,
            sku: product.sku,
            name: product.name,
            active_variants: variants
                .into_iter()
                .map(|v| CachedVariant {
                    id: v.id,
                    product_id: v.product_id,
                    sku: v.sku,
                    price_cents: v.price_cents,
                    stock_level: v.stock_level,
                    is_active: v.is_active,
                })
                .collect(),
        })
        .collect();

    Ok(Json(json!({ "data": data })))
}

async fn list_orders(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let orders = state.db.orders().list_recent(ORDER_PAGE_SIZE).await?;
    Ok(Json(json!({ "data": orders })))
}

async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<OrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let idempotency_key = resolve_idempotency_key(&headers, request.idempotency_key)?;

    let payment_slip = match request.payment_slip {
        Some(upload) => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(&upload.content_base64)
                .map_err(|_| {
                    ApiError::Unprocessable("payment_slip is not valid base64".to_string())
                })?;
            Some(PaymentSlip {
                file_name: upload.file_name,
                bytes,
            })
        }
        None => None,
    };

    let placed = state
        .orders
        .create_order(CreateOrder {
            user_id: state.default_user_id,
            lines: request.items,
            idempotency_key,
            shop_id: request.shop_id,
            phone: request.phone,
            address: request.address,
            payment_slip,
        })
        .await?;

    info!(
        order_id = placed.order.id,
        invoice_no = %placed.order.invoice_no,
        "Order accepted"
    );

    Ok((StatusCode::CREATED, Json(json!({ "data": placed }))))
}

/// The header wins over the body; both are optional, neither may exceed the
/// length cap.
fn resolve_idempotency_key(
    headers: &HeaderMap,
    body_key: Option<String>,
) -> Result<Option<String>, ApiError> {
    let from_header = match headers.get("X-Idempotency-Key") {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| {
                    ApiError::Unprocessable("X-Idempotency-Key is not valid UTF-8".to_string())
                })?
                .to_string(),
        ),
        None => None,
    };

    let key = from_header.or(body_key).filter(|k| !k.is_empty());

    if let Some(k) = &key {
        if k.len() > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(ApiError::Unprocessable(format!(
                "idempotency key exceeds {MAX_IDEMPOTENCY_KEY_LEN} characters"
            )));
        }
    }

    Ok(key)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_db::repository::{
        NewProduct, NewVariant, ProductRepository, ShopRepository, VariantRepository,
    };
    use meridian_db::{DbConfig, FsSlipStore};
    use std::sync::Arc;

    /// Serves a seeded app on an ephemeral port; returns its base URL.
    async fn spawn_app() -> (String, Database) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let shop_id = ShopRepository::insert(&mut conn, Some("MAIN"), "Main Street")
            .await
            .unwrap();
        sqlx_insert_user(&mut conn, shop_id).await;
        let product_id = ProductRepository::insert(
            &mut conn,
            &NewProduct {
                shop_id,
                sku: "WID".into(),
                name: "Widget".into(),
                is_active: true,
            },
        )
        .await
        .unwrap();
        VariantRepository::insert(
            &mut conn,
            &NewVariant {
                product_id,
                sku: "WID-A".into(),
                price_cents: 1_000,
                stock_level: 5,
                is_active: true,
            },
        )
        .await
        .unwrap();
        ProductRepository::refresh_stock(&mut conn, &[product_id])
            .await
            .unwrap();
        drop(conn);

        let orders = OrderService::new(
            db.clone(),
            Arc::new(FsSlipStore::new(std::env::temp_dir())),
        );
        let state = AppState {
            db: db.clone(),
            orders,
            default_user_id: 1,
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });

        (format!("http://{addr}"), db)
    }

    async fn sqlx_insert_user(conn: &mut sqlx::SqliteConnection, shop_id: i64) {
        sqlx::query("INSERT INTO users (name, shop_id) VALUES ('cashier', ?)")
            .bind(shop_id)
            .execute(conn)
            .await
            .unwrap();
    }

    fn order_body(quantity: i64) -> serde_json::Value {
        json!({ "items": [{ "variant_id": 1, "quantity": quantity }] })
    }

    #[tokio::test]
    async fn test_create_order_end_to_end() {
        let (base, _db) = spawn_app().await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/api/orders"))
            .json(&order_body(2))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["data"]["total_amount_cents"], 2_000);
        assert!(body["data"]["invoice_no"]
            .as_str()
            .unwrap()
            .starts_with("INV-MAIN-"));
        assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);

        // The catalog the terminal pulls reflects the sale.
        let products: serde_json::Value = client
            .get(format!("{base}/api/products"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(products["data"][0]["active_variants"][0]["stock_level"], 3);

        let orders: serde_json::Value = client
            .get(format!("{base}/api/orders"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(orders["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_idempotency_header_replays_same_order() {
        let (base, _db) = spawn_app().await;
        let client = reqwest::Client::new();

        let mut ids = Vec::new();
        for _ in 0..2 {
            let resp = client
                .post(format!("{base}/api/orders"))
                .header("X-Idempotency-Key", "terminal-7-sale-1")
                .json(&order_body(1))
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), 201);
            let body: serde_json::Value = resp.json().await.unwrap();
            ids.push(body["data"]["id"].as_i64().unwrap());
        }
        assert_eq!(ids[0], ids[1]);

        // Stock moved once: 5 - 1.
        let products: serde_json::Value = client
            .get(format!("{base}/api/products"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(products["data"][0]["active_variants"][0]["stock_level"], 4);
    }

    #[tokio::test]
    async fn test_insufficient_stock_is_422_naming_the_sku() {
        let (base, _db) = spawn_app().await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/api/orders"))
            .json(&order_body(99))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 422);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("WID-A"));
    }

    #[tokio::test]
    async fn test_oversized_idempotency_key_is_422() {
        let (base, _db) = spawn_app().await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/api/orders"))
            .header("X-Idempotency-Key", "k".repeat(121))
            .json(&order_body(1))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 422);
    }

    #[tokio::test]
    async fn test_health() {
        let (base, _db) = spawn_app().await;

        let resp = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "up");
    }
}
