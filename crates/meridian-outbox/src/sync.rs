//! # Sync Runner
//!
//! Replays the outbox against the server API and refreshes the local
//! caches.
//!
//! ## Replay Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       SyncRunner::sync_once                             │
//! │                                                                         │
//! │  1. Single-flight: try_lock; a second concurrent run is refused         │
//! │  2. Batch: oldest 100 pending entries, FIFO                             │
//! │  3. Per entry: POST /api/orders                                         │
//! │       headers: X-Idempotency-Key: <key minted at queue time>            │
//! │       2xx              ──► delete entry, cache the server's order       │
//! │       HTTP err/timeout ──► retries += 1; at 10 ──► dead; next entry     │
//! │       conn refused     ──► stop the run; no retry burned                │
//! │  4. Refresh: GET /api/products, GET /api/orders into the caches         │
//! │  5. Watermark: last_sync_at = now, when anything was pushed             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Losing connectivity mid-run is safe at every point: an entry acknowledged
//! by the server but not yet deleted locally is replayed next run, and the
//! server's idempotency index returns the original order without moving
//! stock.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use meridian_core::{CachedOrder, CachedProduct, OrderDraft, OutboxStatus};

use crate::error::{OutboxError, OutboxResult};
use crate::store::OfflineStore;

// =============================================================================
// Constants
// =============================================================================

/// Entries replayed per sync run.
const SYNC_BATCH_SIZE: i64 = 100;

/// Per-request timeout; a slow link degrades to "offline", not a hang.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// De-duplication header the server honors.
const IDEMPOTENCY_HEADER: &str = "X-Idempotency-Key";

// =============================================================================
// Types
// =============================================================================

/// What one sync run accomplished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Entries accepted by the server this run.
    pub pushed: usize,
    /// Entries that failed but remain pending.
    pub failed: usize,
    /// Entries that went dead this run.
    pub dead: usize,
    /// Whether the catalog / order caches were refreshed.
    pub refreshed: bool,
}

/// The server wraps every response body as `{ "data": ... }`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

// =============================================================================
// Sync Runner
// =============================================================================

/// Drives outbox replay and cache refresh against one server.
#[derive(Clone)]
pub struct SyncRunner {
    store: OfflineStore,
    client: reqwest::Client,
    base_url: String,
    in_flight: Arc<Mutex<()>>,
}

impl SyncRunner {
    /// Creates a runner for the server at `base_url` (no trailing slash).
    pub fn new(store: OfflineStore, base_url: impl Into<String>) -> OutboxResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(SyncRunner {
            store,
            client,
            base_url: base_url.into(),
            in_flight: Arc::new(Mutex::new(())),
        })
    }

    /// Runs one full sync pass. Refuses to overlap with another run on the
    /// same runner (or a clone of it).
    pub async fn sync_once(&self) -> OutboxResult<SyncReport> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| OutboxError::SyncInProgress)?;

        let mut report = SyncReport::default();

        let batch = self.store.pending_batch(SYNC_BATCH_SIZE).await?;
        if !batch.is_empty() {
            info!(count = batch.len(), "Replaying outbox batch");
        }

        for entry in batch {
            let draft: OrderDraft = match serde_json::from_str(&entry.payload) {
                Ok(draft) => draft,
                Err(err) => {
                    // Corrupt payload can never sync; burn its retries.
                    let status = self
                        .store
                        .record_failure(entry.id, &format!("corrupt payload: {err}"))
                        .await?;
                    count_failure(&mut report, status);
                    continue;
                }
            };

            let response = self
                .client
                .post(format!("{}/api/orders", self.base_url))
                .header(IDEMPOTENCY_HEADER, &draft.idempotency_key)
                .json(&draft)
                .send()
                .await;

            match response {
                Err(err) if err.is_connect() => {
                    // Connection refused proves the request never reached
                    // the server. Stop the run and leave everything pending
                    // for the next attempt.
                    debug!(entry_id = entry.id, "Server unreachable, stopping replay");
                    return Ok(report);
                }
                Err(err) => {
                    // Timeouts and transport errors count against the
                    // entry's retry budget like any rejection; the
                    // idempotency key keeps an ambiguous attempt safe.
                    let status = self
                        .store
                        .record_failure(entry.id, &err.to_string())
                        .await?;
                    count_failure(&mut report, status);
                }
                Ok(resp) if resp.status().is_success() => {
                    match resp.json::<Envelope<CachedOrder>>().await {
                        Ok(body) => {
                            self.store.complete_entry(entry.id, &body.data).await?;
                            report.pushed += 1;
                        }
                        Err(err) => {
                            let status = self
                                .store
                                .record_failure(entry.id, &format!("bad response: {err}"))
                                .await?;
                            count_failure(&mut report, status);
                        }
                    }
                }
                Ok(resp) => {
                    let http_status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    warn!(
                        entry_id = entry.id,
                        status = %http_status,
                        "Server rejected outbox entry"
                    );
                    let status = self
                        .store
                        .record_failure(entry.id, &format!("HTTP {http_status}: {body}"))
                        .await?;
                    count_failure(&mut report, status);
                }
            }
        }

        match self.refresh_caches().await {
            Ok(()) => report.refreshed = true,
            Err(err) => warn!(%err, "Cache refresh failed"),
        }

        if report.pushed > 0 {
            self.store.set_last_sync_at(chrono::Utc::now()).await?;
        }

        info!(
            pushed = report.pushed,
            failed = report.failed,
            dead = report.dead,
            refreshed = report.refreshed,
            "Sync run complete"
        );
        Ok(report)
    }

    /// Pulls the catalog and recent orders into the local caches.
    async fn refresh_caches(&self) -> OutboxResult<()> {
        let products: Envelope<Vec<CachedProduct>> = self
            .client
            .get(format!("{}/api/products", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        self.store.cache_products(&products.data).await?;

        let orders: Envelope<Vec<CachedOrder>> = self
            .client
            .get(format!("{}/api/orders", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        self.store.cache_orders(&orders.data).await?;

        Ok(())
    }
}

fn count_failure(report: &mut SyncReport, status: OutboxStatus) {
    match status {
        OutboxStatus::Dead => report.dead += 1,
        OutboxStatus::Pending => report.failed += 1,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use meridian_core::{CachedVariant, OrderLine, PENDING_SYNC_STATUS};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

    use crate::store::MAX_RETRIES;

    #[derive(Default)]
    struct StubState {
        /// Idempotency keys seen by the order endpoint, in arrival order.
        keys: std::sync::Mutex<Vec<String>>,
        next_id: AtomicI64,
        reject: AtomicBool,
    }

    async fn stub_create_order(
        State(state): State<Arc<StubState>>,
        headers: HeaderMap,
        Json(draft): Json<OrderDraft>,
    ) -> impl IntoResponse {
        let key = headers
            .get(IDEMPOTENCY_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert_eq!(key, draft.idempotency_key);
        state.keys.lock().unwrap().push(key);

        if state.reject.load(Ordering::SeqCst) {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": "Insufficient stock for WID-A" })),
            );
        }

        let id = 500 + state.next_id.fetch_add(1, Ordering::SeqCst);
        (
            StatusCode::CREATED,
            Json(json!({
                "data": {
                    "id": id,
                    "status": "pending",
                    "total_amount_cents": 1000,
                    "created_at": chrono::Utc::now(),
                }
            })),
        )
    }

    async fn spawn_stub(state: Arc<StubState>) -> String {
        let app = Router::new()
            .route(
                "/api/orders",
                post(stub_create_order).get(|| async { Json(json!({ "data": [] })) }),
            )
            .route("/api/products", get(|| async { Json(json!({ "data": [] })) }))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn store_with_queued_sale() -> OfflineStore {
        let store = OfflineStore::in_memory().await.unwrap();
        store
            .cache_products(&[CachedProduct {
                id: 1,
                shop_id: 1,
                sku: "WID".into(),
                name: "Widget".into(),
                active_variants: vec![CachedVariant {
                    id: 10,
                    product_id: 1,
                    sku: "WID-A".into(),
                    price_cents: 1_000,
                    stock_level: 5,
                    is_active: true,
                }],
            }])
            .await
            .unwrap();
        store
            .queue_order(
                &[OrderLine {
                    variant_id: 10,
                    quantity: 1,
                }],
                None,
                None,
                None,
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_replay_pushes_and_swaps_order() {
        let state = Arc::new(StubState::default());
        let base_url = spawn_stub(state.clone()).await;
        let store = store_with_queued_sale().await;

        let runner = SyncRunner::new(store.clone(), base_url).unwrap();
        let report = runner.sync_once().await.unwrap();

        assert_eq!(report.pushed, 1);
        assert_eq!(report.failed, 0);
        assert!(report.refreshed);

        // The synthetic order was replaced by the server's.
        let orders = store.orders().await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].id, 500);
        assert_ne!(orders[0].status, PENDING_SYNC_STATUS);

        assert!(store.last_sync_at().await.unwrap().is_some());
        assert_eq!(state.keys.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replay_retries_carry_the_same_key() {
        let state = Arc::new(StubState::default());
        state.reject.store(true, Ordering::SeqCst);
        let base_url = spawn_stub(state.clone()).await;
        let store = store_with_queued_sale().await;

        let runner = SyncRunner::new(store.clone(), base_url).unwrap();

        let report = runner.sync_once().await.unwrap();
        assert_eq!(report.failed, 1);
        let report = runner.sync_once().await.unwrap();
        assert_eq!(report.failed, 1);

        // Both attempts replayed the identical key.
        let keys = state.keys.lock().unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0], keys[1]);

        // Entry still pending with two recorded attempts.
        let batch = store.pending_batch(10).await.unwrap();
        assert_eq!(batch[0].retries, 2);
        assert!(batch[0]
            .last_error
            .as_deref()
            .unwrap()
            .starts_with("HTTP 422"));
    }

    #[tokio::test]
    async fn test_unreachable_server_burns_no_retries() {
        let store = store_with_queued_sale().await;

        // Nothing listens here; the connection is refused outright.
        let runner = SyncRunner::new(store.clone(), "http://127.0.0.1:1").unwrap();
        let report = runner.sync_once().await.unwrap();

        assert_eq!(report, SyncReport::default());
        let batch = store.pending_batch(10).await.unwrap();
        assert_eq!(batch[0].retries, 0);
        // The watermark only advances on runs that push something.
        assert!(store.last_sync_at().await.unwrap().is_none());
    }

    /// Accepts connections and then never answers, so every request times
    /// out at the client.
    async fn spawn_black_hole() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                if let Ok((socket, _)) = listener.accept().await {
                    held.push(socket);
                }
            }
        });
        format!("http://{addr}")
    }

    fn short_timeout_runner(store: OfflineStore, base_url: String) -> SyncRunner {
        SyncRunner {
            store,
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(200))
                .build()
                .unwrap(),
            base_url,
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    #[tokio::test]
    async fn test_timed_out_attempts_count_toward_dead_letter() {
        let store = store_with_queued_sale().await;
        let base_url = spawn_black_hole().await;
        let runner = short_timeout_runner(store.clone(), base_url);

        let report = runner.sync_once().await.unwrap();
        assert_eq!(report.failed, 1);

        let batch = store.pending_batch(10).await.unwrap();
        assert_eq!(batch[0].retries, 1);
        assert!(batch[0].last_error.is_some());

        // Timeouts keep counting; at the budget the entry goes dead and
        // the operator can see it.
        for _ in 1..MAX_RETRIES {
            runner.sync_once().await.unwrap();
        }
        assert!(store.pending_batch(10).await.unwrap().is_empty());
        let dead = store.dead_entries().await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].retries, MAX_RETRIES);
    }

    #[tokio::test]
    async fn test_watermark_stays_put_when_nothing_pushed() {
        let state = Arc::new(StubState::default());
        let base_url = spawn_stub(state.clone()).await;
        let store = OfflineStore::in_memory().await.unwrap();

        // Empty outbox: the run reaches the server and refreshes, but
        // pushes nothing.
        let runner = SyncRunner::new(store.clone(), base_url).unwrap();
        let report = runner.sync_once().await.unwrap();

        assert_eq!(report.pushed, 0);
        assert!(report.refreshed);
        assert!(store.last_sync_at().await.unwrap().is_none());
    }
}
