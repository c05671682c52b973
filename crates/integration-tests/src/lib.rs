//! Integration tests for Stockroom.
//!
//! # Running Tests
//!
//! ```bash
//! # In-process HTTP and concurrency tests (in-memory store)
//! cargo test -p stockroom-integration-tests
//!
//! # PostgreSQL store tests (needs a migrated database)
//! STOCKROOM_TEST_DATABASE_URL=postgres://... \
//!     cargo test -p stockroom-integration-tests --test postgres_store -- --ignored --test-threads=1
//! ```
//!
//! # Test Categories
//!
//! - `http_api` - Every route through the full middleware stack
//! - `reservation` - Oversell, rollback and timeout behavior under faults
//! - `postgres_store` - `PgStore` against a real database

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use futures::future::BoxFuture;
use serde_json::Value;
use tower::ServiceExt;

use stockroom_core::{OrderId, ProductId};
use stockroom_server::config::InventoryConfig;
use stockroom_server::db::seed::default_catalog;
use stockroom_server::db::{InMemoryStore, OrderStore, ProductStore, QuantityUpdate, RepositoryError};
use stockroom_server::models::{NewOrderRecord, NewProduct, Order, Product};
use stockroom_server::{AppState, app};

/// Store timeout used by test applications.
pub const TEST_TIMEOUT: Duration = Duration::from_millis(200);

// =============================================================================
// Fault injection
// =============================================================================

/// In-memory store with switchable failures.
#[derive(Default)]
pub struct FaultyStore {
    inner: InMemoryStore,
    fail_order_inserts: AtomicBool,
    fail_restocks: AtomicBool,
    /// Product whose quantity writes hang (0 = none).
    stalled_product: AtomicI32,
    /// Product drained by a competing buyer on its next write (0 = none).
    drained_product: AtomicI32,
    drained_to: AtomicI32,
}

impl FaultyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `insert_order` fail.
    pub fn fail_order_inserts(&self, enabled: bool) {
        self.fail_order_inserts.store(enabled, Ordering::SeqCst);
    }

    /// Make every quantity increase (a rollback restock) fail.
    pub fn fail_restocks(&self, enabled: bool) {
        self.fail_restocks.store(enabled, Ordering::SeqCst);
    }

    /// Make quantity writes for `id` hang until the caller gives up.
    pub fn stall_updates_for(&self, id: Option<ProductId>) {
        self.stalled_product
            .store(id.map_or(0, |id| id.as_i32()), Ordering::SeqCst);
    }

    /// Just before the next quantity write to `id`, let another buyer take
    /// the stock down to `remaining`. Fires once.
    pub fn drain_before_next_write(&self, id: ProductId, remaining: i32) {
        self.drained_to.store(remaining, Ordering::SeqCst);
        self.drained_product.store(id.as_i32(), Ordering::SeqCst);
    }

    /// Stored quantity of a product, bypassing every fault.
    ///
    /// # Panics
    ///
    /// Panics if the product does not exist.
    pub async fn quantity(&self, id: i32) -> i32 {
        self.inner
            .find_product(ProductId::new(id))
            .await
            .ok()
            .flatten()
            .map(|product| product.available_quantity)
            .unwrap_or_else(|| panic!("product {id} missing"))
    }

    pub async fn order_count(&self) -> usize {
        self.inner.order_count().await
    }
}

impl ProductStore for FaultyStore {
    fn ping(&self) -> BoxFuture<'_, Result<(), RepositoryError>> {
        self.inner.ping()
    }

    fn list_products(&self) -> BoxFuture<'_, Result<Vec<Product>, RepositoryError>> {
        self.inner.list_products()
    }

    fn find_product(
        &self,
        id: ProductId,
    ) -> BoxFuture<'_, Result<Option<Product>, RepositoryError>> {
        self.inner.find_product(id)
    }

    fn update_quantity(
        &self,
        id: ProductId,
        expected: i32,
        new: i32,
    ) -> BoxFuture<'_, Result<QuantityUpdate, RepositoryError>> {
        Box::pin(async move {
            if self.stalled_product.load(Ordering::SeqCst) == id.as_i32() {
                futures::future::pending::<()>().await;
            }
            if self
                .drained_product
                .compare_exchange(id.as_i32(), 0, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                let remaining = self.drained_to.load(Ordering::SeqCst);
                self.inner.set_quantity(id, remaining).await?;
            }
            if new > expected && self.fail_restocks.load(Ordering::SeqCst) {
                return Err(RepositoryError::Conflict(format!(
                    "product {id}: restock rejected"
                )));
            }
            self.inner.update_quantity(id, expected, new).await
        })
    }

    fn set_quantity(
        &self,
        id: ProductId,
        quantity: i32,
    ) -> BoxFuture<'_, Result<Option<Product>, RepositoryError>> {
        self.inner.set_quantity(id, quantity)
    }

    fn insert_products(
        &self,
        products: Vec<NewProduct>,
    ) -> BoxFuture<'_, Result<Vec<Product>, RepositoryError>> {
        self.inner.insert_products(products)
    }
}

impl OrderStore for FaultyStore {
    fn insert_order(&self, order: NewOrderRecord) -> BoxFuture<'_, Result<Order, RepositoryError>> {
        if self.fail_order_inserts.load(Ordering::SeqCst) {
            return Box::pin(async {
                Err(RepositoryError::Conflict("order table unavailable".to_string()))
            });
        }
        self.inner.insert_order(order)
    }

    fn find_orders(
        &self,
        offset: u32,
        limit: u32,
    ) -> BoxFuture<'_, Result<(Vec<Order>, u64), RepositoryError>> {
        self.inner.find_orders(offset, limit)
    }

    fn find_order(&self, id: OrderId) -> BoxFuture<'_, Result<Option<Order>, RepositoryError>> {
        self.inner.find_order(id)
    }
}

// =============================================================================
// Test application
// =============================================================================

/// A fully wired application over a [`FaultyStore`] seeded with the default
/// catalog.
pub struct TestApp {
    pub store: Arc<FaultyStore>,
    pub state: AppState,
    router: Router,
}

impl TestApp {
    /// Application with the default catalog.
    ///
    /// # Panics
    ///
    /// Panics if seeding the in-memory store fails.
    pub async fn seeded() -> Self {
        let app = Self::empty();
        app.store
            .insert_products(default_catalog())
            .await
            .expect("Failed to seed catalog");
        app
    }

    /// Application with no products.
    #[must_use]
    pub fn empty() -> Self {
        let store = Arc::new(FaultyStore::new());
        let config = InventoryConfig {
            store_timeout: TEST_TIMEOUT,
            ..InventoryConfig::default()
        };
        let state = AppState::new(config, store.clone(), store.clone());
        let router = app(state.clone());

        Self {
            store,
            state,
            router,
        }
    }

    /// Send a request through the whole stack and decode the JSON body.
    ///
    /// Non-JSON bodies (e.g. `/health`) are returned as a JSON string.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built or the body cannot be read.
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        self.send(request).await
    }

    /// Send a prebuilt request.
    ///
    /// # Panics
    ///
    /// Panics if the body cannot be read.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Router is infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let json = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn put(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, None).await
    }
}

/// JSON body for `POST /orders` shipping to a fixed address.
#[must_use]
pub fn order_body(items: &[(i32, i32)]) -> Value {
    let items: Vec<Value> = items
        .iter()
        .map(|&(product_id, bought_quantity)| {
            serde_json::json!({ "product_id": product_id, "bought_quantity": bought_quantity })
        })
        .collect();

    serde_json::json!({
        "items": items,
        "user_address": {
            "city": "Lisbon",
            "country": "Portugal",
            "zip_code": "1100-148",
        },
    })
}
