//! Persistent store for products and orders.
//!
//! # Stores
//!
//! The services only see the [`ProductStore`] and [`OrderStore`] traits. Two
//! implementations exist:
//!
//! - [`PgStore`] - `PostgreSQL` via sqlx (production)
//! - [`InMemoryStore`] - process-local maps (tests, local development)
//!
//! # Database
//!
//! ## Tables
//!
//! - `product` - Catalog with stock levels (`CHECK (available_quantity >= 0)`)
//! - `customer_order` - Order header (timestamp, total, delivery address)
//! - `order_item` - Order lines with the unit price captured at reservation
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p stockroom-cli -- migrate
//! ```

pub mod memory;
pub mod orders;
pub mod products;
pub mod seed;

use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use stockroom_core::{OrderId, ProductId};

use crate::models::{NewOrderRecord, NewProduct, Order, Product};

pub use memory::InMemoryStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Constraint violation or lost compare-and-set race.
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// The store did not answer within the configured bound.
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

/// Outcome of a conditional quantity update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuantityUpdate {
    /// The stored quantity matched and was replaced.
    Updated(Product),
    /// The product exists but its stored quantity differs from the expected one.
    Conflict,
    /// No such product.
    Missing,
}

/// Product persistence.
///
/// Methods return boxed futures so the trait stays dyn-compatible
/// (`Arc<dyn ProductStore>`).
pub trait ProductStore: Send + Sync {
    /// Cheap connectivity check.
    fn ping(&self) -> BoxFuture<'_, Result<(), RepositoryError>>;

    /// All products ordered by ID.
    fn list_products(&self) -> BoxFuture<'_, Result<Vec<Product>, RepositoryError>>;

    /// Point read.
    fn find_product(&self, id: ProductId)
    -> BoxFuture<'_, Result<Option<Product>, RepositoryError>>;

    /// Set `available_quantity` to `new` only if it currently equals `expected`.
    fn update_quantity(
        &self,
        id: ProductId,
        expected: i32,
        new: i32,
    ) -> BoxFuture<'_, Result<QuantityUpdate, RepositoryError>>;

    /// Unconditionally set `available_quantity`.
    fn set_quantity(
        &self,
        id: ProductId,
        quantity: i32,
    ) -> BoxFuture<'_, Result<Option<Product>, RepositoryError>>;

    /// Insert products, returning them with their assigned IDs.
    fn insert_products(
        &self,
        products: Vec<NewProduct>,
    ) -> BoxFuture<'_, Result<Vec<Product>, RepositoryError>>;
}

/// Order persistence. Orders are append-only.
pub trait OrderStore: Send + Sync {
    /// Persist an order and its lines atomically.
    fn insert_order(&self, order: NewOrderRecord) -> BoxFuture<'_, Result<Order, RepositoryError>>;

    /// A page of orders, most recent first, plus the total order count.
    fn find_orders(
        &self,
        offset: u32,
        limit: u32,
    ) -> BoxFuture<'_, Result<(Vec<Order>, u64), RepositoryError>>;

    /// Point read.
    fn find_order(&self, id: OrderId) -> BoxFuture<'_, Result<Option<Order>, RepositoryError>>;
}

/// Run a store call with an upper time bound.
///
/// # Errors
///
/// Returns `RepositoryError::Timeout` if `fut` does not finish within
/// `limit`, or the call's own error.
pub async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, RepositoryError>
where
    F: Future<Output = Result<T, RepositoryError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| RepositoryError::Timeout(limit))?
}

/// `PostgreSQL`-backed store implementing both [`ProductStore`] and [`OrderStore`].
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_times_out() {
        let limit = Duration::from_millis(10);
        let result: Result<(), _> = bounded(limit, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(RepositoryError::Timeout(d)) if d == limit));
    }

    #[tokio::test]
    async fn test_bounded_passes_through() {
        let result = bounded(Duration::from_secs(1), async { Ok::<_, RepositoryError>(7) }).await;
        assert!(matches!(result, Ok(7)));

        let result: Result<(), _> = bounded(Duration::from_secs(1), async {
            Err(RepositoryError::Conflict("taken".to_string()))
        })
        .await;
        assert!(matches!(result, Err(RepositoryError::Conflict(_))));
    }
}
