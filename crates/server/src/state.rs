//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::InventoryConfig;
use crate::db::{OrderStore, ProductStore};
use crate::services::{ProductCache, QueryService, ReservationEngine};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. It owns the one product cache
/// of the process; every service below shares it.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: InventoryConfig,
    products: Arc<dyn ProductStore>,
    cache: ProductCache,
    reservations: ReservationEngine,
    queries: QueryService,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Inventory and query tuning
    /// * `products` - Product store backing the cache
    /// * `orders` - Order store
    #[must_use]
    pub fn new(
        config: InventoryConfig,
        products: Arc<dyn ProductStore>,
        orders: Arc<dyn OrderStore>,
    ) -> Self {
        let cache = ProductCache::new(Arc::clone(&products), config.store_timeout);
        let reservations =
            ReservationEngine::new(cache.clone(), Arc::clone(&orders), config.store_timeout);
        let queries = QueryService::new(cache.clone(), orders, config);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                products,
                cache,
                reservations,
                queries,
            }),
        }
    }

    /// Get a reference to the inventory configuration.
    #[must_use]
    pub fn config(&self) -> &InventoryConfig {
        &self.inner.config
    }

    /// Get a reference to the product store (used for readiness checks).
    #[must_use]
    pub fn products(&self) -> &dyn ProductStore {
        self.inner.products.as_ref()
    }

    /// Get a reference to the product cache.
    #[must_use]
    pub fn cache(&self) -> &ProductCache {
        &self.inner.cache
    }

    /// Get a reference to the reservation engine.
    #[must_use]
    pub fn reservations(&self) -> &ReservationEngine {
        &self.inner.reservations
    }

    /// Get a reference to the query service.
    #[must_use]
    pub fn queries(&self) -> &QueryService {
        &self.inner.queries
    }
}
