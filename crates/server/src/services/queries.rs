//! Read-only catalog and order queries.

use std::sync::Arc;

use tracing::instrument;

use stockroom_core::OrderId;

use super::{InventoryError, ProductCache};
use crate::config::InventoryConfig;
use crate::db::{OrderStore, bounded};
use crate::models::{Order, OrderPage, Pagination, Product};

/// Serves product listings from the cache and orders from the store.
#[derive(Clone)]
pub struct QueryService {
    cache: ProductCache,
    orders: Arc<dyn OrderStore>,
    config: InventoryConfig,
}

impl QueryService {
    #[must_use]
    pub fn new(cache: ProductCache, orders: Arc<dyn OrderStore>, config: InventoryConfig) -> Self {
        Self {
            cache,
            orders,
            config,
        }
    }

    /// The whole catalog, ordered by product ID.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::EmptyCatalog` if there are no products, or
    /// `InventoryError::Store` if the cache cannot be hydrated.
    pub async fn list_products(&self) -> Result<Vec<Product>, InventoryError> {
        let products = self.cache.all().await?;
        if products.is_empty() {
            return Err(InventoryError::EmptyCatalog);
        }
        Ok(products)
    }

    /// One page of orders, most recent first.
    ///
    /// `limit` defaults to the configured page size and is capped at the
    /// configured maximum; `offset` defaults to zero. An offset past the end
    /// yields an empty page with accurate pagination metadata.
    ///
    /// # Errors
    ///
    /// - `InventoryError::InvalidInput` if `limit` is zero
    /// - `InventoryError::NoOrders` if no order exists at all
    /// - `InventoryError::Store` if the store fails or times out
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<OrderPage, InventoryError> {
        let limit = match limit {
            None => self.config.default_page_size,
            Some(0) => {
                return Err(InventoryError::InvalidInput(
                    "limit must be at least 1".to_string(),
                ));
            }
            Some(limit) => limit.min(self.config.max_page_size),
        };
        let offset = offset.unwrap_or(0);

        let (orders, total) = bounded(
            self.config.store_timeout,
            self.orders.find_orders(offset, limit),
        )
        .await?;
        if total == 0 {
            return Err(InventoryError::NoOrders);
        }

        Ok(OrderPage {
            orders,
            pagination: Pagination::new(total, limit, offset),
        })
    }

    /// Look up one order by its raw path identifier.
    ///
    /// # Errors
    ///
    /// - `InventoryError::InvalidInput` if `raw_id` is not a valid order ID
    /// - `InventoryError::OrderNotFound` if no such order exists
    /// - `InventoryError::Store` if the store fails or times out
    #[instrument(skip(self))]
    pub async fn get_order(&self, raw_id: &str) -> Result<Order, InventoryError> {
        let id: OrderId = raw_id.parse()?;
        bounded(self.config.store_timeout, self.orders.find_order(id))
            .await?
            .ok_or(InventoryError::OrderNotFound(id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use futures::future::BoxFuture;
    use stockroom_core::{DeliveryAddress, Price, ProductId};

    use super::*;
    use crate::db::seed::default_catalog;
    use crate::db::{InMemoryStore, ProductStore, RepositoryError};
    use crate::models::{NewOrderRecord, OrderItem};

    fn service(store: &Arc<InMemoryStore>) -> QueryService {
        let config = InventoryConfig::default();
        let cache = ProductCache::new(store.clone(), config.store_timeout);
        QueryService::new(cache, store.clone(), config)
    }

    async fn place_orders(store: &InMemoryStore, count: i64) {
        for minutes in 0..count {
            store
                .insert_order(NewOrderRecord {
                    created_at: Utc::now() - chrono::Duration::minutes(count - minutes),
                    items: vec![OrderItem {
                        product_id: ProductId::new(1),
                        bought_quantity: 1,
                        unit_price: Price::from_cents(1999),
                    }],
                    total_amount: Price::from_cents(1999),
                    user_address: DeliveryAddress::new("Oslo", "Norway", "0150"),
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_list_products() {
        let store = Arc::new(InMemoryStore::new());
        let queries = service(&store);
        assert!(matches!(
            queries.list_products().await,
            Err(InventoryError::EmptyCatalog)
        ));

        store.insert_products(default_catalog()).await.unwrap();
        let products = queries.list_products().await.unwrap();
        assert_eq!(products.len(), 10);
        assert_eq!(products[0].name, "Product 1");
    }

    #[tokio::test]
    async fn test_list_orders_pages() {
        let store = Arc::new(InMemoryStore::new());
        let queries = service(&store);
        place_orders(&store, 12).await;

        let first = queries.list_orders(None, None).await.unwrap();
        assert_eq!(first.orders.len(), 10);
        assert_eq!(first.pagination.total, 12);
        assert!(first.pagination.has_next);
        assert!(!first.pagination.has_previous);
        assert_eq!(first.orders[0].id.as_i32(), 12);

        let second = queries.list_orders(Some(10), Some(10)).await.unwrap();
        assert_eq!(second.orders.len(), 2);
        assert!(!second.pagination.has_next);
        assert!(second.pagination.has_previous);
    }

    #[tokio::test]
    async fn test_list_orders_limits() {
        let store = Arc::new(InMemoryStore::new());
        let queries = service(&store);

        assert!(matches!(
            queries.list_orders(None, None).await,
            Err(InventoryError::NoOrders)
        ));

        place_orders(&store, 3).await;
        assert!(matches!(
            queries.list_orders(Some(0), None).await,
            Err(InventoryError::InvalidInput(_))
        ));

        let capped = queries.list_orders(Some(500), None).await.unwrap();
        assert_eq!(capped.pagination.limit, 50);
        assert_eq!(capped.orders.len(), 3);

        let past_end = queries.list_orders(Some(10), Some(40)).await.unwrap();
        assert!(past_end.orders.is_empty());
        assert_eq!(past_end.pagination.total, 3);
        assert!(!past_end.pagination.has_next);
    }

    #[tokio::test]
    async fn test_get_order() {
        let store = Arc::new(InMemoryStore::new());
        let queries = service(&store);
        place_orders(&store, 2).await;

        let order = queries.get_order("2").await.unwrap();
        assert_eq!(order.id.as_i32(), 2);

        assert!(matches!(
            queries.get_order("7").await,
            Err(InventoryError::OrderNotFound(id)) if id.as_i32() == 7
        ));
        assert!(matches!(
            queries.get_order("not-an-id").await,
            Err(InventoryError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_store_timeout_surfaces() {
        let store = Arc::new(InMemoryStore::new());
        let config = InventoryConfig {
            store_timeout: Duration::from_millis(20),
            ..InventoryConfig::default()
        };
        let cache = ProductCache::new(store.clone(), config.store_timeout);
        let queries = QueryService::new(cache, Arc::new(SlowOrders), config);

        assert!(matches!(
            queries.get_order("1").await,
            Err(InventoryError::Store(RepositoryError::Timeout(_)))
        ));
    }

    struct SlowOrders;

    impl OrderStore for SlowOrders {
        fn insert_order(
            &self,
            _order: NewOrderRecord,
        ) -> BoxFuture<'_, Result<Order, RepositoryError>> {
            Box::pin(futures::future::pending())
        }

        fn find_orders(
            &self,
            _offset: u32,
            _limit: u32,
        ) -> BoxFuture<'_, Result<(Vec<Order>, u64), RepositoryError>>
        {
            Box::pin(futures::future::pending())
        }

        fn find_order(
            &self,
            _id: OrderId,
        ) -> BoxFuture<'_, Result<Option<Order>, RepositoryError>>
        {
            Box::pin(futures::future::pending())
        }
    }
}
