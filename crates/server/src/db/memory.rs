//! In-memory store for tests and local development.
//!
//! Mirrors the `PostgreSQL` semantics that the services rely on: conditional
//! quantity updates, store-assigned IDs, and most-recent-first order listing.
//! Everything lives behind one async lock, so every call is atomic.

use std::collections::BTreeMap;
use std::fmt::Display;

use futures::future::BoxFuture;
use tokio::sync::RwLock;

use stockroom_core::{OrderId, ProductId};

use super::{OrderStore, ProductStore, QuantityUpdate, RepositoryError};
use crate::models::{NewOrderRecord, NewProduct, Order, Product};

#[derive(Debug, Default)]
struct Tables {
    products: BTreeMap<ProductId, Product>,
    orders: BTreeMap<OrderId, Order>,
    next_product_id: i32,
    next_order_id: i32,
}

/// Process-local store implementing [`ProductStore`] and [`OrderStore`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted orders.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }
}

fn check_quantity(product: impl Display, quantity: i32) -> Result<(), RepositoryError> {
    if quantity < 0 {
        return Err(RepositoryError::Conflict(format!(
            "product {product}: quantity {quantity} violates stock constraint"
        )));
    }
    Ok(())
}

impl ProductStore for InMemoryStore {
    fn ping(&self) -> BoxFuture<'_, Result<(), RepositoryError>> {
        Box::pin(async { Ok(()) })
    }

    fn list_products(&self) -> BoxFuture<'_, Result<Vec<Product>, RepositoryError>> {
        Box::pin(async move { Ok(self.tables.read().await.products.values().cloned().collect()) })
    }

    fn find_product(
        &self,
        id: ProductId,
    ) -> BoxFuture<'_, Result<Option<Product>, RepositoryError>> {
        Box::pin(async move { Ok(self.tables.read().await.products.get(&id).cloned()) })
    }

    fn update_quantity(
        &self,
        id: ProductId,
        expected: i32,
        new: i32,
    ) -> BoxFuture<'_, Result<QuantityUpdate, RepositoryError>> {
        Box::pin(async move {
            check_quantity(id, new)?;
            let mut tables = self.tables.write().await;
            let Some(product) = tables.products.get_mut(&id) else {
                return Ok(QuantityUpdate::Missing);
            };
            if product.available_quantity != expected {
                return Ok(QuantityUpdate::Conflict);
            }
            product.available_quantity = new;
            Ok(QuantityUpdate::Updated(product.clone()))
        })
    }

    fn set_quantity(
        &self,
        id: ProductId,
        quantity: i32,
    ) -> BoxFuture<'_, Result<Option<Product>, RepositoryError>> {
        Box::pin(async move {
            check_quantity(id, quantity)?;
            let mut tables = self.tables.write().await;
            Ok(tables.products.get_mut(&id).map(|product| {
                product.available_quantity = quantity;
                product.clone()
            }))
        })
    }

    fn insert_products(
        &self,
        products: Vec<NewProduct>,
    ) -> BoxFuture<'_, Result<Vec<Product>, RepositoryError>> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            for product in &products {
                check_quantity(format_args!("'{}'", product.name), product.available_quantity)?;
                if tables.products.values().any(|p| p.name == product.name) {
                    return Err(RepositoryError::Conflict(format!(
                        "product '{}' already exists",
                        product.name
                    )));
                }
            }

            let mut inserted = Vec::with_capacity(products.len());
            for product in products {
                tables.next_product_id += 1;
                let stored = Product {
                    id: ProductId::new(tables.next_product_id),
                    name: product.name,
                    price: product.price,
                    available_quantity: product.available_quantity,
                };
                tables.products.insert(stored.id, stored.clone());
                inserted.push(stored);
            }
            Ok(inserted)
        })
    }
}

impl OrderStore for InMemoryStore {
    fn insert_order(&self, order: NewOrderRecord) -> BoxFuture<'_, Result<Order, RepositoryError>> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            tables.next_order_id += 1;
            let order = order.into_order(OrderId::new(tables.next_order_id));
            tables.orders.insert(order.id, order.clone());
            Ok(order)
        })
    }

    fn find_orders(
        &self,
        offset: u32,
        limit: u32,
    ) -> BoxFuture<'_, Result<(Vec<Order>, u64), RepositoryError>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            let mut orders: Vec<&Order> = tables.orders.values().collect();
            orders.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

            let page = orders
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .cloned()
                .collect();
            Ok((page, tables.orders.len() as u64))
        })
    }

    fn find_order(&self, id: OrderId) -> BoxFuture<'_, Result<Option<Order>, RepositoryError>> {
        Box::pin(async move { Ok(self.tables.read().await.orders.get(&id).cloned()) })
    }
}
