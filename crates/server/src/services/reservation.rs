//! Stock reservation and order creation.
//!
//! An order is created in three steps:
//!
//! 1. **Validate** - structure, quantities and address are checked, then the
//!    cache is asked whether every line can be satisfied. Nothing changes yet.
//! 2. **Commit** - each line's stock is deducted through the write-through
//!    cache. Every successful deduction is recorded in a [`Reservation`].
//! 3. **Persist** - the priced order is written to the store.
//!
//! If commit or persist fails, the reservation is undone in reverse order so
//! stock ends up exactly where it started. The steps run on their own task:
//! once started, an order is persisted or rolled back even if the caller
//! stops waiting for it. Validation is advisory: a
//! concurrent order may still win the race, in which case the commit step
//! fails on its own availability check and rolls back.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{Instrument, debug, error, info, instrument, warn};

use stockroom_core::{DeliveryAddress, Price, ProductId};

use super::{InventoryError, ProductCache};
use crate::db::{OrderStore, bounded};
use crate::models::{NewOrder, NewOrderItem, NewOrderRecord, Order, OrderItem};

/// Deductions applied so far for one order, in application order.
#[derive(Debug, Default)]
struct Reservation {
    deductions: Vec<(ProductId, i32)>,
}

impl Reservation {
    fn record(&mut self, product_id: ProductId, quantity: i32) {
        self.deductions.push((product_id, quantity));
    }

    /// Restore every recorded deduction, newest first.
    ///
    /// Returns the products whose stock could not be restored.
    async fn roll_back(self, cache: &ProductCache) -> Vec<ProductId> {
        let mut unrestored = Vec::new();

        for (product_id, quantity) in self.deductions.into_iter().rev() {
            match cache.restore(product_id, quantity).await {
                Ok(product) => debug!(
                    %product_id,
                    quantity,
                    available = product.available_quantity,
                    "Deduction rolled back"
                ),
                Err(e) => {
                    error!(%product_id, quantity, error = %e, "Failed to roll back deduction");
                    unrestored.push(product_id);
                }
            }
        }

        unrestored
    }
}

/// Creates orders without ever overselling or leaving partial deductions.
#[derive(Clone)]
pub struct ReservationEngine {
    cache: ProductCache,
    orders: Arc<dyn OrderStore>,
    store_timeout: Duration,
}

impl ReservationEngine {
    #[must_use]
    pub fn new(cache: ProductCache, orders: Arc<dyn OrderStore>, store_timeout: Duration) -> Self {
        Self {
            cache,
            orders,
            store_timeout,
        }
    }

    /// Validate, reserve and persist an order.
    ///
    /// On success every line's stock has been deducted and the order is
    /// durable. On failure no stock has changed, unless the rollback itself
    /// failed (`RollbackIncomplete`).
    ///
    /// # Errors
    ///
    /// - `InventoryError::InvalidInput` for malformed requests
    /// - `InventoryError::ProductNotFound` for unknown products
    /// - `InventoryError::InsufficientStock` when a line cannot be satisfied
    /// - `InventoryError::Store` when a store call fails or times out
    /// - `InventoryError::RollbackIncomplete` when compensation failed
    /// - `InventoryError::TaskFailed` if the order task panicked
    #[instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn create_order(&self, request: NewOrder) -> Result<Order, InventoryError> {
        let engine = self.clone();
        tokio::spawn(async move { engine.place_order(request).await }.in_current_span())
            .await
            .map_err(|e| {
                error!(error = %e, "Order task did not complete");
                InventoryError::TaskFailed(e.to_string())
            })?
    }

    async fn place_order(&self, request: NewOrder) -> Result<Order, InventoryError> {
        let (items, user_address) = validate(request)?;
        self.check_availability(&items).await?;

        let mut reservation = Reservation::default();
        let priced = match self.commit(&items, &mut reservation).await {
            Ok(priced) => priced,
            Err(cause) => return Err(self.abort(reservation, cause).await),
        };

        let total_amount: Price = priced.iter().map(OrderItem::line_total).sum();
        let record = NewOrderRecord {
            created_at: Utc::now(),
            items: priced,
            total_amount,
            user_address,
        };

        match bounded(self.store_timeout, self.orders.insert_order(record)).await {
            Ok(order) => {
                info!(order_id = %order.id, total = %order.total_amount, "Order created");
                Ok(order)
            }
            Err(e) => {
                warn!(error = %e, "Order could not be persisted; rolling back stock");
                Err(self.abort(reservation, e.into()).await)
            }
        }
    }

    /// Check every line against the cache, aggregating repeated products.
    async fn check_availability(&self, items: &[NewOrderItem]) -> Result<(), InventoryError> {
        let mut requested: BTreeMap<ProductId, i64> = BTreeMap::new();
        for item in items {
            *requested.entry(item.product_id).or_default() += i64::from(item.bought_quantity);
        }

        for (product_id, quantity) in requested {
            let product = self.cache.get(product_id).await?;
            let available = i64::from(product.available_quantity);
            if available < quantity {
                return Err(InventoryError::InsufficientStock {
                    product_id,
                    requested: quantity,
                    available,
                });
            }
        }
        Ok(())
    }

    /// Deduct each line, pricing it from the product row the deduction returned.
    async fn commit(
        &self,
        items: &[NewOrderItem],
        reservation: &mut Reservation,
    ) -> Result<Vec<OrderItem>, InventoryError> {
        let mut priced = Vec::with_capacity(items.len());
        for item in items {
            let product = self
                .cache
                .try_deduct(item.product_id, item.bought_quantity)
                .await?;
            reservation.record(item.product_id, item.bought_quantity);
            priced.push(OrderItem {
                product_id: item.product_id,
                bought_quantity: item.bought_quantity,
                unit_price: product.price,
            });
        }
        Ok(priced)
    }

    async fn abort(&self, reservation: Reservation, cause: InventoryError) -> InventoryError {
        let unrestored = reservation.roll_back(&self.cache).await;
        if unrestored.is_empty() {
            return cause;
        }

        error!(
            error = %cause,
            unrestored = ?unrestored,
            "Rollback incomplete; stock for these products is short"
        );
        InventoryError::RollbackIncomplete {
            cause: Box::new(cause),
            unrestored,
        }
    }
}

/// Structural validation. Touches neither cache nor store.
fn validate(request: NewOrder) -> Result<(Vec<NewOrderItem>, DeliveryAddress), InventoryError> {
    if request.items.is_empty() {
        return Err(InventoryError::InvalidInput(
            "order must contain at least one item".to_string(),
        ));
    }

    for (index, item) in request.items.iter().enumerate() {
        if !item.product_id.is_valid() {
            return Err(InventoryError::InvalidInput(format!(
                "item {index}: malformed product id {}",
                item.product_id
            )));
        }
        if item.bought_quantity <= 0 {
            return Err(InventoryError::InvalidInput(format!(
                "item {index}: bought_quantity must be positive, got {}",
                item.bought_quantity
            )));
        }
    }

    let user_address = request.user_address.normalized()?;
    Ok((request.items, user_address))
}
