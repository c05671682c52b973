//! Order domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DeliveryAddress, OrderId, Price, ProductId};

/// One line of a persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Product that was bought.
    pub product_id: ProductId,
    /// Units bought, always positive.
    pub bought_quantity: i32,
    /// Product price at the moment the stock was reserved.
    pub unit_price: Price,
}

impl OrderItem {
    /// `unit_price * bought_quantity`.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price.times(self.bought_quantity.unsigned_abs())
    }
}

/// A persisted, immutable order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Store-assigned order ID.
    pub id: OrderId,
    /// Commit time, assigned by the reservation engine.
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// Line items in request order.
    pub items: Vec<OrderItem>,
    /// Sum of all line totals.
    pub total_amount: Price,
    /// Where the order ships.
    pub user_address: DeliveryAddress,
}

/// A requested order line, as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub bought_quantity: i32,
}

impl NewOrderItem {
    #[must_use]
    pub const fn new(product_id: ProductId, bought_quantity: i32) -> Self {
        Self {
            product_id,
            bought_quantity,
        }
    }
}

/// An order request before validation.
///
/// Timestamp and total are never accepted from the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    #[serde(default)]
    pub items: Vec<NewOrderItem>,
    #[serde(default)]
    pub user_address: DeliveryAddress,
}

/// A fully priced order ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderRecord {
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
    pub total_amount: Price,
    pub user_address: DeliveryAddress,
}

impl NewOrderRecord {
    /// Attach the store-assigned ID.
    #[must_use]
    pub fn into_order(self, id: OrderId) -> Order {
        Order {
            id,
            created_at: self.created_at,
            items: self.items,
            total_amount: self.total_amount,
            user_address: self.user_address,
        }
    }
}

/// Pagination metadata for an order listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
    pub has_next: bool,
    pub has_previous: bool,
}

impl Pagination {
    /// Compute metadata for a page starting at `offset`.
    #[must_use]
    pub fn new(total: u64, limit: u32, offset: u32) -> Self {
        Self {
            total,
            limit,
            offset,
            has_next: u64::from(offset) + u64::from(limit) < total,
            has_previous: offset > 0,
        }
    }
}

/// One page of orders, most recent first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub pagination: Pagination,
}
