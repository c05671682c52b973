//! Product domain types.

use serde::{Deserialize, Serialize};

use stockroom_core::{Price, ProductId};

/// A catalog product with its current stock level.
///
/// Only the product cache's write-through path mutates `available_quantity`;
/// everything else treats products as read-only snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Store-assigned product ID.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Unit price.
    pub price: Price,
    /// Units in stock, never negative.
    pub available_quantity: i32,
}

impl Product {
    /// Whether `quantity` units can be taken from stock.
    #[must_use]
    pub const fn can_supply(&self, quantity: i32) -> bool {
        self.available_quantity >= quantity
    }
}

/// A product to be inserted by the seeder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub price: Price,
    pub available_quantity: i32,
}
