//! Inventory error types.

use thiserror::Error;

use stockroom_core::{AddressError, OrderId, ParseIdError, ProductId};

use crate::db::RepositoryError;

/// Errors that can occur during catalog, reservation and order operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Request failed validation; nothing was changed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Product does not exist.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    /// Order does not exist.
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    /// The catalog has no products.
    #[error("no products found")]
    EmptyCatalog,

    /// No order has been placed yet.
    #[error("no orders found")]
    NoOrders,

    /// Not enough stock to satisfy a line item; nothing was changed.
    #[error(
        "insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: i64,
        available: i64,
    },

    /// Store failed or timed out. Any deductions were rolled back.
    #[error("store unavailable: {0}")]
    Store(#[from] RepositoryError),

    /// A compensating rollback could not restore every deduction.
    #[error("{cause}; rollback left products {unrestored:?} unrestored")]
    RollbackIncomplete {
        cause: Box<InventoryError>,
        unrestored: Vec<ProductId>,
    },

    /// The task running an order panicked or was cancelled at shutdown.
    #[error("order task failed: {0}")]
    TaskFailed(String),
}

impl InventoryError {
    /// Whether the caller is at fault (as opposed to the store or the service).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_)
                | Self::ProductNotFound(_)
                | Self::OrderNotFound(_)
                | Self::EmptyCatalog
                | Self::NoOrders
                | Self::InsufficientStock { .. }
        )
    }
}

impl From<AddressError> for InventoryError {
    fn from(err: AddressError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

impl From<ParseIdError> for InventoryError {
    fn from(err: ParseIdError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_messages_name_the_entity() {
        let err = InventoryError::InsufficientStock {
            product_id: ProductId::new(4),
            requested: 25,
            available: 20,
        };
        assert_eq!(
            err.to_string(),
            "insufficient stock for product 4: requested 25, available 20"
        );
        assert_eq!(
            InventoryError::OrderNotFound(OrderId::new(9)).to_string(),
            "order 9 not found"
        );
    }

    #[test]
    fn test_parse_failures_are_invalid_input() {
        let err: InventoryError = "abc".parse::<OrderId>().unwrap_err().into();
        assert!(matches!(err, InventoryError::InvalidInput(ref msg) if msg.contains("abc")));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_rollback_incomplete_keeps_cause() {
        let err = InventoryError::RollbackIncomplete {
            cause: Box::new(InventoryError::Store(RepositoryError::Timeout(
                Duration::from_millis(50),
            ))),
            unrestored: vec![ProductId::new(2)],
        };
        let message = err.to_string();
        assert!(message.contains("timed out"));
        assert!(message.contains("[ProductId(2)]"));
        assert!(!err.is_client_error());
    }
}
