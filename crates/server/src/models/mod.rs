//! Domain models for the order service.
//!
//! These types represent validated domain objects separate from database row
//! types (see `db`) and from request/response payloads (see `routes`).

pub mod order;
pub mod product;

pub use order::{NewOrder, NewOrderItem, NewOrderRecord, Order, OrderItem, OrderPage, Pagination};
pub use product::{NewProduct, Product};
