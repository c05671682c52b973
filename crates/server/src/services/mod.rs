//! Business logic services.
//!
//! - [`ProductCache`] - write-through view of the catalog; the only path that
//!   mutates stock
//! - [`ReservationEngine`] - validate, reserve and persist orders with
//!   compensating rollback
//! - [`QueryService`] - product listing and paginated order queries

mod error;
pub mod product_cache;
pub mod queries;
pub mod reservation;

pub use error::InventoryError;
pub use product_cache::{HydrationState, ProductCache};
pub use queries::QueryService;
pub use reservation::ReservationEngine;
