//! Core types for Stockroom.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod address;
pub mod id;
pub mod price;

pub use address::{AddressError, DeliveryAddress};
pub use id::*;
pub use price::{Price, PriceError};
