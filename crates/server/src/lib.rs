//! Stockroom order service library.
//!
//! The HTTP binary is a thin shell around this crate so that the full
//! application can be built and exercised in tests.
//!
//! # Architecture
//!
//! - [`db`] - `ProductStore`/`OrderStore` traits, `PostgreSQL` and in-memory stores
//! - [`services`] - write-through product cache, reservation engine, queries
//! - [`routes`] - Axum handlers and the assembled application
//! - [`state`] - shared `AppState` owning the process-wide cache

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

pub use error::AppError;
pub use routes::app;
pub use state::AppState;
