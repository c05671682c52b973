//! Catalog route handlers.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use stockroom_core::ProductId;

use super::{AppPath, AppQuery};
use crate::error::AppError;
use crate::models::Product;
use crate::services::InventoryError;
use crate::state::AppState;

/// Response for `GET /products`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProductsResponse {
    pub message: String,
    pub products: Vec<Product>,
}

/// Response for `PUT /products/{id}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProductResponse {
    pub message: String,
    pub product: Product,
}

/// Query parameters for `PUT /products/{id}`.
#[derive(Debug, Deserialize)]
pub struct SetQuantityQuery {
    pub quantity: i32,
}

/// List the whole catalog from the product cache.
///
/// GET /products
///
/// # Errors
///
/// 404 when the catalog is empty, 503 when the store is unavailable.
#[instrument(skip(state))]
pub async fn list_products(State(state): State<AppState>) -> Result<Json<ProductsResponse>, AppError> {
    let products = state.queries().list_products().await?;

    Ok(Json(ProductsResponse {
        message: format!("Success! Found {} products", products.len()),
        products,
    }))
}

/// Administrative stock override.
///
/// PUT /products/{id}?quantity=N
///
/// # Errors
///
/// 400 for a malformed ID or negative quantity, 404 for an unknown product.
#[instrument(skip(state))]
pub async fn set_quantity(
    State(state): State<AppState>,
    AppPath(raw_id): AppPath<String>,
    AppQuery(query): AppQuery<SetQuantityQuery>,
) -> Result<Json<ProductResponse>, AppError> {
    let id: ProductId = raw_id.parse().map_err(InventoryError::from)?;
    let product = state.cache().set_quantity(id, query.quantity).await?;

    Ok(Json(ProductResponse {
        message: format!("Success! Updated product with ID: {id}"),
        product,
    }))
}
