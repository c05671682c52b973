//! Order route handlers.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use stockroom_core::OrderId;

use super::{AppJson, AppPath, AppQuery};
use crate::error::AppError;
use crate::models::{NewOrder, Order, Pagination};
use crate::state::AppState;

/// Response for `POST /orders`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateOrderResponse {
    pub message: String,
    pub order_id: OrderId,
    pub order: Order,
}

/// Response for `GET /orders`.
#[derive(Debug, Serialize, Deserialize)]
pub struct OrdersResponse {
    pub message: String,
    pub orders: Vec<Order>,
    pub pagination: Pagination,
}

/// Response for `GET /orders/{id}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub message: String,
    pub order: Order,
}

/// Query parameters for `GET /orders`.
#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Create an order, reserving stock for every line.
///
/// POST /orders
///
/// # Errors
///
/// 400 for invalid requests or insufficient stock, 404 for unknown products,
/// 503 when the store is unavailable (stock is rolled back).
#[instrument(skip(state, request))]
pub async fn create_order(
    State(state): State<AppState>,
    AppJson(request): AppJson<NewOrder>,
) -> Result<Json<CreateOrderResponse>, AppError> {
    let order = state.reservations().create_order(request).await?;

    Ok(Json(CreateOrderResponse {
        message: format!("Success! Created order with ID: {}", order.id),
        order_id: order.id,
        order,
    }))
}

/// List orders, most recent first.
///
/// GET /orders?limit=10&offset=0
///
/// # Errors
///
/// 400 for a zero or malformed limit/offset, 404 when no order exists.
#[instrument(skip(state))]
pub async fn list_orders(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ListOrdersQuery>,
) -> Result<Json<OrdersResponse>, AppError> {
    let page = state
        .queries()
        .list_orders(query.limit, query.offset)
        .await?;

    Ok(Json(OrdersResponse {
        message: format!("Success! Found {} orders", page.orders.len()),
        orders: page.orders,
        pagination: page.pagination,
    }))
}

/// Fetch one order.
///
/// GET /orders/{id}
///
/// # Errors
///
/// 400 for a malformed ID, 404 for an unknown order.
#[instrument(skip(state))]
pub async fn get_order(
    State(state): State<AppState>,
    AppPath(raw_id): AppPath<String>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.queries().get_order(&raw_id).await?;

    Ok(Json(OrderResponse {
        message: format!("Success! Found order with ID: {}", order.id),
        order,
    }))
}
