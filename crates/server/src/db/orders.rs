//! `PostgreSQL` order storage.
//!
//! An order is a `customer_order` header plus its `order_item` lines. Both are
//! written in one transaction and never updated afterwards.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rust_decimal::Decimal;
use sqlx::{PgConnection, Postgres, Transaction};

use stockroom_core::{DeliveryAddress, OrderId, Price, ProductId};

use super::{OrderStore, PgStore, RepositoryError};
use crate::models::{NewOrderRecord, Order, OrderItem};

// =============================================================================
// Internal Row Types
// =============================================================================

/// Internal row type for order headers.
#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    created_at: DateTime<Utc>,
    total_amount: Decimal,
    city: String,
    country: String,
    zip_code: String,
}

/// Internal row type for order lines.
#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    order_id: i32,
    product_id: i32,
    bought_quantity: i32,
    unit_price: Decimal,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        let unit_price = Price::new(row.unit_price).map_err(|e| {
            RepositoryError::DataCorruption(format!("order {} line price: {e}", row.order_id))
        })?;
        Ok(Self {
            product_id: ProductId::new(row.product_id),
            bought_quantity: row.bought_quantity,
            unit_price,
        })
    }
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, RepositoryError> {
        let total_amount = Price::new(self.total_amount).map_err(|e| {
            RepositoryError::DataCorruption(format!("order {} total: {e}", self.id))
        })?;
        Ok(Order {
            id: OrderId::new(self.id),
            created_at: self.created_at,
            items,
            total_amount,
            user_address: DeliveryAddress::new(self.city, self.country, self.zip_code),
        })
    }
}

const ORDER_COLUMNS: &str = "id, created_at, total_amount, city, country, zip_code";

/// Load the lines of the given orders, grouped by order ID.
async fn load_items(
    conn: &mut PgConnection,
    order_ids: &[i32],
) -> Result<HashMap<i32, Vec<OrderItem>>, RepositoryError> {
    let rows = sqlx::query_as::<_, OrderItemRow>(
        r"
        SELECT order_id, product_id, bought_quantity, unit_price
        FROM order_item
        WHERE order_id = ANY($1)
        ORDER BY order_id, position
        ",
    )
    .bind(order_ids)
    .fetch_all(conn)
    .await?;

    let mut grouped: HashMap<i32, Vec<OrderItem>> = HashMap::new();
    for row in rows {
        let order_id = row.order_id;
        grouped
            .entry(order_id)
            .or_default()
            .push(OrderItem::try_from(row)?);
    }
    Ok(grouped)
}

/// Attach lines to headers, preserving header order.
fn assemble(
    rows: Vec<OrderRow>,
    mut items: HashMap<i32, Vec<OrderItem>>,
) -> Result<Vec<Order>, RepositoryError> {
    rows.into_iter()
        .map(|row| {
            let lines = items.remove(&row.id).unwrap_or_default();
            if lines.is_empty() {
                return Err(RepositoryError::DataCorruption(format!(
                    "order {} has no lines",
                    row.id
                )));
            }
            row.into_order(lines)
        })
        .collect()
}

async fn insert_lines(
    tx: &mut Transaction<'_, Postgres>,
    order_id: i32,
    items: &[OrderItem],
) -> Result<(), RepositoryError> {
    for (position, item) in (0_i32..).zip(items) {
        sqlx::query(
            r"
            INSERT INTO order_item (order_id, position, product_id, bought_quantity, unit_price)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(order_id)
        .bind(position)
        .bind(item.product_id.as_i32())
        .bind(item.bought_quantity)
        .bind(item.unit_price.amount())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

impl OrderStore for PgStore {
    fn insert_order(&self, order: NewOrderRecord) -> BoxFuture<'_, Result<Order, RepositoryError>> {
        Box::pin(async move {
            let mut tx = self.pool().begin().await?;

            let id: i32 = sqlx::query_scalar(
                r"
                INSERT INTO customer_order (created_at, total_amount, city, country, zip_code)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id
                ",
            )
            .bind(order.created_at)
            .bind(order.total_amount.amount())
            .bind(&order.user_address.city)
            .bind(&order.user_address.country)
            .bind(&order.user_address.zip_code)
            .fetch_one(&mut *tx)
            .await?;

            insert_lines(&mut tx, id, &order.items).await?;
            tx.commit().await?;

            Ok(order.into_order(OrderId::new(id)))
        })
    }

    fn find_orders(
        &self,
        offset: u32,
        limit: u32,
    ) -> BoxFuture<'_, Result<(Vec<Order>, u64), RepositoryError>> {
        Box::pin(async move {
            // Count and page must come from the same snapshot
            let mut tx = self.pool().begin().await?;
            sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
                .execute(&mut *tx)
                .await?;

            let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customer_order")
                .fetch_one(&mut *tx)
                .await?;

            let rows = sqlx::query_as::<_, OrderRow>(&format!(
                r"
                SELECT {ORDER_COLUMNS}
                FROM customer_order
                ORDER BY created_at DESC, id DESC
                LIMIT $1 OFFSET $2
                "
            ))
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&mut *tx)
            .await?;

            let ids: Vec<i32> = rows.iter().map(|row| row.id).collect();
            let items = load_items(&mut tx, &ids).await?;
            tx.commit().await?;

            let total = u64::try_from(total)
                .map_err(|_| RepositoryError::DataCorruption(format!("order count {total}")))?;
            Ok((assemble(rows, items)?, total))
        })
    }

    fn find_order(&self, id: OrderId) -> BoxFuture<'_, Result<Option<Order>, RepositoryError>> {
        Box::pin(async move {
            let mut conn = self.pool().acquire().await?;

            let row = sqlx::query_as::<_, OrderRow>(&format!(
                "SELECT {ORDER_COLUMNS} FROM customer_order WHERE id = $1"
            ))
            .bind(id.as_i32())
            .fetch_optional(&mut *conn)
            .await?;

            let Some(row) = row else {
                return Ok(None);
            };

            let items = load_items(&mut conn, &[row.id]).await?;
            Ok(assemble(vec![row], items)?.pop())
        })
    }
}
