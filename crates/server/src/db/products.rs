//! `PostgreSQL` product storage.

use futures::future::BoxFuture;
use rust_decimal::Decimal;

use stockroom_core::{Price, ProductId};

use super::{PgStore, ProductStore, QuantityUpdate, RepositoryError};
use crate::models::{NewProduct, Product};

const PRODUCT_COLUMNS: &str = "id, name, price, available_quantity";

/// Internal row type for product queries.
#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i32,
    name: String,
    price: Decimal,
    available_quantity: i32,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let price = Price::new(row.price).map_err(|e| {
            RepositoryError::DataCorruption(format!("product {}: {e}", row.id))
        })?;
        if row.available_quantity < 0 {
            return Err(RepositoryError::DataCorruption(format!(
                "product {}: negative stock {}",
                row.id, row.available_quantity
            )));
        }

        Ok(Self {
            id: ProductId::new(row.id),
            name: row.name,
            price,
            available_quantity: row.available_quantity,
        })
    }
}

impl ProductStore for PgStore {
    fn ping(&self) -> BoxFuture<'_, Result<(), RepositoryError>> {
        Box::pin(async move {
            sqlx::query("SELECT 1").execute(self.pool()).await?;
            Ok(())
        })
    }

    fn list_products(&self) -> BoxFuture<'_, Result<Vec<Product>, RepositoryError>> {
        Box::pin(async move {
            let rows = sqlx::query_as::<_, ProductRow>(&format!(
                "SELECT {PRODUCT_COLUMNS} FROM product ORDER BY id"
            ))
            .fetch_all(self.pool())
            .await?;

            rows.into_iter().map(Product::try_from).collect()
        })
    }

    fn find_product(
        &self,
        id: ProductId,
    ) -> BoxFuture<'_, Result<Option<Product>, RepositoryError>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, ProductRow>(&format!(
                "SELECT {PRODUCT_COLUMNS} FROM product WHERE id = $1"
            ))
            .bind(id.as_i32())
            .fetch_optional(self.pool())
            .await?;

            row.map(Product::try_from).transpose()
        })
    }

    fn update_quantity(
        &self,
        id: ProductId,
        expected: i32,
        new: i32,
    ) -> BoxFuture<'_, Result<QuantityUpdate, RepositoryError>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, ProductRow>(&format!(
                r"
                UPDATE product
                SET available_quantity = $3, updated_at = NOW()
                WHERE id = $1 AND available_quantity = $2
                RETURNING {PRODUCT_COLUMNS}
                "
            ))
            .bind(id.as_i32())
            .bind(expected)
            .bind(new)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e {
                    if db_err.is_check_violation() {
                        return RepositoryError::Conflict(format!(
                            "product {id}: quantity {new} violates stock constraint"
                        ));
                    }
                }
                RepositoryError::Database(e)
            })?;

            if let Some(row) = row {
                return Ok(QuantityUpdate::Updated(Product::try_from(row)?));
            }

            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM product WHERE id = $1)")
                    .bind(id.as_i32())
                    .fetch_one(self.pool())
                    .await?;

            Ok(if exists {
                QuantityUpdate::Conflict
            } else {
                QuantityUpdate::Missing
            })
        })
    }

    fn set_quantity(
        &self,
        id: ProductId,
        quantity: i32,
    ) -> BoxFuture<'_, Result<Option<Product>, RepositoryError>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, ProductRow>(&format!(
                r"
                UPDATE product
                SET available_quantity = $2, updated_at = NOW()
                WHERE id = $1
                RETURNING {PRODUCT_COLUMNS}
                "
            ))
            .bind(id.as_i32())
            .bind(quantity)
            .fetch_optional(self.pool())
            .await?;

            row.map(Product::try_from).transpose()
        })
    }

    fn insert_products(
        &self,
        products: Vec<NewProduct>,
    ) -> BoxFuture<'_, Result<Vec<Product>, RepositoryError>> {
        Box::pin(async move {
            let mut tx = self.pool().begin().await?;
            let mut inserted = Vec::with_capacity(products.len());

            for product in products {
                let row = sqlx::query_as::<_, ProductRow>(&format!(
                    r"
                    INSERT INTO product (name, price, available_quantity)
                    VALUES ($1, $2, $3)
                    RETURNING {PRODUCT_COLUMNS}
                    "
                ))
                .bind(&product.name)
                .bind(product.price.amount())
                .bind(product.available_quantity)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| {
                    if let sqlx::Error::Database(ref db_err) = e {
                        if db_err.is_unique_violation() {
                            return RepositoryError::Conflict(format!(
                                "product '{}' already exists",
                                product.name
                            ));
                        }
                    }
                    RepositoryError::Database(e)
                })?;
                inserted.push(Product::try_from(row)?);
            }

            tx.commit().await?;
            Ok(inserted)
        })
    }
}
