//! `PgStore` tests against a real database.
//!
//! These tests require:
//! - A running `PostgreSQL` database with migrations applied
//!   (`stockroom-cli migrate`)
//! - `STOCKROOM_TEST_DATABASE_URL` pointing at it
//!
//! Each test truncates the stockroom tables, so they must run serially:
//! `cargo test -p stockroom-integration-tests --test postgres_store -- --ignored --test-threads=1`

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use chrono::Utc;
use secrecy::SecretString;
use sqlx::PgPool;

use stockroom_core::{DeliveryAddress, OrderId, Price, ProductId};
use stockroom_server::db::seed::{default_catalog, seed_if_empty};
use stockroom_server::db::{OrderStore, PgStore, ProductStore, QuantityUpdate, create_pool};
use stockroom_server::models::{NewOrderRecord, OrderItem};

async fn test_pool() -> PgPool {
    let url = std::env::var("STOCKROOM_TEST_DATABASE_URL")
        .expect("STOCKROOM_TEST_DATABASE_URL must be set");
    let pool = create_pool(&SecretString::from(url)).await.unwrap();
    sqlx::query("TRUNCATE order_item, customer_order, product RESTART IDENTITY CASCADE")
        .execute(&pool)
        .await
        .unwrap();
    pool
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (STOCKROOM_TEST_DATABASE_URL)"]
async fn test_seed_and_conditional_update() {
    let store = PgStore::new(test_pool().await);

    assert_eq!(seed_if_empty(&store).await.unwrap(), default_catalog().len());
    assert_eq!(seed_if_empty(&store).await.unwrap(), 0);

    let products = store.list_products().await.unwrap();
    let product = &products[3];
    assert_eq!(product.available_quantity, 20);

    let stale = store.update_quantity(product.id, 19, 10).await.unwrap();
    assert_eq!(stale, QuantityUpdate::Conflict);

    let updated = store.update_quantity(product.id, 20, 10).await.unwrap();
    assert!(matches!(updated, QuantityUpdate::Updated(ref p) if p.available_quantity == 10));

    // CHECK (available_quantity >= 0) surfaces as a conflict
    assert!(store.update_quantity(product.id, 10, -1).await.is_err());
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (STOCKROOM_TEST_DATABASE_URL)"]
async fn test_order_round_trip() {
    let store = PgStore::new(test_pool().await);
    seed_if_empty(&store).await.unwrap();

    let record = NewOrderRecord {
        created_at: Utc::now(),
        items: vec![
            OrderItem {
                product_id: ProductId::new(1),
                bought_quantity: 2,
                unit_price: Price::from_cents(1999),
            },
            OrderItem {
                product_id: ProductId::new(3),
                bought_quantity: 1,
                unit_price: Price::from_cents(999),
            },
        ],
        total_amount: Price::from_cents(4997),
        user_address: DeliveryAddress::new("Lisbon", "Portugal", "1100-148"),
    };

    let created = store.insert_order(record).await.unwrap();
    let fetched = store.find_order(created.id).await.unwrap().unwrap();
    assert_eq!(fetched.items, created.items);
    assert_eq!(fetched.total_amount, created.total_amount);

    let (page, total) = store.find_orders(0, 10).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(page[0].id, created.id);

    assert!(store.find_order(OrderId::new(999)).await.unwrap().is_none());
}
