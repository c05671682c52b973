//! Reservation guarantees under concurrency and injected store faults.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::collections::HashSet;
use std::time::{Duration, Instant};

use axum::http::StatusCode;

use stockroom_core::ProductId;
use stockroom_integration_tests::{TEST_TIMEOUT, TestApp, order_body};
use stockroom_server::db::RepositoryError;
use stockroom_server::services::InventoryError;

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_no_oversell_under_concurrent_orders() {
    let app = std::sync::Arc::new(TestApp::seeded().await);

    // Product 4 holds 20 units; 30 buyers want 1 each alongside product 6
    let tasks: Vec<_> = (0..30)
        .map(|_| {
            let app = app.clone();
            tokio::spawn(async move { app.post("/orders", order_body(&[(6, 1), (4, 1)])).await })
        })
        .collect();

    let mut created = HashSet::new();
    let mut rejected = 0;
    for task in tasks {
        let (status, body) = task.await.unwrap();
        match status {
            StatusCode::OK => {
                created.insert(body["order_id"].as_i64().unwrap());
            }
            StatusCode::BAD_REQUEST => rejected += 1,
            other => panic!("unexpected status {other}: {body}"),
        }
    }

    assert_eq!(created.len(), 20);
    assert_eq!(rejected, 10);
    assert_eq!(app.store.quantity(4).await, 0);
    assert_eq!(app.store.quantity(6).await, 75 - 20);
    assert_eq!(app.store.order_count().await, 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_orders_and_restocks_stay_coherent() {
    let app = std::sync::Arc::new(TestApp::seeded().await);

    let buyers: Vec<_> = (0..20)
        .map(|_| {
            let app = app.clone();
            tokio::spawn(async move { app.post("/orders", order_body(&[(2, 1)])).await })
        })
        .collect();
    let (status, _) = app.put("/products/2?quantity=30").await;
    assert_eq!(status, StatusCode::OK);

    for buyer in buyers {
        let (status, _) = buyer.await.unwrap();
        assert!(status == StatusCode::OK || status == StatusCode::BAD_REQUEST);
    }

    // Whatever the interleaving, cache and store agree
    let cached = app.state.cache().get(ProductId::new(2)).await.unwrap();
    assert_eq!(cached.available_quantity, app.store.quantity(2).await);
}

#[tokio::test]
async fn test_stock_taken_after_validation_rolls_back_earlier_lines() {
    let app = TestApp::seeded().await;
    // Validation sees 20 units of product 4; a competing buyer leaves 3
    app.store.drain_before_next_write(ProductId::new(4), 3);

    let err = app
        .state
        .reservations()
        .create_order(serde_json::from_value(order_body(&[(1, 4), (4, 5), (2, 4)])).unwrap())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        InventoryError::InsufficientStock { product_id, requested: 5, available: 3 }
            if product_id == ProductId::new(4)
    ));
    assert_eq!(app.store.quantity(1).await, 50);
    assert_eq!(app.store.quantity(2).await, 30);
    assert_eq!(app.store.quantity(4).await, 3);
    assert_eq!(app.store.order_count().await, 0);

    let cached = app.state.cache().get(ProductId::new(4)).await.unwrap();
    assert_eq!(cached.available_quantity, 3);
}

// ============================================================================
// Rollback
// ============================================================================

#[tokio::test]
async fn test_persistence_failure_rolls_back_every_line() {
    let app = TestApp::seeded().await;
    app.store.fail_order_inserts(true);

    let (status, body) = app
        .post("/orders", order_body(&[(1, 5), (2, 5), (3, 5)]))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Service temporarily unavailable");

    assert_eq!(app.store.quantity(1).await, 50);
    assert_eq!(app.store.quantity(2).await, 30);
    assert_eq!(app.store.quantity(3).await, 100);
    assert_eq!(app.store.order_count().await, 0);

    // Cache agrees with the store after the rollback
    let (_, listing) = app.get("/products").await;
    assert_eq!(listing["products"][0]["available_quantity"], 50);

    app.store.fail_order_inserts(false);
    let (status, _) = app.post("/orders", order_body(&[(1, 5)])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.store.quantity(1).await, 45);
}

#[tokio::test]
async fn test_commit_timeout_rolls_back_earlier_lines() {
    let app = TestApp::seeded().await;
    app.store.stall_updates_for(Some(ProductId::new(3)));

    let started = std::time::Instant::now();
    let err = app
        .state
        .reservations()
        .create_order(
            serde_json::from_value(order_body(&[(1, 4), (2, 4), (3, 4)])).unwrap(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::Store(RepositoryError::Timeout(d)) if d == TEST_TIMEOUT));
    assert!(started.elapsed() < TEST_TIMEOUT * 10);

    assert_eq!(app.store.quantity(1).await, 50);
    assert_eq!(app.store.quantity(2).await, 30);
    assert_eq!(app.store.quantity(3).await, 100);

    // The timed-out product is re-read from the store on next access
    app.store.stall_updates_for(None);
    let (_, listing) = app.get("/products").await;
    assert_eq!(listing["products"][2]["available_quantity"], 100);
}

#[tokio::test]
async fn test_failed_rollback_is_reported() {
    let app = TestApp::seeded().await;
    app.store.fail_order_inserts(true);
    app.store.fail_restocks(true);

    let err = app
        .state
        .reservations()
        .create_order(serde_json::from_value(order_body(&[(1, 2), (2, 3)])).unwrap())
        .await
        .unwrap_err();

    let InventoryError::RollbackIncomplete { cause, unrestored } = err else {
        panic!("expected RollbackIncomplete, got {err:?}");
    };
    assert!(matches!(*cause, InventoryError::Store(RepositoryError::Conflict(_))));
    assert_eq!(unrestored, vec![ProductId::new(2), ProductId::new(1)]);

    // The shortfall is visible rather than hidden by the cache
    assert_eq!(app.store.quantity(1).await, 48);
    let cached = app.state.cache().get(ProductId::new(1)).await.unwrap();
    assert_eq!(cached.available_quantity, 48);
}

#[tokio::test]
async fn test_failed_rollback_is_500_over_http() {
    let app = TestApp::seeded().await;
    app.store.fail_order_inserts(true);
    app.store.fail_restocks(true);

    let (status, body) = app.post("/orders", order_body(&[(1, 1)])).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal server error");
}

#[tokio::test]
async fn test_abandoned_order_still_rolls_back() {
    let app = TestApp::seeded().await;
    app.store.stall_updates_for(Some(ProductId::new(3)));

    let request = serde_json::from_value(order_body(&[(1, 4), (2, 4), (3, 4)])).unwrap();
    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        app.state.reservations().create_order(request),
    )
    .await;
    assert!(abandoned.is_err());

    // The caller is gone while the first two lines are still deducted
    assert_eq!(app.store.quantity(1).await, 46);
    assert_eq!(app.store.quantity(2).await, 26);

    // The order keeps running, times out on product 3 and restores the rest
    let deadline = Instant::now() + TEST_TIMEOUT * 10;
    while app.store.quantity(1).await != 50 || app.store.quantity(2).await != 30 {
        assert!(Instant::now() < deadline, "stock left deducted without an order");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(app.store.quantity(3).await, 100);
    assert_eq!(app.store.order_count().await, 0);
}
