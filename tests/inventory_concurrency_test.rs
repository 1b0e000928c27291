//! Concurrent mutation of a single batch must never overdraw it.

mod common;

use common::{date, TestApp};
use rust_decimal_macros::dec;
use warehouse_api::errors::ServiceError;

#[tokio::test]
async fn concurrent_reserves_never_overdraw_a_batch() {
    let app = TestApp::new().await;
    let product = app.seed_product("RACE-SKU", dec!(1.00), 0).await;
    let batch = app
        .seed_batch(product.id, "RACE-1", 10, date(2025, 1, 1))
        .await;

    let svc_a = app.state.services.inventory.clone();
    let svc_b = app.state.services.inventory.clone();
    let (product_id, batch_id) = (product.id, batch.id);

    let a = tokio::spawn(async move { svc_a.reserve(product_id, batch_id, 6).await });
    let b = tokio::spawn(async move { svc_b.reserve(product_id, batch_id, 6).await });

    let results = [a.await.unwrap(), b.await.unwrap()];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    let failures: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();

    assert_eq!(successes, 1, "exactly one of the two reserves may win");
    assert_eq!(failures.len(), 1);
    assert!(
        matches!(failures[0], ServiceError::InsufficientStock(_)),
        "the loser must see InsufficientStock, got {:?}",
        failures[0]
    );

    assert_eq!(
        app.batch(batch.id).await.current_quantity,
        4,
        "final quantity is 10 - 6, never negative"
    );
}

#[tokio::test]
async fn twenty_unit_reserves_against_ten_units_yield_ten_successes() {
    let app = TestApp::new().await;
    let product = app.seed_product("RACE-20", dec!(1.00), 0).await;
    let batch = app
        .seed_batch(product.id, "RACE-20-1", 10, date(2025, 1, 1))
        .await;

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let svc = app.state.services.inventory.clone();
        let (product_id, batch_id) = (product.id, batch.id);
        tasks.push(tokio::spawn(async move {
            svc.reserve(product_id, batch_id, 1).await.is_ok()
        }));
    }

    let mut successes = 0;
    for task in tasks {
        if task.await.unwrap_or(false) {
            successes += 1;
        }
    }

    assert_eq!(
        successes, 10,
        "exactly 10 reservations should succeed; got {}",
        successes
    );
    assert_eq!(app.batch(batch.id).await.current_quantity, 0);
}

#[tokio::test]
async fn release_is_capped_at_undamaged_original_quantity() {
    let app = TestApp::new().await;
    let product = app.seed_product("CAP-SKU", dec!(1.00), 0).await;
    let batch = app
        .seed_batch(product.id, "CAP-1", 10, date(2025, 1, 1))
        .await;

    app.state
        .services
        .inventory
        .mark_damaged(batch.id, 2)
        .await
        .unwrap();
    app.state
        .services
        .inventory
        .reserve(product.id, batch.id, 5)
        .await
        .unwrap();

    // Over-generous release: must clamp at original - damaged = 8.
    app.state
        .services
        .inventory
        .release(batch.id, 50)
        .await
        .unwrap();

    let reloaded = app.batch(batch.id).await;
    assert_eq!(reloaded.current_quantity, 8);
    assert_eq!(reloaded.damaged_quantity, 2);
}

#[tokio::test]
async fn damage_beyond_current_stock_is_rejected() {
    let app = TestApp::new().await;
    let product = app.seed_product("DMG-SKU", dec!(1.00), 0).await;
    let batch = app
        .seed_batch(product.id, "DMG-1", 4, date(2025, 1, 1))
        .await;

    let err = app
        .state
        .services
        .inventory
        .mark_damaged(batch.id, 5)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InsufficientStock(_)));

    let reloaded = app.batch(batch.id).await;
    assert_eq!(reloaded.current_quantity, 4);
    assert_eq!(reloaded.damaged_quantity, 0);
}
