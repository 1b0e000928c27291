//! FEFO allocation behavior: pick order, determinism, and the all-or-nothing
//! guarantee across batches and order lines.

mod common;

use common::{date, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use warehouse_api::entities::{batch_allocation, package_item};
use warehouse_api::errors::ServiceError;
use warehouse_api::services::orders::{CreateOrderRequest, OrderItemRequest};

#[tokio::test]
async fn allocation_picks_the_soonest_expiring_batch_first() {
    let app = TestApp::new().await;
    let product = app.seed_product("FEFO-SKU", dec!(10.00), 0).await;

    let b1 = app
        .seed_batch(product.id, "B1", 5, date(2025, 1, 1))
        .await;
    let b2 = app
        .seed_batch(product.id, "B2", 5, date(2025, 2, 1))
        .await;

    let outcome = app.processed_order(product.id, 7).await;

    let items = package_item::Entity::find()
        .filter(package_item::Column::PackageId.eq(outcome.package.id))
        .all(&*app.state.db)
        .await
        .unwrap();

    assert_eq!(items.len(), 2);
    let from_b1 = items.iter().find(|i| i.batch_id == b1.id).unwrap();
    let from_b2 = items.iter().find(|i| i.batch_id == b2.id).unwrap();
    assert_eq!(from_b1.quantity, 5, "soonest expiry must be drained first");
    assert_eq!(from_b2.quantity, 2);

    assert_eq!(app.batch(b1.id).await.current_quantity, 0);
    assert_eq!(app.batch(b2.id).await.current_quantity, 3);

    // Package value reflects the order line priced at the product rate.
    assert_eq!(outcome.package.total_value, dec!(70.00));
}

#[tokio::test]
async fn allocation_breaks_expiry_ties_by_batch_number() {
    let app = TestApp::new().await;
    let product = app.seed_product("TIE-SKU", dec!(1.00), 0).await;

    // Same expiry; LOT-A must win the tie on batch number.
    let lot_b = app
        .seed_batch(product.id, "LOT-B", 4, date(2025, 6, 1))
        .await;
    let lot_a = app
        .seed_batch(product.id, "LOT-A", 4, date(2025, 6, 1))
        .await;

    let outcome = app.processed_order(product.id, 5).await;

    let allocations = batch_allocation::Entity::find()
        .filter(batch_allocation::Column::PackageId.eq(outcome.package.id))
        .all(&*app.state.db)
        .await
        .unwrap();

    let from_a = allocations.iter().find(|a| a.batch_id == lot_a.id).unwrap();
    let from_b = allocations.iter().find(|a| a.batch_id == lot_b.id).unwrap();
    assert_eq!(from_a.quantity, 4);
    assert_eq!(from_b.quantity, 1);
}

#[tokio::test]
async fn allocation_fails_without_mutating_any_batch() {
    let app = TestApp::new().await;
    let product = app.seed_product("SHORT-SKU", dec!(2.50), 0).await;
    let batch = app
        .seed_batch(product.id, "ONLY", 10, date(2025, 3, 1))
        .await;

    let order = app
        .state
        .services
        .orders
        .create_order(CreateOrderRequest {
            order_number: None,
            created_by: None,
            notes: None,
            items: vec![OrderItemRequest {
                product_id: product.id,
                quantity: 12,
            }],
        })
        .await
        .unwrap();

    let err = app
        .state
        .services
        .orders
        .process_order(order.id)
        .await
        .unwrap_err();
    assert!(
        matches!(err, ServiceError::AllocationFailed(_)),
        "expected AllocationFailed, got {err:?}"
    );

    // Recoverable: nothing reserved, order still pending and retryable.
    assert_eq!(app.batch(batch.id).await.current_quantity, 10);
    let (reloaded, _) = app
        .state
        .services
        .orders
        .get_order(order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        reloaded.status,
        warehouse_api::entities::order::OrderStatus::Pending
    );

    // After restock arrives, the same order processes cleanly.
    app.seed_batch(product.id, "RESUPPLY", 5, date(2025, 4, 1))
        .await;
    let outcome = app.state.services.orders.process_order(order.id).await;
    assert!(outcome.is_ok(), "retry after restock should succeed");
}

#[tokio::test]
async fn one_failing_line_rolls_back_every_other_line() {
    let app = TestApp::new().await;
    let stocked = app.seed_product("STOCKED", dec!(1.00), 0).await;
    let missing = app.seed_product("MISSING", dec!(1.00), 0).await;

    let batch = app
        .seed_batch(stocked.id, "ST-1", 5, date(2025, 1, 1))
        .await;
    // `missing` has no batches at all.

    let order = app
        .state
        .services
        .orders
        .create_order(CreateOrderRequest {
            order_number: None,
            created_by: None,
            notes: None,
            items: vec![
                OrderItemRequest {
                    product_id: stocked.id,
                    quantity: 3,
                },
                OrderItemRequest {
                    product_id: missing.id,
                    quantity: 2,
                },
            ],
        })
        .await
        .unwrap();

    let err = app
        .state
        .services
        .orders
        .process_order(order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::AllocationFailed(_)));

    // The satisfiable line's reservation must have been compensated.
    assert_eq!(app.batch(batch.id).await.current_quantity, 5);

    let allocations = batch_allocation::Entity::find()
        .all(&*app.state.db)
        .await
        .unwrap();
    assert!(
        allocations.is_empty(),
        "no allocation records may survive a failed run"
    );
}

#[tokio::test]
async fn repeated_product_lines_deplete_batches_cumulatively() {
    let app = TestApp::new().await;
    let product = app.seed_product("REPEAT-SKU", dec!(1.00), 0).await;
    let b1 = app
        .seed_batch(product.id, "R1", 4, date(2025, 1, 1))
        .await;
    let b2 = app
        .seed_batch(product.id, "R2", 4, date(2025, 2, 1))
        .await;

    let order = app
        .state
        .services
        .orders
        .create_order(CreateOrderRequest {
            order_number: None,
            created_by: None,
            notes: None,
            items: vec![
                OrderItemRequest {
                    product_id: product.id,
                    quantity: 3,
                },
                OrderItemRequest {
                    product_id: product.id,
                    quantity: 3,
                },
            ],
        })
        .await
        .unwrap();

    app.state
        .services
        .orders
        .process_order(order.id)
        .await
        .unwrap();

    // 6 total: 4 from the earlier batch, 2 from the later one.
    assert_eq!(app.batch(b1.id).await.current_quantity, 0);
    assert_eq!(app.batch(b2.id).await.current_quantity, 2);
}

#[tokio::test]
async fn ledger_invariant_holds_through_allocation_and_damage() {
    let app = TestApp::new().await;
    let product = app.seed_product("INV-SKU", dec!(1.00), 0).await;
    let batch = app
        .seed_batch(product.id, "INV-1", 20, date(2025, 9, 1))
        .await;

    app.state
        .services
        .inventory
        .mark_damaged(batch.id, 3)
        .await
        .unwrap();
    app.processed_order(product.id, 7).await;

    let snapshot = app
        .state
        .services
        .inventory
        .track_batch("INV-1")
        .await
        .unwrap();

    // current + damaged + outstanding allocations == original, always.
    assert_eq!(snapshot.batch.current_quantity, 10);
    assert_eq!(snapshot.batch.damaged_quantity, 3);
    assert_eq!(snapshot.allocated_outstanding, 7);
    assert_eq!(
        snapshot.batch.current_quantity
            + snapshot.batch.damaged_quantity
            + snapshot.allocated_outstanding,
        snapshot.batch.original_quantity
    );
}
