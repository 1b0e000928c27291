//! The forward lifecycle chain: order processing idempotence, the packing
//! mirror, transport assignment, and the delivery projection.

mod common;

use axum::http::{Method, StatusCode};
use common::{assert_status, date, response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use warehouse_api::entities::order::OrderStatus;
use warehouse_api::entities::package::PackageStatus;
use warehouse_api::entities::transport::TransportStatus;
use warehouse_api::errors::ServiceError;

#[tokio::test]
async fn processing_twice_fails_without_double_allocation() {
    let app = TestApp::new().await;
    let product = app.seed_product("IDEM-SKU", dec!(5.00), 0).await;
    let batch = app
        .seed_batch(product.id, "IDEM-1", 10, date(2025, 5, 1))
        .await;

    let outcome = app.processed_order(product.id, 4).await;
    assert_eq!(outcome.order.status, OrderStatus::Processing);
    assert_eq!(app.batch(batch.id).await.current_quantity, 6);

    let err = app
        .state
        .services
        .orders
        .process_order(outcome.order.id)
        .await
        .unwrap_err();
    assert!(
        matches!(err, ServiceError::InvalidTransition(_)),
        "expected InvalidTransition, got {err:?}"
    );

    // No second decrement happened.
    assert_eq!(app.batch(batch.id).await.current_quantity, 6);
}

#[tokio::test]
async fn packing_requires_a_ready_package() {
    let app = TestApp::new().await;
    let product = app.seed_product("PACK-SKU", dec!(5.00), 0).await;
    app.seed_batch(product.id, "PACK-1", 10, date(2025, 5, 1))
        .await;

    let outcome = app.processed_order(product.id, 2).await;

    // Package is still pending; the order-side mirror must refuse.
    let err = app
        .state
        .services
        .orders
        .pack_order(outcome.order.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidTransition(_)));

    app.state
        .services
        .packages
        .mark_ready(outcome.package.id, Some("shrink-wrapped".to_string()))
        .await
        .unwrap();

    let packed = app
        .state
        .services
        .orders
        .pack_order(outcome.order.id, None)
        .await
        .unwrap();
    assert_eq!(packed.status, OrderStatus::Packaged);
}

#[tokio::test]
async fn transport_assignment_requires_ready_for_dispatch() {
    let app = TestApp::new().await;
    let product = app.seed_product("DISP-SKU", dec!(5.00), 0).await;
    app.seed_batch(product.id, "DISP-1", 10, date(2025, 5, 1))
        .await;

    let outcome = app.processed_order(product.id, 2).await;
    let transporter = uuid::Uuid::new_v4();

    // Still pending: assignment must be rejected with the actual status.
    let err = app
        .state
        .services
        .packages
        .assign_transport(outcome.package.id, transporter, None)
        .await
        .unwrap_err();
    match err {
        ServiceError::InvalidTransition(msg) => {
            assert!(msg.contains("pending"), "message should carry the actual status: {msg}")
        }
        other => panic!("expected InvalidTransition, got {other:?}"),
    }

    app.state
        .services
        .packages
        .mark_ready(outcome.package.id, None)
        .await
        .unwrap();

    let (transport, package) = app
        .state
        .services
        .packages
        .assign_transport(outcome.package.id, transporter, None)
        .await
        .unwrap();
    assert_eq!(transport.status, TransportStatus::Dispatched);
    assert_eq!(package.status, PackageStatus::Dispatched);
}

#[tokio::test]
async fn delivery_projects_onto_package_and_order() {
    let app = TestApp::new().await;
    let product = app.seed_product("DELIV-SKU", dec!(5.00), 0).await;
    app.seed_batch(product.id, "DELIV-1", 10, date(2025, 5, 1))
        .await;

    let outcome = app.processed_order(product.id, 2).await;
    let transport_id = app
        .deliver_package(outcome.order.id, outcome.package.id)
        .await;

    let transport = app
        .state
        .services
        .transports
        .get_transport(transport_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(transport.status, TransportStatus::Delivered);
    // dispatched, in_transit, delivered: one immutable entry per edge.
    assert_eq!(transport.status_history.len(), 3);
    assert_eq!(transport.status_history[0].status, TransportStatus::Dispatched);
    assert_eq!(transport.status_history[1].status, TransportStatus::InTransit);
    assert_eq!(transport.status_history[2].status, TransportStatus::Delivered);

    let (package, _) = app
        .state
        .services
        .packages
        .get_package(outcome.package.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(package.status, PackageStatus::Delivered);

    let (order, _) = app
        .state
        .services
        .orders
        .get_order(outcome.order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Delivered);
}

#[tokio::test]
async fn transport_cannot_skip_straight_to_delivered() {
    let app = TestApp::new().await;
    let product = app.seed_product("SKIP-SKU", dec!(5.00), 0).await;
    app.seed_batch(product.id, "SKIP-1", 10, date(2025, 5, 1))
        .await;

    let outcome = app.processed_order(product.id, 1).await;
    app.state
        .services
        .packages
        .mark_ready(outcome.package.id, None)
        .await
        .unwrap();
    let (transport, _) = app
        .state
        .services
        .packages
        .assign_transport(outcome.package.id, uuid::Uuid::new_v4(), None)
        .await
        .unwrap();

    let err = app
        .state
        .services
        .transports
        .update_status(transport.id, TransportStatus::Delivered, None, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidTransition(_)));

    // The failed attempt must not have touched the history.
    let reloaded = app
        .state
        .services
        .transports
        .get_transport(transport.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.status, TransportStatus::Dispatched);
    assert_eq!(reloaded.status_history.len(), 1);
}

#[tokio::test]
async fn http_process_conflicts_surface_as_409_and_400() {
    let app = TestApp::new().await;
    let product = app.seed_product("HTTP-SKU", dec!(3.00), 0).await;
    app.seed_batch(product.id, "HTTP-1", 5, date(2025, 5, 1))
        .await;

    let create = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [{ "product_id": product.id, "quantity": 3 }]
            })),
        )
        .await;
    assert_status(&create, StatusCode::OK);
    let created = response_json(create).await;
    let order_id = created["data"]["id"].as_str().unwrap().to_string();

    let process = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/process", order_id),
            None,
        )
        .await;
    assert_status(&process, StatusCode::OK);
    let processed = response_json(process).await;
    assert_eq!(processed["data"]["order"]["status"], "processing");
    let package_id = processed["data"]["package"]["id"].as_str().unwrap().to_string();

    // Second process call: the order is no longer pending.
    let repeat = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/process", order_id),
            None,
        )
        .await;
    assert_status(&repeat, StatusCode::BAD_REQUEST);
    let body = response_json(repeat).await;
    assert!(
        body["message"].as_str().unwrap().contains("processing"),
        "error must carry the actual status for resynchronization: {body}"
    );

    // A delivery state cannot be written onto the package directly.
    let patch = app
        .request(
            Method::PATCH,
            &format!("/api/v1/packages/{}/status", package_id),
            Some(json!({ "status": "delivered" })),
        )
        .await;
    assert_status(&patch, StatusCode::BAD_REQUEST);

    // An order that cannot be covered by stock conflicts with 409.
    let big_order = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [{ "product_id": product.id, "quantity": 99 }]
            })),
        )
        .await;
    let big_order = response_json(big_order).await;
    let big_id = big_order["data"]["id"].as_str().unwrap();

    let conflict = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/process", big_id),
            None,
        )
        .await;
    assert_status(&conflict, StatusCode::CONFLICT);
}

#[tokio::test]
async fn low_stock_detection_fires_at_the_reorder_threshold() {
    let app = TestApp::new().await;
    // Threshold 5: allocating down to 4 must raise the alert.
    let product = app.seed_product("LOW-SKU", dec!(2.00), 5).await;
    app.seed_batch(product.id, "LOW-1", 10, date(2025, 5, 1))
        .await;

    app.processed_order(product.id, 6).await;
    let events = app.drain_events().await;

    let low_stock = events.iter().find_map(|e| match e {
        warehouse_api::events::Event::LowStockDetected {
            product_id,
            available,
            threshold,
        } => Some((*product_id, *available, *threshold)),
        _ => None,
    });
    assert_eq!(low_stock, Some((product.id, 4, 5)));
}
