//! Test harness: application state backed by a file-based SQLite database.
//!
//! The pool is pinned to a single connection so writes serialize the same
//! way they would against one Postgres session, and the domain-event channel
//! is drained explicitly via [`TestApp::drain_events`] so projections apply
//! deterministically instead of racing the assertions.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, Response, StatusCode},
    Router,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::EntityTrait;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::{mpsc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

use warehouse_api::{
    api_v1_routes,
    config::AppConfig,
    db,
    entities::{inventory_batch, product},
    events::{Event, EventHandler, EventSender, StatusProjector},
    handlers::AppServices,
    middleware_helpers::request_id::request_id_middleware,
    services::inventory::{ReceiveBatchRequest, RegisterProductRequest},
    services::orders::{CreateOrderRequest, OrderItemRequest, ProcessOrderResponse},
    AppState,
};

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    projector: StatusProjector,
    event_rx: Mutex<mpsc::Receiver<Event>>,
    _db_dir: TempDir,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let db_dir = tempfile::tempdir().expect("temp dir for test database");
        let db_path = db_dir.path().join("warehouse_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("db connect");
        db::run_migrations(&pool).await.expect("migrations");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let projector = StatusProjector::new(db_arc.clone());

        let services = AppServices::new(db_arc.clone(), event_sender.clone());
        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", api_v1_routes())
            .layer(axum::middleware::from_fn(request_id_middleware))
            .with_state(state.clone());

        Self {
            router,
            state,
            projector,
            event_rx: Mutex::new(event_rx),
            _db_dir: db_dir,
        }
    }

    /// Applies every pending domain event through the status projector and
    /// returns them for assertions.
    pub async fn drain_events(&self) -> Vec<Event> {
        let mut rx = self.event_rx.lock().await;
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            self.projector
                .handle_event(event.clone())
                .await
                .expect("event projection");
            events.push(event);
        }
        events
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        self.router
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("response")
    }

    pub async fn seed_product(
        &self,
        sku: &str,
        unit_price: Decimal,
        reorder_threshold: i32,
    ) -> product::Model {
        self.state
            .services
            .inventory
            .register_product(RegisterProductRequest {
                sku: sku.to_string(),
                name: format!("Product {}", sku),
                unit_price,
                reorder_threshold,
                shelf_life_days: Some(365),
            })
            .await
            .expect("seed product")
    }

    pub async fn seed_batch(
        &self,
        product_id: Uuid,
        batch_number: &str,
        quantity: i32,
        expiration_date: NaiveDate,
    ) -> inventory_batch::Model {
        self.state
            .services
            .inventory
            .receive_batch(ReceiveBatchRequest {
                product_id,
                batch_number: batch_number.to_string(),
                quantity,
                manufacture_date: None,
                expiration_date,
                supplier_id: None,
                warehouse_id: None,
            })
            .await
            .expect("seed batch")
    }

    /// Current database state of a batch.
    pub async fn batch(&self, batch_id: Uuid) -> inventory_batch::Model {
        inventory_batch::Entity::find_by_id(batch_id)
            .one(&*self.state.db)
            .await
            .expect("batch query")
            .expect("batch exists")
    }

    /// Creates and processes a one-line order, returning the allocation
    /// outcome.
    pub async fn processed_order(
        &self,
        product_id: Uuid,
        quantity: i32,
    ) -> ProcessOrderResponse {
        let order = self
            .state
            .services
            .orders
            .create_order(CreateOrderRequest {
                order_number: None,
                created_by: None,
                notes: None,
                items: vec![OrderItemRequest {
                    product_id,
                    quantity,
                }],
            })
            .await
            .expect("create order");

        self.state
            .services
            .orders
            .process_order(order.id)
            .await
            .expect("process order")
    }

    /// Walks a processed order's package all the way to `delivered`:
    /// ready → packaged → dispatched → in transit → delivered, applying the
    /// projections. Returns the forward transport id.
    pub async fn deliver_package(&self, order_id: Uuid, package_id: Uuid) -> Uuid {
        use warehouse_api::entities::transport::TransportStatus;

        self.state
            .services
            .packages
            .mark_ready(package_id, None)
            .await
            .expect("mark ready");
        self.state
            .services
            .orders
            .pack_order(order_id, None)
            .await
            .expect("pack order");

        let (transport, _) = self
            .state
            .services
            .packages
            .assign_transport(package_id, Uuid::new_v4(), None)
            .await
            .expect("assign transport");

        self.state
            .services
            .transports
            .update_status(transport.id, TransportStatus::InTransit, None, None, None)
            .await
            .expect("in transit");
        self.state
            .services
            .transports
            .update_status(transport.id, TransportStatus::Delivered, None, None, None)
            .await
            .expect("delivered");

        self.drain_events().await;

        transport.id
    }
}

pub async fn response_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn assert_status(response: &Response<Body>, expected: StatusCode) {
    assert_eq!(response.status(), expected);
}
