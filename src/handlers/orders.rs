use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    services::orders::{
        CreateOrderRequest, OrderItemResponse, OrderListResponse, OrderResponse,
        ProcessOrderResponse,
    },
    ApiResponse, ApiResult, AppState, ListQuery,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderDetailResponse {
    pub order: OrderResponse,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct PackOrderRequest {
    pub notes: Option<String>,
}

/// Create a new order in `pending`.
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 200, description = "Order created", body = OrderResponse),
        (status = 400, description = "Validation failure")
    ),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderRequest>,
) -> ApiResult<OrderResponse> {
    let created = state.services.orders.create_order(payload).await?;
    Ok(Json(ApiResponse::success(created)))
}

pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<OrderListResponse> {
    let page = query.page.max(1);
    let limit = query.limit.clamp(1, 100);
    let orders = state.services.orders.list_orders(page, limit).await?;
    Ok(Json(ApiResponse::success(orders)))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderDetailResponse> {
    match state.services.orders.get_order(id).await? {
        Some((order, items)) => Ok(Json(ApiResponse::success(OrderDetailResponse {
            order: order.into(),
            items: items
                .into_iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id,
                    quantity: item.quantity,
                })
                .collect(),
        }))),
        None => Err(ServiceError::NotFound(format!("Order {} not found", id))),
    }
}

/// Allocate inventory for a pending order and assemble its package.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/process",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order allocated into a package", body = ProcessOrderResponse),
        (status = 400, description = "Order is not pending"),
        (status = 409, description = "Allocation failed; order stays pending")
    ),
    tag = "orders"
)]
pub async fn process_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ProcessOrderResponse> {
    let outcome = state.services.orders.process_order(id).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

/// Mirror a ready package onto the order (`processing → packaged`).
pub async fn pack_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PackOrderRequest>,
) -> ApiResult<OrderResponse> {
    let updated = state.services.orders.pack_order(id, payload.notes).await?;
    Ok(Json(ApiResponse::success(updated)))
}
