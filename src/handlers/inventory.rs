use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::inventory_batch,
    entities::product,
    errors::ServiceError,
    services::inventory::{
        BatchTrackingResponse, ProductAvailability, ReceiveBatchRequest, RegisterProductRequest,
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct BatchListQuery {
    /// Page number (1-indexed)
    pub page: Option<u64>,
    /// Page size (max 100)
    pub limit: Option<u64>,
    /// Optional product filter
    pub product_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct MarkDamagedRequest {
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i32,
    pub notes: Option<String>,
}

pub async fn register_product(
    State(state): State<AppState>,
    Json(payload): Json<RegisterProductRequest>,
) -> ApiResult<product::Model> {
    let created = state.services.inventory.register_product(payload).await?;
    Ok(Json(ApiResponse::success(created)))
}

pub async fn receive_batch(
    State(state): State<AppState>,
    Json(payload): Json<ReceiveBatchRequest>,
) -> ApiResult<inventory_batch::Model> {
    let created = state.services.inventory.receive_batch(payload).await?;
    Ok(Json(ApiResponse::success(created)))
}

pub async fn list_batches(
    State(state): State<AppState>,
    Query(query): Query<BatchListQuery>,
) -> ApiResult<PaginatedResponse<inventory_batch::Model>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);

    let (items, total) = state
        .services
        .inventory
        .list_batches(page, limit, query.product_id)
        .await?;

    let total_pages = total.div_ceil(limit);

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page,
        limit,
        total_pages,
    })))
}

/// Point-in-time snapshot of a batch and its allocation breakdown.
#[utoipa::path(
    get,
    path = "/api/v1/inventory/batches/track/{batch_number}",
    params(("batch_number" = String, Path, description = "Human batch number")),
    responses(
        (status = 200, description = "Batch snapshot", body = BatchTrackingResponse),
        (status = 404, description = "Unknown batch number")
    ),
    tag = "inventory"
)]
pub async fn track_batch(
    State(state): State<AppState>,
    Path(batch_number): Path<String>,
) -> ApiResult<BatchTrackingResponse> {
    let snapshot = state.services.inventory.track_batch(&batch_number).await?;
    Ok(Json(ApiResponse::success(snapshot)))
}

pub async fn mark_damaged(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
    Json(payload): Json<MarkDamagedRequest>,
) -> ApiResult<serde_json::Value> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    state
        .services
        .inventory
        .mark_damaged(batch_id, payload.quantity)
        .await?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "batch_id": batch_id,
        "damaged": payload.quantity,
    }))))
}

pub async fn product_availability(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> ApiResult<ProductAvailability> {
    let availability = state
        .services
        .inventory
        .product_availability(product_id)
        .await?;
    Ok(Json(ApiResponse::success(availability)))
}
