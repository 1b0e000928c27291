use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::return_entity,
    errors::ServiceError,
    services::returns::{InitiateReturnRequest, ReturnResponse},
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct ReturnListQuery {
    /// Page number (1-indexed)
    pub page: Option<u64>,
    /// Page size (max 100)
    pub limit: Option<u64>,
    /// Optional status filter (case-insensitive)
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SchedulePickupRequest {
    pub transporter_id: Uuid,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct AdvanceReturnRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct MarkReceivedRequest {
    pub warehouse_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct ProcessReturnRequest {
    pub processed_by: Option<String>,
    pub notes: Option<String>,
}

pub async fn list_returns(
    State(state): State<AppState>,
    Query(query): Query<ReturnListQuery>,
) -> ApiResult<PaginatedResponse<return_entity::Model>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);

    let (records, total) = state.services.returns.list_returns(page, limit).await?;

    let mut items = records;
    let filtered_total = if let Some(status) = query.status {
        items.retain(|ret| ret.status.as_str().eq_ignore_ascii_case(&status));
        items.len() as u64
    } else {
        total
    };

    let total_pages = filtered_total.div_ceil(limit);

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total: filtered_total,
        page,
        limit,
        total_pages,
    })))
}

pub async fn get_return(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ReturnResponse> {
    match state.services.returns.get_return(id).await? {
        Some(found) => Ok(Json(ApiResponse::success(found))),
        None => Err(ServiceError::NotFound(format!("Return {} not found", id))),
    }
}

/// Open a return against a delivered package.
#[utoipa::path(
    post,
    path = "/api/v1/returns",
    request_body = InitiateReturnRequest,
    responses(
        (status = 200, description = "Return initiated", body = ReturnResponse),
        (status = 400, description = "Invalid quantity or package not delivered"),
        (status = 409, description = "An open return already exists for the package")
    ),
    tag = "returns"
)]
pub async fn create_return(
    State(state): State<AppState>,
    Json(payload): Json<InitiateReturnRequest>,
) -> ApiResult<ReturnResponse> {
    let created = state.services.returns.initiate_return(payload).await?;
    Ok(Json(ApiResponse::success(created)))
}

pub async fn schedule_pickup(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SchedulePickupRequest>,
) -> ApiResult<ReturnResponse> {
    let updated = state
        .services
        .returns
        .schedule_pickup(id, payload.transporter_id, payload.notes)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn mark_picked_up(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdvanceReturnRequest>,
) -> ApiResult<ReturnResponse> {
    let updated = state
        .services
        .returns
        .mark_picked_up(id, payload.notes)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn mark_received(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<MarkReceivedRequest>,
) -> ApiResult<ReturnResponse> {
    let updated = state
        .services
        .returns
        .mark_received(id, payload.warehouse_id, payload.notes)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

/// Close a received return and restock its lines.
#[utoipa::path(
    post,
    path = "/api/v1/returns/{id}/process",
    params(("id" = Uuid, Path, description = "Return id")),
    request_body = ProcessReturnRequest,
    responses(
        (status = 200, description = "Return processed, inventory restocked", body = ReturnResponse),
        (status = 400, description = "Return is not in 'received'"),
        (status = 409, description = "Restock would exceed the outstanding allocation")
    ),
    tag = "returns"
)]
pub async fn process_return(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProcessReturnRequest>,
) -> ApiResult<ReturnResponse> {
    let updated = state
        .services
        .returns
        .process_return(id, payload.processed_by, payload.notes)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}
