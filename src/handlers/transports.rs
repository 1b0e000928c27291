use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::transport::{self, TransportStatus},
    errors::ServiceError,
    services::transports::TransportResponse,
    ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTransportStatusRequest {
    pub status: String,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub updated_by: Option<String>,
}

pub async fn list_transports(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<PaginatedResponse<transport::Model>> {
    let page = query.page.max(1);
    let limit = query.limit.clamp(1, 100);

    let (items, total) = state.services.transports.list_transports(page, limit).await?;
    let total_pages = total.div_ceil(limit);

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page,
        limit,
        total_pages,
    })))
}

pub async fn get_transport(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<TransportResponse> {
    match state.services.transports.get_transport(id).await? {
        Some(found) => Ok(Json(ApiResponse::success(found))),
        None => Err(ServiceError::NotFound(format!(
            "Transport {} not found",
            id
        ))),
    }
}

/// Advance a transport along its delivery chain, appending to its history.
#[utoipa::path(
    patch,
    path = "/api/v1/transports/{id}/status",
    params(("id" = Uuid, Path, description = "Transport id")),
    request_body = UpdateTransportStatusRequest,
    responses(
        (status = 200, description = "Transport transitioned", body = TransportResponse),
        (status = 400, description = "Illegal transition; message carries the current status"),
        (status = 404, description = "Unknown transport")
    ),
    tag = "transports"
)]
pub async fn update_transport_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTransportStatusRequest>,
) -> ApiResult<TransportResponse> {
    let new_status: TransportStatus = payload
        .status
        .parse()
        .map_err(ServiceError::ValidationError)?;

    let updated = state
        .services
        .transports
        .update_status(
            id,
            new_status,
            payload.location,
            payload.notes,
            payload.updated_by,
        )
        .await?;

    Ok(Json(ApiResponse::success(updated)))
}
