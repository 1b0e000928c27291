use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::package::PackageStatus,
    entities::package_item,
    errors::ServiceError,
    services::packages::PackageResponse,
    services::transports::TransportResponse,
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct PackageListQuery {
    /// Page number (1-indexed)
    pub page: Option<u64>,
    /// Page size (max 100)
    pub limit: Option<u64>,
    /// Optional status filter
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePackageStatusRequest {
    pub status: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AssignTransportRequest {
    pub transporter_id: Uuid,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PackageDetailResponse {
    pub package: PackageResponse,
    pub items: Vec<package_item::Model>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AssignTransportResponse {
    pub transport: TransportResponse,
    pub package: PackageResponse,
}

pub async fn list_packages(
    State(state): State<AppState>,
    Query(query): Query<PackageListQuery>,
) -> ApiResult<PaginatedResponse<PackageResponse>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);

    let (records, total) = state
        .services
        .packages
        .list_packages(page, limit, query.status)
        .await?;

    let items: Vec<PackageResponse> = records.into_iter().map(Into::into).collect();
    let total_pages = total.div_ceil(limit);

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page,
        limit,
        total_pages,
    })))
}

pub async fn get_package(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<PackageDetailResponse> {
    match state.services.packages.get_package(id).await? {
        Some((package, items)) => Ok(Json(ApiResponse::success(PackageDetailResponse {
            package: package.into(),
            items,
        }))),
        None => Err(ServiceError::NotFound(format!("Package {} not found", id))),
    }
}

/// Caller-driven package transition. Only `ready_for_dispatch` is writable
/// here; transport-owned states are rejected with the actual status.
#[utoipa::path(
    patch,
    path = "/api/v1/packages/{id}/status",
    params(("id" = Uuid, Path, description = "Package id")),
    request_body = UpdatePackageStatusRequest,
    responses(
        (status = 200, description = "Package transitioned", body = PackageResponse),
        (status = 400, description = "Illegal transition; message carries the current status")
    ),
    tag = "packages"
)]
pub async fn update_package_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePackageStatusRequest>,
) -> ApiResult<PackageResponse> {
    let target: PackageStatus = payload
        .status
        .parse()
        .map_err(ServiceError::ValidationError)?;

    let updated = state
        .services
        .packages
        .update_status(id, target, payload.notes)
        .await?;

    Ok(Json(ApiResponse::success(updated.into())))
}

/// Assign a transporter to a ready package, creating its transport record.
#[utoipa::path(
    post,
    path = "/api/v1/packages/{id}/assign-transport",
    params(("id" = Uuid, Path, description = "Package id")),
    request_body = AssignTransportRequest,
    responses(
        (status = 200, description = "Transport created, package dispatched", body = AssignTransportResponse),
        (status = 400, description = "Package is not ready for dispatch"),
        (status = 404, description = "Unknown package")
    ),
    tag = "packages"
)]
pub async fn assign_transport(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignTransportRequest>,
) -> ApiResult<AssignTransportResponse> {
    let (transport, package) = state
        .services
        .packages
        .assign_transport(id, payload.transporter_id, payload.notes)
        .await?;

    let transport = match state.services.transports.get_transport(transport.id).await? {
        Some(with_history) => with_history,
        None => TransportResponse::from_parts(transport, vec![]),
    };

    Ok(Json(ApiResponse::success(AssignTransportResponse {
        transport,
        package: package.into(),
    })))
}
