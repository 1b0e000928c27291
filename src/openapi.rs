use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Warehouse API",
        version = "0.1.0",
        description = r#"
# Warehouse Fulfillment API

Batch-level inventory with FEFO allocation and the order → package →
transport → return lifecycle chain.

## Error Handling

Errors use a consistent JSON body with the HTTP status category, a
human-readable message (state-machine violations include the entity's actual
current status so clients can resynchronize), the request id, and a
timestamp.

## Idempotent Retries

Mutating requests accept an `Idempotency-Key` header; a retry with the same
key replays the stored response instead of re-executing the mutation.
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    paths(
        crate::handlers::orders::create_order,
        crate::handlers::orders::process_order,
        crate::handlers::packages::update_package_status,
        crate::handlers::packages::assign_transport,
        crate::handlers::transports::update_transport_status,
        crate::handlers::returns::create_return,
        crate::handlers::returns::process_return,
        crate::handlers::inventory::track_batch,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::entities::order::OrderStatus,
        crate::entities::package::PackageStatus,
        crate::entities::transport::TransportStatus,
        crate::entities::return_entity::ReturnStatus,
        crate::services::orders::CreateOrderRequest,
        crate::services::orders::OrderItemRequest,
        crate::services::orders::OrderResponse,
        crate::services::orders::ProcessOrderResponse,
        crate::services::packages::PackageResponse,
        crate::services::transports::TransportResponse,
        crate::services::transports::TransportEventResponse,
        crate::services::returns::InitiateReturnRequest,
        crate::services::returns::ReturnItemRequest,
        crate::services::returns::ReturnItemResponse,
        crate::services::returns::ReturnResponse,
        crate::services::inventory::BatchTrackingResponse,
        crate::services::inventory::BatchAllocationBreakdown,
        crate::entities::inventory_batch::Model,
        crate::handlers::packages::UpdatePackageStatusRequest,
        crate::handlers::packages::AssignTransportRequest,
        crate::handlers::packages::AssignTransportResponse,
        crate::handlers::transports::UpdateTransportStatusRequest,
        crate::handlers::returns::ProcessReturnRequest,
    )),
    tags(
        (name = "orders", description = "Order lifecycle and allocation"),
        (name = "inventory", description = "Batch-level inventory and tracking"),
        (name = "packages", description = "Packing and transport assignment"),
        (name = "transports", description = "Transport movement and history"),
        (name = "returns", description = "Reverse logistics")
    )
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
