//! Order lifecycle: creation, allocation into a package, and the packing
//! mirror. Delivery and return annotations arrive via the status projector.

use crate::{
    db::DbPool,
    entities::batch_allocation,
    entities::order::{self, Entity as OrderEntity, OrderStatus},
    entities::order_item::{self, Entity as OrderItemEntity},
    entities::package::{self, Entity as PackageEntity, PackageStatus},
    entities::package_item,
    entities::product::{self, Entity as ProductEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    services::allocation::{AllocationDraft, BatchAllocator, ReservationTransaction},
    services::inventory,
    services::packages::PackageResponse,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    /// Generated when absent.
    pub order_number: Option<String>,
    pub created_by: Option<Uuid>,
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<OrderItemRequest>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub created_by: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

impl From<order::Model> for OrderResponse {
    fn from(model: order::Model) -> Self {
        Self {
            id: model.id,
            order_number: model.order_number,
            status: model.status,
            created_by: model.created_by,
            notes: model.notes,
            created_at: model.created_at,
            updated_at: model.updated_at,
            version: model.version,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Result of a successful allocation run.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProcessOrderResponse {
    pub order: OrderResponse,
    pub package: PackageResponse,
}

/// Service for managing orders.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl OrderService {
    /// Creates a new order service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates a new order in `pending` with its line items.
    #[instrument(skip(self, request))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        request.validate()?;
        for item in &request.items {
            item.validate()?;
        }

        let db = &*self.db_pool;

        // Every line must reference a known product.
        let product_ids: Vec<Uuid> = request.items.iter().map(|i| i.product_id).collect();
        let known: Vec<Uuid> = ProductEntity::find()
            .filter(product::Column::Id.is_in(product_ids.clone()))
            .all(db)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();
        for product_id in &product_ids {
            if !known.contains(product_id) {
                return Err(ServiceError::ValidationError(format!(
                    "Order references unknown product {}",
                    product_id
                )));
            }
        }

        let order_number = match request.order_number {
            Some(number) => {
                let duplicate = OrderEntity::find()
                    .filter(order::Column::OrderNumber.eq(number.clone()))
                    .one(db)
                    .await?;
                if duplicate.is_some() {
                    return Err(ServiceError::ValidationError(format!(
                        "Order number {} already exists",
                        number
                    )));
                }
                number
            }
            None => generate_code("ORD"),
        };

        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let txn = db.begin().await?;

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number),
            status: Set(OrderStatus::Pending),
            created_by: Set(request.created_by),
            notes: Set(request.notes),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            version: Set(1),
        }
        .insert(&txn)
        .await?;

        for item in &request.items {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                quantity: Set(item.quantity),
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;

        info!(order_id = %order_id, order_number = %order_model.order_number, "Order created");

        if let Err(e) = self.event_sender.send(Event::OrderCreated(order_id)).await {
            warn!(order_id = %order_id, error = %e, "Failed to send order created event");
        }

        Ok(order_model.into())
    }

    /// Allocates inventory for a pending order and assembles its package.
    ///
    /// All lines reserve through one [`ReservationTransaction`]; any failure
    /// rolls every reservation back and leaves the order `pending` so the
    /// caller can retry after restock. A second call on a non-pending order
    /// fails with `InvalidTransition` and never double-allocates.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn process_order(
        &self,
        order_id: Uuid,
    ) -> Result<ProcessOrderResponse, ServiceError> {
        let db = &*self.db_pool;

        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidTransition(format!(
                "Order {} cannot be processed from status '{}'; expected 'pending'",
                order.order_number, order.status
            )));
        }

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(db)
            .await?;
        if items.is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "Order {} has no items to allocate",
                order.order_number
            )));
        }

        let products = self.products_for(&items).await?;

        // Reserve line by line; each line is planned against the ledger as
        // already mutated by the previous lines, so repeated products on one
        // order deplete batches cumulatively.
        let mut reservation = ReservationTransaction::new(db);
        for item in &items {
            let drafts =
                match BatchAllocator::plan_for_product(db, item.product_id, item.quantity).await {
                    Ok(drafts) => drafts,
                    Err(e) => {
                        reservation.rollback().await;
                        return Err(allocation_failure(&order.order_number, e));
                    }
                };
            for draft in drafts {
                if let Err(e) = reservation.reserve(draft).await {
                    reservation.rollback().await;
                    return Err(allocation_failure(&order.order_number, e));
                }
            }
        }
        let drafts = reservation.commit();

        match self
            .persist_allocation(&order, &items, &products, &drafts)
            .await
        {
            Ok((updated_order, created_package)) => {
                info!(
                    order_id = %order_id,
                    package_id = %created_package.id,
                    batches = drafts.len(),
                    "Order processed and package assembled"
                );

                self.emit_processed_events(&updated_order, &created_package, &items)
                    .await;

                Ok(ProcessOrderResponse {
                    order: updated_order.into(),
                    package: created_package.into(),
                })
            }
            Err(e) => {
                // Storage failure after reservations were applied: compensate
                // before surfacing, so no batch is left half-reserved.
                error!(order_id = %order_id, error = %e, "Failed to persist allocation; releasing reservations");
                for draft in drafts.iter().rev() {
                    if let Err(release_err) =
                        inventory::release_on(db, draft.batch_id, draft.quantity).await
                    {
                        error!(
                            batch_id = %draft.batch_id,
                            error = %release_err,
                            "Failed to release reservation while compensating"
                        );
                    }
                }
                Err(ServiceError::AllocationFailed(format!(
                    "Order {}: storage failure during allocation; reservations rolled back",
                    order.order_number
                )))
            }
        }
    }

    /// Mirrors a packed package onto the order: `processing → packaged`.
    /// Call only after `PackageService::mark_ready` has succeeded.
    #[instrument(skip(self, notes), fields(order_id = %order_id))]
    pub async fn pack_order(
        &self,
        order_id: Uuid,
        notes: Option<String>,
    ) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db_pool;

        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.status != OrderStatus::Processing {
            return Err(ServiceError::InvalidTransition(format!(
                "Order {} cannot be packed from status '{}'; expected 'processing'",
                order.order_number, order.status
            )));
        }

        let package = PackageEntity::find()
            .filter(package::Column::OrderId.eq(order_id))
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {} has no package", order.order_number))
            })?;

        if package.status != PackageStatus::ReadyForDispatch {
            return Err(ServiceError::InvalidTransition(format!(
                "Package {} must be ready_for_dispatch before the order is packed; current status '{}'",
                package.package_code, package.status
            )));
        }

        let old_status = order.status;
        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Packaged);
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);
        if let Some(notes) = notes {
            active.notes = Set(Some(notes));
        }
        let updated = active.update(db).await?;

        info!(order_id = %order_id, "Order packaged");

        if let Err(e) = self
            .event_sender
            .send(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status: OrderStatus::Packaged,
            })
            .await
        {
            warn!(order_id = %order_id, error = %e, "Failed to send order status changed event");
        }

        Ok(updated.into())
    }

    /// Retrieves an order with its items.
    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<(order::Model, Vec<order_item::Model>)>, ServiceError> {
        let db = &*self.db_pool;

        let Some(order) = OrderEntity::find_by_id(order_id).one(db).await? else {
            return Ok(None);
        };

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(db)
            .await?;

        Ok(Some((order, items)))
    }

    /// Lists orders with pagination.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let db = &*self.db_pool;

        let paginator = OrderEntity::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(db, per_page);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok(OrderListResponse {
            orders: orders.into_iter().map(Into::into).collect(),
            total,
            page,
            per_page,
        })
    }

    async fn products_for(
        &self,
        items: &[order_item::Model],
    ) -> Result<HashMap<Uuid, product::Model>, ServiceError> {
        let db = &*self.db_pool;
        let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let products = ProductEntity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(db)
            .await?;
        Ok(products.into_iter().map(|p| (p.id, p)).collect())
    }

    /// Creates the package, its items and allocation records, and flips the
    /// order to `processing`, all in one transaction.
    async fn persist_allocation(
        &self,
        order: &order::Model,
        items: &[order_item::Model],
        products: &HashMap<Uuid, product::Model>,
        drafts: &[AllocationDraft],
    ) -> Result<(order::Model, package::Model), ServiceError> {
        let db = &*self.db_pool;
        let now = Utc::now();
        let package_id = Uuid::new_v4();

        let total_value: Decimal = items
            .iter()
            .map(|item| {
                let price = products
                    .get(&item.product_id)
                    .map(|p| p.unit_price)
                    .unwrap_or_default();
                price * Decimal::from(item.quantity)
            })
            .sum();

        let txn = db.begin().await?;

        let created_package = package::ActiveModel {
            id: Set(package_id),
            package_code: Set(generate_code("PKG")),
            order_id: Set(order.id),
            status: Set(PackageStatus::Pending),
            total_value: Set(total_value),
            weight_kg: Set(None),
            dimensions_cm: Set(None),
            notes: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        for draft in drafts {
            package_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                package_id: Set(package_id),
                product_id: Set(draft.product_id),
                batch_id: Set(draft.batch_id),
                quantity: Set(draft.quantity),
            }
            .insert(&txn)
            .await?;

            batch_allocation::ActiveModel {
                id: Set(Uuid::new_v4()),
                batch_id: Set(draft.batch_id),
                package_id: Set(package_id),
                product_id: Set(draft.product_id),
                quantity: Set(draft.quantity),
                returned_quantity: Set(0),
                allocated_at: Set(now),
            }
            .insert(&txn)
            .await?;
        }

        let mut active: order::ActiveModel = order.clone().into();
        active.status = Set(OrderStatus::Processing);
        active.updated_at = Set(Some(now));
        active.version = Set(order.version + 1);
        let updated_order = active.update(&txn).await?;

        txn.commit().await?;

        Ok((updated_order, created_package))
    }

    async fn emit_processed_events(
        &self,
        order: &order::Model,
        created_package: &package::Model,
        items: &[order_item::Model],
    ) {
        let db = &*self.db_pool;

        if let Err(e) = self
            .event_sender
            .send(Event::OrderProcessed {
                order_id: order.id,
                package_id: created_package.id,
            })
            .await
        {
            warn!(order_id = %order.id, error = %e, "Failed to send order processed event");
        }
        if let Err(e) = self
            .event_sender
            .send(Event::OrderStatusChanged {
                order_id: order.id,
                old_status: OrderStatus::Pending,
                new_status: OrderStatus::Processing,
            })
            .await
        {
            warn!(order_id = %order.id, error = %e, "Failed to send order status changed event");
        }

        // Allocation may have drained a product to its reorder threshold.
        let mut seen = Vec::new();
        for item in items {
            if seen.contains(&item.product_id) {
                continue;
            }
            seen.push(item.product_id);

            let available = match inventory::availability_on(db, item.product_id).await {
                Ok(available) => available,
                Err(e) => {
                    warn!(product_id = %item.product_id, error = %e, "Failed to check availability for low-stock detection");
                    continue;
                }
            };
            let threshold = match ProductEntity::find_by_id(item.product_id).one(db).await {
                Ok(Some(p)) => p.reorder_threshold,
                _ => continue,
            };
            if available <= threshold {
                if let Err(e) = self
                    .event_sender
                    .send(Event::LowStockDetected {
                        product_id: item.product_id,
                        available,
                        threshold,
                    })
                    .await
                {
                    warn!(product_id = %item.product_id, error = %e, "Failed to send low stock event");
                }
            }
        }
    }
}

fn allocation_failure(order_number: &str, cause: ServiceError) -> ServiceError {
    match cause {
        ServiceError::InsufficientStock(detail) => ServiceError::AllocationFailed(format!(
            "Order {}: {}",
            order_number, detail
        )),
        other => other,
    }
}

/// Human-readable entity code, e.g. `ORD-1A2B3C4D`.
fn generate_code(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, id[..8].to_uppercase())
}
