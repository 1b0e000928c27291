//! Return lifecycle: goods flowing backward from a delivered package.
//!
//! Inventory is mutated on exactly one edge of this state machine:
//! `received → processed`. A return that has merely been received holds no
//! stock effect, so it can never double-count as available inventory.

use crate::{
    db::DbPool,
    entities::batch_allocation::{self, Entity as BatchAllocationEntity},
    entities::package::{Entity as PackageEntity, PackageStatus},
    entities::return_entity::{self, Entity as ReturnEntity, ReturnStatus},
    entities::return_item::{self, Entity as ReturnItemEntity},
    entities::transport::{self, TransportStatus},
    entities::transport_event,
    errors::ServiceError,
    events::{Event, EventSender},
    services::inventory,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct ReturnItemRequest {
    pub product_id: Uuid,
    pub batch_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct InitiateReturnRequest {
    pub package_id: Uuid,
    #[validate(length(min = 1, message = "Return reason is required"))]
    pub return_reason: String,
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "Return must contain at least one item"))]
    pub returned_items: Vec<ReturnItemRequest>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReturnItemResponse {
    pub product_id: Uuid,
    pub batch_id: Uuid,
    pub quantity: i32,
}

impl From<return_item::Model> for ReturnItemResponse {
    fn from(model: return_item::Model) -> Self {
        Self {
            product_id: model.product_id,
            batch_id: model.batch_id,
            quantity: model.quantity,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReturnResponse {
    pub id: Uuid,
    pub package_id: Uuid,
    pub reason: String,
    pub status: ReturnStatus,
    pub transporter_id: Option<Uuid>,
    pub transport_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    pub processed_by: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub returned_items: Vec<ReturnItemResponse>,
}

impl ReturnResponse {
    pub fn from_parts(model: return_entity::Model, items: Vec<return_item::Model>) -> Self {
        Self {
            id: model.id,
            package_id: model.package_id,
            reason: model.reason,
            status: model.status,
            transporter_id: model.transporter_id,
            transport_id: model.transport_id,
            warehouse_id: model.warehouse_id,
            processed_by: model.processed_by,
            notes: model.notes,
            created_at: model.created_at,
            updated_at: model.updated_at,
            returned_items: items.into_iter().map(Into::into).collect(),
        }
    }
}

/// Service for managing returns.
#[derive(Clone)]
pub struct ReturnService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl ReturnService {
    /// Creates a new return service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Opens a return against a delivered package.
    ///
    /// Guards: the package must be `delivered`; no other non-processed
    /// return may exist for it; and every returned line must fit within the
    /// quantity originally allocated to that (product, batch) on the
    /// package, net of previously processed returns.
    #[instrument(skip(self, request), fields(package_id = %request.package_id))]
    pub async fn initiate_return(
        &self,
        request: InitiateReturnRequest,
    ) -> Result<ReturnResponse, ServiceError> {
        request.validate()?;
        for item in &request.returned_items {
            item.validate()?;
        }

        let db = &*self.db_pool;

        let found = PackageEntity::find_by_id(request.package_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Package {} not found", request.package_id))
            })?;

        if found.status != PackageStatus::Delivered {
            return Err(ServiceError::InvalidTransition(format!(
                "Package {} cannot be returned from status '{}'; expected 'delivered'",
                found.package_code, found.status
            )));
        }

        let open_return = ReturnEntity::find()
            .filter(return_entity::Column::PackageId.eq(request.package_id))
            .filter(return_entity::Column::Status.ne(ReturnStatus::Processed))
            .one(db)
            .await?;
        if let Some(existing) = open_return {
            return Err(ServiceError::DuplicateReturn(format!(
                "Package {} already has return {} in status '{}'",
                found.package_code, existing.id, existing.status
            )));
        }

        // Collapse duplicate request lines so the allowance check sees the
        // total asked per (product, batch).
        let mut requested: BTreeMap<(Uuid, Uuid), i32> = BTreeMap::new();
        for item in &request.returned_items {
            *requested.entry((item.product_id, item.batch_id)).or_insert(0) += item.quantity;
        }

        let allocations = BatchAllocationEntity::find()
            .filter(batch_allocation::Column::PackageId.eq(request.package_id))
            .all(db)
            .await?;

        for ((product_id, batch_id), quantity) in &requested {
            let matching: Vec<_> = allocations
                .iter()
                .filter(|a| a.product_id == *product_id && a.batch_id == *batch_id)
                .collect();
            if matching.is_empty() {
                return Err(ServiceError::InvalidQuantity(format!(
                    "Package {} has no allocation of product {} from batch {}",
                    found.package_code, product_id, batch_id
                )));
            }
            let allocated: i32 = matching.iter().map(|a| a.quantity).sum();
            let already_returned: i32 = matching.iter().map(|a| a.returned_quantity).sum();
            let returnable = allocated - already_returned;
            if *quantity > returnable {
                return Err(ServiceError::InvalidQuantity(format!(
                    "Batch {}: requested return of {} exceeds returnable {} ({} allocated, {} already returned)",
                    batch_id, quantity, returnable, allocated, already_returned
                )));
            }
        }

        let now = Utc::now();
        let return_id = Uuid::new_v4();

        let txn = db.begin().await?;

        let created = return_entity::ActiveModel {
            id: Set(return_id),
            package_id: Set(request.package_id),
            reason: Set(request.return_reason),
            status: Set(ReturnStatus::Initiated),
            transporter_id: Set(None),
            transport_id: Set(None),
            warehouse_id: Set(None),
            processed_by: Set(None),
            notes: Set(request.notes),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::new();
        for ((product_id, batch_id), quantity) in requested {
            let item = return_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                return_id: Set(return_id),
                product_id: Set(product_id),
                batch_id: Set(batch_id),
                quantity: Set(quantity),
            }
            .insert(&txn)
            .await?;
            items.push(item);
        }

        txn.commit().await?;

        info!(return_id = %return_id, package_id = %request.package_id, "Return initiated");

        if let Err(e) = self
            .event_sender
            .send(Event::ReturnInitiated {
                return_id,
                package_id: request.package_id,
            })
            .await
        {
            warn!(return_id = %return_id, error = %e, "Failed to send return initiated event");
        }

        Ok(ReturnResponse::from_parts(created, items))
    }

    /// `initiated → pickup_scheduled`, booking the transporter for the leg.
    #[instrument(skip(self, notes), fields(return_id = %return_id))]
    pub async fn schedule_pickup(
        &self,
        return_id: Uuid,
        transporter_id: Uuid,
        notes: Option<String>,
    ) -> Result<ReturnResponse, ServiceError> {
        let db = &*self.db_pool;

        let found = self.find_return(return_id).await?;
        self.check_edge(&found, ReturnStatus::PickupScheduled)?;

        let old_status = found.status;
        let mut active: return_entity::ActiveModel = found.into();
        active.status = Set(ReturnStatus::PickupScheduled);
        active.transporter_id = Set(Some(transporter_id));
        active.updated_at = Set(Utc::now());
        if let Some(notes) = notes {
            active.notes = Set(Some(notes));
        }
        let updated = active.update(db).await?;

        self.emit_status_changed(return_id, old_status, ReturnStatus::PickupScheduled)
            .await;

        let items = self.items_for(return_id).await?;
        Ok(ReturnResponse::from_parts(updated, items))
    }

    /// `pickup_scheduled → picked_up`. When a transporter was booked, the
    /// reverse-leg transport record is created here and attached.
    #[instrument(skip(self, notes), fields(return_id = %return_id))]
    pub async fn mark_picked_up(
        &self,
        return_id: Uuid,
        notes: Option<String>,
    ) -> Result<ReturnResponse, ServiceError> {
        let db = &*self.db_pool;

        let found = self.find_return(return_id).await?;
        self.check_edge(&found, ReturnStatus::PickedUp)?;

        let old_status = found.status;
        let now = Utc::now();

        let txn = db.begin().await?;

        let transport_id = match found.transporter_id {
            Some(transporter_id) => {
                let transport_id = Uuid::new_v4();
                transport::ActiveModel {
                    id: Set(transport_id),
                    package_id: Set(found.package_id),
                    transporter_id: Set(transporter_id),
                    status: Set(TransportStatus::Dispatched),
                    is_return_leg: Set(true),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?;

                transport_event::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    transport_id: Set(transport_id),
                    status: Set(TransportStatus::Dispatched),
                    location: Set(None),
                    notes: Set(Some("Return pickup".to_string())),
                    updated_by: Set(None),
                    recorded_at: Set(now),
                }
                .insert(&txn)
                .await?;

                Some(transport_id)
            }
            None => None,
        };

        let mut active: return_entity::ActiveModel = found.into();
        active.status = Set(ReturnStatus::PickedUp);
        active.transport_id = Set(transport_id);
        active.updated_at = Set(now);
        if let Some(notes) = notes {
            active.notes = Set(Some(notes));
        }
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        self.emit_status_changed(return_id, old_status, ReturnStatus::PickedUp)
            .await;

        let items = self.items_for(return_id).await?;
        Ok(ReturnResponse::from_parts(updated, items))
    }

    /// `picked_up → received`. Goods are back at the warehouse but NOT yet
    /// counted as stock; only processing restocks.
    #[instrument(skip(self, notes), fields(return_id = %return_id))]
    pub async fn mark_received(
        &self,
        return_id: Uuid,
        warehouse_id: Option<Uuid>,
        notes: Option<String>,
    ) -> Result<ReturnResponse, ServiceError> {
        let db = &*self.db_pool;

        let found = self.find_return(return_id).await?;
        self.check_edge(&found, ReturnStatus::Received)?;

        let old_status = found.status;
        let mut active: return_entity::ActiveModel = found.into();
        active.status = Set(ReturnStatus::Received);
        active.warehouse_id = Set(warehouse_id);
        active.updated_at = Set(Utc::now());
        if let Some(notes) = notes {
            active.notes = Set(Some(notes));
        }
        let updated = active.update(db).await?;

        self.emit_status_changed(return_id, old_status, ReturnStatus::Received)
            .await;

        let items = self.items_for(return_id).await?;
        Ok(ReturnResponse::from_parts(updated, items))
    }

    /// `received → processed`: restocks every returned line and closes the
    /// return. This is the only path that increases batch stock other than
    /// new supply.
    #[instrument(skip(self, notes), fields(return_id = %return_id))]
    pub async fn process_return(
        &self,
        return_id: Uuid,
        processed_by: Option<String>,
        notes: Option<String>,
    ) -> Result<ReturnResponse, ServiceError> {
        let db = &*self.db_pool;

        let found = self.find_return(return_id).await?;
        self.check_edge(&found, ReturnStatus::Processed)?;

        let package_id = found.package_id;
        let old_status = found.status;
        let items = self.items_for(return_id).await?;
        let now = Utc::now();

        let txn = db.begin().await?;

        for item in &items {
            inventory::restock_on(&txn, item.batch_id, item.quantity).await?;
            apply_return_to_allocations(
                &txn,
                package_id,
                item.product_id,
                item.batch_id,
                item.quantity,
            )
            .await?;
        }

        let mut active: return_entity::ActiveModel = found.into();
        active.status = Set(ReturnStatus::Processed);
        active.processed_by = Set(processed_by);
        active.updated_at = Set(now);
        if let Some(notes) = notes {
            active.notes = Set(Some(notes));
        }
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        info!(
            return_id = %return_id,
            package_id = %package_id,
            lines = items.len(),
            "Return processed, inventory restocked"
        );

        self.emit_status_changed(return_id, old_status, ReturnStatus::Processed)
            .await;
        if let Err(e) = self
            .event_sender
            .send(Event::ReturnProcessed {
                return_id,
                package_id,
            })
            .await
        {
            warn!(return_id = %return_id, error = %e, "Failed to send return processed event");
        }

        Ok(ReturnResponse::from_parts(updated, items))
    }

    /// Gets a return by ID with its items.
    #[instrument(skip(self))]
    pub async fn get_return(
        &self,
        return_id: Uuid,
    ) -> Result<Option<ReturnResponse>, ServiceError> {
        let db = &*self.db_pool;

        let Some(found) = ReturnEntity::find_by_id(return_id).one(db).await? else {
            return Ok(None);
        };

        let items = self.items_for(return_id).await?;
        Ok(Some(ReturnResponse::from_parts(found, items)))
    }

    /// Lists returns with pagination.
    #[instrument(skip(self))]
    pub async fn list_returns(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<return_entity::Model>, u64), ServiceError> {
        let db = &*self.db_pool;

        let paginator = ReturnEntity::find()
            .order_by_desc(return_entity::Column::CreatedAt)
            .paginate(db, limit);

        let total = paginator.num_items().await?;
        let returns = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((returns, total))
    }

    async fn find_return(&self, return_id: Uuid) -> Result<return_entity::Model, ServiceError> {
        let db = &*self.db_pool;
        ReturnEntity::find_by_id(return_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Return {} not found", return_id)))
    }

    fn check_edge(
        &self,
        found: &return_entity::Model,
        target: ReturnStatus,
    ) -> Result<(), ServiceError> {
        if !found.status.can_transition_to(target) {
            return Err(ServiceError::InvalidTransition(format!(
                "Return {} cannot move from '{}' to '{}'",
                found.id, found.status, target
            )));
        }
        Ok(())
    }

    async fn items_for(&self, return_id: Uuid) -> Result<Vec<return_item::Model>, ServiceError> {
        let db = &*self.db_pool;
        Ok(ReturnItemEntity::find()
            .filter(return_item::Column::ReturnId.eq(return_id))
            .all(db)
            .await?)
    }

    async fn emit_status_changed(
        &self,
        return_id: Uuid,
        old_status: ReturnStatus,
        new_status: ReturnStatus,
    ) {
        if let Err(e) = self
            .event_sender
            .send(Event::ReturnStatusChanged {
                return_id,
                old_status,
                new_status,
            })
            .await
        {
            warn!(return_id = %return_id, error = %e, "Failed to send return status changed event");
        }
    }
}

/// Distributes a processed return quantity across the package's matching
/// allocation records, oldest first, bumping their `returned_quantity`.
async fn apply_return_to_allocations<C: sea_orm::ConnectionTrait>(
    conn: &C,
    package_id: Uuid,
    product_id: Uuid,
    batch_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    let allocations = BatchAllocationEntity::find()
        .filter(batch_allocation::Column::PackageId.eq(package_id))
        .filter(batch_allocation::Column::ProductId.eq(product_id))
        .filter(batch_allocation::Column::BatchId.eq(batch_id))
        .order_by_asc(batch_allocation::Column::AllocatedAt)
        .all(conn)
        .await?;

    let returnable: i32 = allocations
        .iter()
        .map(|a| a.quantity - a.returned_quantity)
        .sum();
    if quantity > returnable {
        return Err(ServiceError::InvalidQuantity(format!(
            "Batch {}: return of {} exceeds the {} still returnable on this package",
            batch_id, quantity, returnable
        )));
    }

    let mut remaining = quantity;
    for allocation in allocations {
        if remaining == 0 {
            break;
        }
        let capacity = allocation.quantity - allocation.returned_quantity;
        if capacity == 0 {
            continue;
        }
        let take = remaining.min(capacity);
        let new_returned = allocation.returned_quantity + take;
        let mut active: batch_allocation::ActiveModel = allocation.into();
        active.returned_quantity = Set(new_returned);
        active.update(conn).await?;
        remaining -= take;
    }

    Ok(())
}
